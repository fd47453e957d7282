//! Victim role: a well-behaved periodic transmitter.

use std::{sync::Arc, time::Duration};

use weepingcan_proto::{CanId, Frame, MAX_PAYLOAD, NodeId, ProtoError};

use crate::{
    bus::Bus,
    error::RoleError,
    node::{Node, NodeStatus, OperatingState},
};

/// Fixed bytes preceding the rolling sequence counter.
pub const DEFAULT_PAYLOAD_PREFIX: [u8; 3] = [0xDE, 0xAD, 0xBE];

/// Periodic sender whose frames carry `prefix ++ [seq]`.
#[derive(Debug)]
pub struct Victim {
    node: NodeId,
    id: CanId,
    period: Duration,
    prefix: Vec<u8>,
    seq: u8,
    bus: Arc<Bus>,
}

impl Victim {
    /// Register a fresh node named `node` on `bus`.
    pub fn attach(
        bus: Arc<Bus>,
        node: NodeId,
        id: CanId,
        period: Duration,
    ) -> Result<Self, RoleError> {
        bus.register(Node::new(node.clone()))?;
        Ok(Self { node, id, period, prefix: DEFAULT_PAYLOAD_PREFIX.to_vec(), seq: 0, bus })
    }

    /// Replace the fixed payload prefix (at most 7 bytes, leaving room for the
    /// sequence byte).
    pub fn with_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Result<Self, RoleError> {
        let prefix = prefix.into();
        if prefix.len() >= MAX_PAYLOAD {
            return Err(ProtoError::PayloadTooLong { len: prefix.len() + 1, max: MAX_PAYLOAD }.into());
        }
        self.prefix = prefix;
        Ok(self)
    }

    /// Node identity.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Identifier of every frame this victim sends.
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Transmission period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sequence byte of the most recent frame (0 before the first one).
    pub fn sequence(&self) -> u8 {
        self.seq
    }

    /// Current counter and state.
    pub fn status(&self) -> Result<NodeStatus, RoleError> {
        Ok(self.bus.status(&self.node)?)
    }

    /// Build the next periodic frame.
    ///
    /// # Errors
    ///
    /// Returns `RoleError::VictimOffline` once the node is bus-off; the
    /// sequence counter does not advance in that case.
    pub fn next_frame(&mut self) -> Result<Frame, RoleError> {
        if self.status()?.state == OperatingState::Offline {
            tracing::warn!(node = %self.node, "bus-off reached, node disconnected");
            return Err(RoleError::VictimOffline { node: self.node.clone() });
        }

        let seq = self.seq.wrapping_add(1);
        let mut payload = self.prefix.clone();
        payload.push(seq);
        let frame = Frame::new(self.id, payload, self.node.clone())?;
        self.seq = seq;

        tracing::debug!(node = %self.node, id = %self.id, seq, "periodic frame prepared");
        Ok(frame)
    }
}
