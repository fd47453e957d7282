//! Transmission attempts.
//!
//! A [`Frame`] is immutable once built. Adversarial frames carry the bit
//! position at which their sender deliberately drives a recessive level; the
//! constructor enforces that the position lies in the payload region and that
//! the bit there is recessive.

use std::{fmt, ops::Range};

use serde::{Deserialize, Serialize};

use crate::{
    bits::{self, Level},
    error::ProtoError,
    identifier::CanId,
};

/// Maximum payload length of a classic CAN data frame.
pub const MAX_PAYLOAD: usize = 8;

/// Identity of a bus participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create an identity from a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One transmission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    id: CanId,
    payload: Vec<u8>,
    sender: NodeId,
    injection: Option<usize>,
    adversarial: bool,
}

impl Frame {
    /// Build an ordinary data frame.
    pub fn new(id: CanId, payload: impl Into<Vec<u8>>, sender: NodeId) -> Result<Self, ProtoError> {
        let payload = payload.into();
        check_payload(&payload)?;
        Ok(Self { id, payload, sender, injection: None, adversarial: false })
    }

    /// Build an adversarial frame that drives recessive at `injection`.
    ///
    /// `injection` is an offset into the full identifier + payload bit
    /// sequence and must fall inside the payload region. The payload bit at
    /// that offset is forced to recessive regardless of its prior value.
    pub fn adversarial(
        id: CanId,
        payload: impl Into<Vec<u8>>,
        sender: NodeId,
        injection: usize,
    ) -> Result<Self, ProtoError> {
        let mut payload = payload.into();
        check_payload(&payload)?;

        let span = payload_span(payload.len());
        if !span.contains(&injection) {
            return Err(ProtoError::InjectionOutOfRange {
                position: injection,
                start: span.start,
                end: span.end,
            });
        }

        bits::force_recessive(&mut payload, injection - CanId::BITS);
        Ok(Self { id, payload, sender, injection: Some(injection), adversarial: true })
    }

    /// Identifier.
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Sending participant.
    pub fn sender(&self) -> &NodeId {
        &self.sender
    }

    /// Injection position, present only on adversarial frames.
    pub fn injection(&self) -> Option<usize> {
        self.injection
    }

    /// Whether the frame was built to provoke a bit error.
    pub fn is_adversarial(&self) -> bool {
        self.adversarial
    }

    /// Identifier + payload in transmission order.
    pub fn bits(&self) -> Vec<Level> {
        bits::serialize(self.id, &self.payload)
    }

    /// Number of serialized bits.
    pub fn bit_len(&self) -> usize {
        CanId::BITS + self.payload.len() * 8
    }

    /// Bit offsets occupied by the payload.
    pub fn payload_span(&self) -> Range<usize> {
        payload_span(self.payload.len())
    }
}

/// Payload bit offsets for a payload of `len` bytes.
pub fn payload_span(len: usize) -> Range<usize> {
    CanId::BITS..CanId::BITS + len * 8
}

fn check_payload(payload: &[u8]) -> Result<(), ProtoError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtoError::PayloadTooLong { len: payload.len(), max: MAX_PAYLOAD });
    }
    Ok(())
}
