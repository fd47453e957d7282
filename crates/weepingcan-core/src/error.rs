//! Bus and role error types.

use thiserror::Error;
use weepingcan_proto::{NodeId, ProtoError};

use crate::node::OperatingState;

/// Errors from [`crate::Bus`] operations.
///
/// All of these are setup or wiring mistakes; none can occur in a correctly
/// assembled simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Identity registered twice.
    #[error("node already registered: {node}")]
    DuplicateNode {
        /// Offending identity.
        node: NodeId,
    },

    /// Identity never registered.
    #[error("unknown node: {node}")]
    UnknownNode {
        /// Missing identity.
        node: NodeId,
    },

    /// An offline node tried to transmit.
    #[error("node is bus-off: {node}")]
    SenderOffline {
        /// Offline identity.
        node: NodeId,
    },

    /// Both frames of a resolution came from the same node.
    #[error("node {node} cannot collide with itself")]
    SelfCollision {
        /// Duplicated sender.
        node: NodeId,
    },
}

/// Errors from the victim and attacker roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// The victim has reached bus-off and can no longer produce frames.
    #[error("victim offline: {node}")]
    VictimOffline {
        /// Victim identity.
        node: NodeId,
    },

    /// The attacker left the error-active state.
    #[error("attack model violated: attacker {node} is {state} at TEC {counter}")]
    AttackModelViolated {
        /// Attacker identity.
        node: NodeId,
        /// Attacker's counter.
        counter: u16,
        /// Attacker's state.
        state: OperatingState,
    },

    /// The target frame has no payload bits to inject into.
    #[error("target frame from {sender} has an empty payload")]
    EmptyPayload {
        /// Sender of the target frame.
        sender: NodeId,
    },

    /// Bus rejected an operation.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Frame could not be built.
    #[error("frame error: {0}")]
    Frame(#[from] ProtoError),
}

impl RoleError {
    /// Returns true if this error marks a successful end of the attack.
    ///
    /// The driver stops on both `VictimOffline` and `AttackModelViolated`,
    /// but only the former means the attack reached its goal.
    pub fn is_expected_stop(&self) -> bool {
        matches!(self, Self::VictimOffline { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_offline_is_expected_stop() {
        let err = RoleError::VictimOffline { node: NodeId::new("VICTIM") };
        assert!(err.is_expected_stop());
    }

    #[test]
    fn model_violation_is_not_expected_stop() {
        let err = RoleError::AttackModelViolated {
            node: NodeId::new("ATTACKER"),
            counter: 131,
            state: OperatingState::Passive,
        };
        assert!(!err.is_expected_stop());
        assert_eq!(
            err.to_string(),
            "attack model violated: attacker ATTACKER is error-passive at TEC 131"
        );
    }

    #[test]
    fn bus_errors_convert() {
        let err: RoleError = BusError::UnknownNode { node: NodeId::new("X") }.into();
        assert!(!err.is_expected_stop());
        assert_eq!(err.to_string(), "bus error: unknown node: X");
    }
}
