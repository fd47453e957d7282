//! Model world: two counters and a sequence byte.

use weepingcan_core::OperatingState;

use super::operation::{Operation, OperationError, OperationResult, PayloadBit, Role};

const PREFIX: [u8; 3] = [0xDE, 0xAD, 0xBE];
const PASSIVE_AT: u16 = 128;
const OFFLINE_AT: u16 = 256;

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Victim counter and state.
    pub victim: (u16, OperatingState),
    /// Attacker counter and state.
    pub attacker: (u16, OperatingState),
    /// Victim's last sequence byte.
    pub sequence: u8,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone, Default)]
pub struct ModelWorld {
    victim: u16,
    attacker: u16,
    sequence: u8,
}

impl ModelWorld {
    /// Both counters at zero, no frame sent yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation and return the result.
    ///
    /// The result should match the real implementation's result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Collide { bit } => self.apply_collide(*bit),
            Operation::Send { role } => self.apply_send(*role),
            Operation::Clean { role, count } => {
                let counter = self.counter_mut(*role);
                if *counter < OFFLINE_AT {
                    *counter = counter.saturating_sub(u16::from(*count));
                }
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            victim: (self.victim, state_of(self.victim)),
            attacker: (self.attacker, state_of(self.attacker)),
            sequence: self.sequence,
        }
    }

    /// Whether the victim's bit at `bit` is dominant for its next frame.
    pub fn next_bit_is_dominant(&self, bit: PayloadBit) -> bool {
        let mut payload = PREFIX.to_vec();
        payload.push(self.sequence.wrapping_add(1));
        let index = bit.index();
        payload[index / 8] & (0x80 >> (index % 8)) == 0
    }

    fn apply_collide(&mut self, bit: PayloadBit) -> OperationResult {
        if self.victim >= OFFLINE_AT {
            return OperationResult::Error(OperationError::VictimOffline);
        }
        let dominant = self.next_bit_is_dominant(bit);
        self.sequence = self.sequence.wrapping_add(1);

        if self.attacker >= OFFLINE_AT {
            return OperationResult::Error(OperationError::SenderOffline);
        }

        if dominant {
            self.attacker = (self.attacker + 8).min(OFFLINE_AT);
            self.victim = (self.victim + 8).min(OFFLINE_AT);
            if self.victim < OFFLINE_AT {
                self.victim -= 1;
            }
        }
        OperationResult::Ok
    }

    fn apply_send(&mut self, role: Role) -> OperationResult {
        if role == Role::Victim {
            if self.victim >= OFFLINE_AT {
                return OperationResult::Error(OperationError::VictimOffline);
            }
            self.sequence = self.sequence.wrapping_add(1);
        }

        let counter = self.counter_mut(role);
        if *counter >= OFFLINE_AT {
            return OperationResult::Error(OperationError::SenderOffline);
        }
        *counter = counter.saturating_sub(1);
        OperationResult::Ok
    }

    fn counter_mut(&mut self, role: Role) -> &mut u16 {
        match role {
            Role::Victim => &mut self.victim,
            Role::Attacker => &mut self.attacker,
        }
    }
}

fn state_of(counter: u16) -> OperatingState {
    if counter >= OFFLINE_AT {
        OperatingState::Offline
    } else if counter >= PASSIVE_AT {
        OperatingState::Passive
    } else {
        OperatingState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_collision_costs_seven_and_eight() {
        let mut model = ModelWorld::new();
        assert!(model.apply(&Operation::Collide { bit: PayloadBit(2) }).is_ok());

        let state = model.observable_state();
        assert_eq!(state.victim.0, 7);
        assert_eq!(state.attacker.0, 8);
        assert_eq!(state.sequence, 1);
    }

    #[test]
    fn recessive_collision_changes_nothing() {
        let mut model = ModelWorld::new();
        model.apply(&Operation::Collide { bit: PayloadBit(0) });
        assert_eq!(model.observable_state().victim.0, 0);
        assert_eq!(model.observable_state().attacker.0, 0);
    }

    #[test]
    fn sequence_byte_bits_follow_the_counter() {
        let model = ModelWorld::new();
        // next frame carries seq 1: 0b0000_0001
        assert!(model.next_bit_is_dominant(PayloadBit(24)));
        assert!(!model.next_bit_is_dominant(PayloadBit(31)));
    }

    #[test]
    fn offline_victim_refuses_and_keeps_sequence() {
        let mut model = ModelWorld::new();
        while model.observable_state().victim.1 != OperatingState::Offline {
            model.apply(&Operation::Collide { bit: PayloadBit(2) });
            model.apply(&Operation::Clean { role: Role::Attacker, count: 8 });
        }
        let seq = model.observable_state().sequence;

        assert_eq!(
            model.apply(&Operation::Send { role: Role::Victim }),
            OperationResult::Error(OperationError::VictimOffline)
        );
        assert_eq!(model.observable_state().sequence, seq);
        assert_eq!(model.observable_state().victim.0, 256);
    }
}
