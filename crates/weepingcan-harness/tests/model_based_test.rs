//! Model-based property tests.
//!
//! Random operation sequences are applied to the reference model and to a
//! real bus with a real victim; results and counters must agree after every
//! step.
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld      BusWorld       Compare
//!      (arithmetic)   (Bus + frames)   states
//! ```

use proptest::prelude::*;
use weepingcan_harness::{
    BusWorld, ModelWorld, Operation, OperationError, OperationResult, PayloadBit, Role,
};

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => any::<u8>().prop_map(|b| Operation::Collide { bit: PayloadBit(b) }),
        2 => prop_oneof![Just(Role::Victim), Just(Role::Attacker)]
            .prop_map(|role| Operation::Send { role }),
        2 => (prop_oneof![Just(Role::Victim), Just(Role::Attacker)], 0..16u8)
            .prop_map(|(role, count)| Operation::Clean { role, count }),
    ]
}

proptest! {
    /// Results and observable state match after every operation.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(), 0..200)) {
        let mut model = ModelWorld::new();
        let mut real = BusWorld::new().unwrap();

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op).unwrap();

            prop_assert_eq!(
                &model_result, &real_result,
                "result divergence at operation {}: {:?}", i, op
            );
            prop_assert_eq!(
                model.observable_state(), real.observable_state().unwrap(),
                "state divergence at operation {}: {:?}", i, op
            );
        }
    }

    /// Counters stay in range and bus-off is never left.
    #[test]
    fn prop_model_invariants(ops in prop::collection::vec(operation_strategy(), 0..300)) {
        let mut model = ModelWorld::new();
        let mut offline = (false, false);

        for op in ops {
            let _ = model.apply(&op);
            let state = model.observable_state();

            prop_assert!(state.victim.0 <= 256);
            prop_assert!(state.attacker.0 <= 256);

            let now = (state.victim.0 == 256, state.attacker.0 == 256);
            prop_assert!(!offline.0 || now.0, "victim left bus-off");
            prop_assert!(!offline.1 || now.1, "attacker left bus-off");
            offline = now;
        }
    }

    /// Collisions at recessive bits never move a counter.
    #[test]
    fn prop_recessive_collision_is_free(bit in any::<u8>()) {
        let mut model = ModelWorld::new();
        let bit = PayloadBit(bit);
        prop_assume!(!model.next_bit_is_dominant(bit));

        let before = model.observable_state();
        let result = model.apply(&Operation::Collide { bit });
        prop_assert!(result.is_ok());
        let after = model.observable_state();

        prop_assert_eq!(before.victim, after.victim);
        prop_assert_eq!(before.attacker, after.attacker);
    }
}

#[cfg(test)]
mod smoke_tests {
    use super::*;

    #[test]
    fn model_and_real_agree_on_a_full_attack() {
        let mut model = ModelWorld::new();
        let mut real = BusWorld::new().unwrap();
        let ops = [
            Operation::Collide { bit: PayloadBit(2) },
            Operation::Clean { role: Role::Attacker, count: 5 },
        ];

        for _ in 0..37 {
            for op in &ops {
                assert_eq!(model.apply(op), real.apply(op).unwrap());
            }
        }

        let state = real.observable_state().unwrap();
        assert_eq!(state, model.observable_state());
        assert_eq!(state.victim.0, 256);
        assert_eq!(state.attacker.0, 111);
        assert_eq!(
            real.apply(&Operation::Collide { bit: PayloadBit(2) }).unwrap(),
            OperationResult::Error(OperationError::VictimOffline)
        );
    }
}
