//! Fuzz target comparing the reference model with a real bus
//!
//! # Strategy
//!
//! - Operation sequences: the same `Operation` values the property tests
//!   generate, decoded from raw fuzzer bytes
//!
//! # Invariants
//!
//! - Model and bus return the same result for every operation
//! - Model and bus agree on both counters, both states and the victim's
//!   sequence byte after every operation
//! - The bus never reports an unexpected error

#![no_main]

use libfuzzer_sys::fuzz_target;
use weepingcan_harness::{BusWorld, ModelWorld, Operation};

fuzz_target!(|ops: Vec<Operation>| {
    let mut model = ModelWorld::new();
    let mut real = BusWorld::new().unwrap();

    for (i, op) in ops.iter().enumerate() {
        let expected = model.apply(op);
        let actual = real.apply(op).unwrap();
        assert_eq!(expected, actual, "result divergence at operation {i}: {op:?}");
        assert_eq!(
            model.observable_state(),
            real.observable_state().unwrap(),
            "state divergence at operation {i}: {op:?}"
        );
    }
});
