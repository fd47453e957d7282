//! Fuzz target for the [`Node`] fault-confinement state machine
//!
//! # Strategy
//!
//! - Mutation sequences: arbitrary interleavings of increments and
//!   decrements with arbitrary amounts, including zero and `u16::MAX`
//!
//! # Invariants
//!
//! - Counter never exceeds 256
//! - State always equals the state derived from the counter
//! - A transition is returned exactly when the state changed
//! - No mutation moves a node out of `Offline`
//! - NEVER panic on any amount

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weepingcan_core::{Node, OperatingState, OFFLINE_THRESHOLD};
use weepingcan_proto::NodeId;

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Mutation {
    Increment(u16),
    Decrement(u16),
    Penalty,
    Credit,
}

fuzz_target!(|mutations: Vec<Mutation>| {
    let mut node = Node::new(NodeId::new("FUZZ"));

    for mutation in mutations {
        let before = node.state();
        let frozen_counter = node.counter();

        let transition = match mutation {
            Mutation::Increment(n) => node.increment(n),
            Mutation::Decrement(n) => node.decrement(n),
            Mutation::Penalty => node.increment(8),
            Mutation::Credit => node.decrement(1),
        };

        assert!(node.counter() <= OFFLINE_THRESHOLD);
        assert_eq!(node.state(), OperatingState::from_counter(node.counter()));

        match transition {
            Some(t) => {
                assert_eq!(t.from, before);
                assert_eq!(t.to, node.state());
                assert_ne!(t.from, t.to);
                assert_eq!(t.counter, node.counter());
            },
            None => assert_eq!(node.state(), before),
        }

        if before == OperatingState::Offline {
            assert_eq!(node.state(), OperatingState::Offline);
            assert_eq!(node.counter(), frozen_counter, "Offline must be terminal");
        }
    }
});
