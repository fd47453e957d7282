//! Fuzz target for [`Bus::resolve`] over arbitrary frame pairs
//!
//! # Strategy
//!
//! - Identifiers: any `u16`, masked to 11 bits
//! - Payloads: 0 to 8 arbitrary bytes, possibly of different lengths
//! - Injections: optional recessive override at any payload bit
//! - Senders: both nodes, including self-collision
//!
//! # Invariants
//!
//! - Counters stay within 0..=256 and states match counters
//! - A resolution changes each counter by at most +8
//! - Arbitration never touches the loser's counter
//! - Coalesced resolution changes no counter
//! - Errors leave every counter unchanged
//! - NEVER panic on any input

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weepingcan_core::{Bus, Node, NullSink, OperatingState, Resolution};
use weepingcan_proto::{frame, CanId, Frame, NodeId, MAX_PAYLOAD};

#[derive(Debug, Clone, Arbitrary)]
struct FuzzedFrame {
    id: u16,
    payload: Vec<u8>,
    injection: Option<u8>,
    from_second: bool,
}

#[derive(Debug, Clone, Arbitrary)]
struct Round {
    primary: FuzzedFrame,
    concurrent: Option<FuzzedFrame>,
}

fn build(fuzzed: &FuzzedFrame, nodes: &[NodeId; 2]) -> Option<Frame> {
    let id = CanId::new(fuzzed.id & CanId::MAX).ok()?;
    let payload: Vec<u8> = fuzzed.payload.iter().copied().take(MAX_PAYLOAD).collect();
    let sender = nodes[usize::from(fuzzed.from_second)].clone();

    match fuzzed.injection {
        Some(bit) => {
            let span = frame::payload_span(payload.len());
            let offset = span.start + usize::from(bit);
            Frame::adversarial(id, payload, sender, offset).ok()
        },
        None => Frame::new(id, payload, sender).ok(),
    }
}

fuzz_target!(|rounds: Vec<Round>| {
    let bus = Arc::new(Bus::new(Arc::new(NullSink)));
    let nodes = [NodeId::new("A"), NodeId::new("B")];
    for node in &nodes {
        bus.register(Node::new(node.clone())).unwrap();
    }

    for round in rounds {
        let Some(primary) = build(&round.primary, &nodes) else { continue };
        let concurrent = match &round.concurrent {
            Some(f) => match build(f, &nodes) {
                Some(frame) => Some(frame),
                None => continue,
            },
            None => None,
        };

        let before = bus.statuses();
        let result = bus.resolve(&primary, concurrent.as_ref());
        let after = bus.statuses();

        for (b, a) in before.iter().zip(&after) {
            assert!(a.counter <= 256);
            assert_eq!(a.state, OperatingState::from_counter(a.counter));
            assert!(a.counter <= b.counter + 8);
            if b.state == OperatingState::Offline {
                assert_eq!(a.counter, b.counter);
            }
        }

        match result {
            Err(_) | Ok(Resolution::Coalesced { .. }) => assert_eq!(before, after),
            Ok(Resolution::Arbitrated { loser, .. }) => {
                let index = nodes.iter().position(|n| *n == loser).unwrap();
                assert_eq!(before[index], after[index]);
            },
            Ok(_) => {},
        }
    }
});
