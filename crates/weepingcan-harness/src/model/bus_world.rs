//! Real bus wrapped in the model's interface.

use std::{sync::Arc, time::Duration};

use weepingcan_core::{Bus, BusError, Node, NullSink, RoleError, Victim};
use weepingcan_proto::{CanId, Frame, NodeId};

use super::{
    operation::{Operation, OperationError, OperationResult, PayloadBit, Role},
    world::ObservableState,
};

const VICTIM_ID: u16 = 0x100;
const ATTACKER_ID: u16 = 0x010;

/// A real [`Bus`] with a real [`Victim`] and a bare attacker node, driven by
/// model [`Operation`]s.
#[derive(Debug)]
pub struct BusWorld {
    bus: Arc<Bus>,
    victim: Victim,
    attacker: NodeId,
}

impl BusWorld {
    /// Fresh bus with both participants registered.
    pub fn new() -> Result<Self, RoleError> {
        let bus = Arc::new(Bus::new(Arc::new(NullSink)));
        let victim = Victim::attach(
            bus.clone(),
            NodeId::new("VICTIM"),
            CanId::new(VICTIM_ID)?,
            Duration::from_millis(10),
        )?;
        let attacker = NodeId::new("ATTACKER");
        bus.register(Node::new(attacker.clone()))?;

        Ok(Self { bus, victim, attacker })
    }

    /// Apply an operation.
    ///
    /// Expected refusals come back as [`OperationResult::Error`]; anything
    /// else is returned as `Err`.
    pub fn apply(&mut self, op: &Operation) -> Result<OperationResult, RoleError> {
        let result = match op {
            Operation::Collide { bit } => self.collide(*bit),
            Operation::Send { role: Role::Victim } => self.send_victim(),
            Operation::Send { role: Role::Attacker } => self.send_attacker(),
            Operation::Clean { role, count } => {
                let id = self.node(*role).clone();
                self.bus.transmit_clean(&id, u16::from(*count)).map(drop).map_err(RoleError::from)
            },
        };

        match result {
            Ok(()) => Ok(OperationResult::Ok),
            Err(RoleError::VictimOffline { .. }) => {
                Ok(OperationResult::Error(OperationError::VictimOffline))
            },
            Err(RoleError::Bus(BusError::SenderOffline { .. })) => {
                Ok(OperationResult::Error(OperationError::SenderOffline))
            },
            Err(other) => Err(other),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> Result<ObservableState, RoleError> {
        let victim = self.victim.status()?;
        let attacker = self.bus.status(&self.attacker)?;
        Ok(ObservableState {
            victim: (victim.counter, victim.state),
            attacker: (attacker.counter, attacker.state),
            sequence: self.victim.sequence(),
        })
    }

    fn node(&self, role: Role) -> &NodeId {
        match role {
            Role::Victim => self.victim.node(),
            Role::Attacker => &self.attacker,
        }
    }

    fn collide(&mut self, bit: PayloadBit) -> Result<(), RoleError> {
        let frame = self.victim.next_frame()?;
        let adversarial = Frame::adversarial(
            frame.id(),
            frame.payload().to_vec(),
            self.attacker.clone(),
            bit.offset(),
        )?;
        self.bus.resolve(&frame, Some(&adversarial))?;
        Ok(())
    }

    fn send_victim(&mut self) -> Result<(), RoleError> {
        let frame = self.victim.next_frame()?;
        self.bus.resolve(&frame, None)?;
        Ok(())
    }

    fn send_attacker(&self) -> Result<(), RoleError> {
        let frame = Frame::new(CanId::new(ATTACKER_ID)?, vec![0x00], self.attacker.clone())?;
        self.bus.resolve(&frame, None)?;
        Ok(())
    }
}
