//! In-memory event recorder.

use std::sync::{Mutex, MutexGuard, PoisonError};

use weepingcan_core::{BusEvent, EventSink};

/// Keeps every recorded event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BusEvent>>,
}

impl RecordingSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, in order.
    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&BusEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(e)).count()
    }

    /// Take and clear the recorded events.
    pub fn take(&self) -> Vec<BusEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BusEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &BusEvent) {
        self.lock().push(event.clone());
    }
}
