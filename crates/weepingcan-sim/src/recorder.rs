//! JSON-lines event log.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use weepingcan_core::{BusEvent, EventSink};

/// Appends one JSON object per event to a file.
///
/// Write failures are logged and dropped; recording never affects the run.
#[derive(Debug)]
pub struct JsonLinesSink {
    out: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create or truncate `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self { out: Mutex::new(BufWriter::new(file)) })
    }

    /// Flush buffered lines to disk.
    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for JsonLinesSink {
    fn record(&self, event: &BusEvent) {
        let mut out = self.lock();
        let result = serde_json::to_writer(&mut *out, event)
            .map_err(io::Error::from)
            .and_then(|()| out.write_all(b"\n"));

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to record event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use weepingcan_core::{SimConfig, Simulation};

    use super::*;

    #[test]
    fn writes_one_tagged_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = Arc::new(JsonLinesSink::create(&path).unwrap());

        let config = SimConfig { max_cycles: 2, seed: Some(1), ..SimConfig::default() };
        let injector = crate::injector(1);
        let mut sim = Simulation::new(&config, injector, sink.clone()).unwrap();
        sim.run().unwrap();
        sink.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let events: Vec<serde_json::Value> =
            text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();

        assert_eq!(events[0]["event"], "node_registered");
        assert_eq!(events[0]["node"], "VICTIM");
        assert_eq!(events[2]["event"], "target_observed");
        assert_eq!(events.iter().filter(|e| e["event"] == "cycle").count(), 2);
        assert!(events.iter().all(|e| e["event"].is_string()));
    }
}
