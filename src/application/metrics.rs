use std::collections::HashMap;
use std::sync::Mutex;

/// Counters the orchestrator publishes, labeled by origin/destination
/// routing number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    InboundFilesProcessed,
    MissingConfigs,
    TransfersMerged,
    FilesUploaded,
    UploadErrors,
    ReturnFilesProcessed,
}

/// Process-lifetime metrics recorder, injected through the coordinator's
/// construction rather than living in package-level shared state.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<HashMap<(Counter, String), u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, counter: Counter, routing_number: &str) {
        let mut counters = self.counters.lock().expect("metrics lock poisoned");
        *counters
            .entry((counter, routing_number.to_string()))
            .or_insert(0) += 1;
    }

    pub fn get(&self, counter: Counter, routing_number: &str) -> u64 {
        let counters = self.counters.lock().expect("metrics lock poisoned");
        counters
            .get(&(counter, routing_number.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Sorted copy of every labeled counter, for the shutdown dump.
    pub fn snapshot(&self) -> Vec<((Counter, String), u64)> {
        let counters = self.counters.lock().expect("metrics lock poisoned");
        let mut all: Vec<_> = counters.iter().map(|(k, v)| (k.clone(), *v)).collect();
        all.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));
        all
    }
}
