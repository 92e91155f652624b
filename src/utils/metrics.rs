//! Per-node scrape counters. These back the health probes and logging
//! only — the spec keeps actual metric *exposition* (Prometheus et al.)
//! external, so this stays a plain in-process counter, not an exporter.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct ScrapeMetrics {
    per_node: Mutex<HashMap<String, (u64, u64)>>,
}

impl ScrapeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, node: &str) {
        let mut guard = self.per_node.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry(node.to_string()).or_insert((0, 0)).0 += 1;
    }

    pub fn record_failure(&self, node: &str) {
        let mut guard = self.per_node.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry(node.to_string()).or_insert((0, 0)).1 += 1;
    }

    /// `(successes, failures)` recorded for `node` so far.
    pub fn counts_for(&self, node: &str) -> (u64, u64) {
        let guard = self.per_node.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(node).copied().unwrap_or((0, 0))
    }

    pub fn forget(&self, node: &str) {
        self.per_node.lock().unwrap_or_else(|e| e.into_inner()).remove(node);
    }
}
