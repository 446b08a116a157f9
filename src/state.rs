use crate::probe::ProbeRecord;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Probe records kept for `/status` and `/metrics`.
pub const PROBE_HISTORY_CAPACITY: usize = 100;

/// Bounded, insertion-ordered probe history. Oldest records are evicted first.
#[derive(Debug, Clone)]
pub struct ProbeHistory {
    capacity: usize,
    records: Vec<ProbeRecord>,
}

impl ProbeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    /// Append a record, trimming oldest if over capacity.
    pub fn push(&mut self, record: ProbeRecord) {
        self.records.push(record);
        if self.records.len() > self.capacity {
            let excess = self.records.len() - self.capacity;
            self.records.drain(..excess);
        }
    }

    /// Return the last `n` records (or all if `n` exceeds stored count).
    pub fn tail(&self, n: usize) -> &[ProbeRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn successful(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.successful()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbeRecord> {
        self.records.iter()
    }
}

impl Default for ProbeHistory {
    fn default() -> Self {
        Self::new(PROBE_HISTORY_CAPACITY)
    }
}

/// Process-wide counters and probe history.
#[derive(Debug)]
pub struct PluginState {
    /// Cleared while no valid license is configured.
    pub healthy: bool,
    pub started_at: Instant,
    pub request_count: u64,
    pub error_count: u64,
    pub probe_history: ProbeHistory,
}

impl PluginState {
    pub fn new() -> Self {
        Self {
            healthy: true,
            started_at: Instant::now(),
            request_count: 0,
            error_count: 0,
            probe_history: ProbeHistory::default(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Errors per request, 0 before the first request.
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.request_count as f64
        }
    }

    pub fn record_probe(&mut self, record: ProbeRecord) {
        self.probe_history.push(record);
    }
}

impl Default for PluginState {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedPluginState = Arc<RwLock<PluginState>>;

pub fn shared_plugin_state() -> SharedPluginState {
    Arc::new(RwLock::new(PluginState::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(i: usize) -> ProbeRecord {
        ProbeRecord {
            target: format!("host{i}.example.com"),
            timestamp: Utc::now(),
            success: i % 2 == 0,
            output: format!("output {i}"),
            error: None,
            duration_ms: i as u64,
        }
    }

    #[test]
    fn history_keeps_last_hundred_in_order() {
        let mut history = ProbeHistory::default();
        for i in 0..150 {
            history.push(record(i));
        }
        assert_eq!(history.len(), PROBE_HISTORY_CAPACITY);
        let targets: Vec<_> = history.iter().map(|r| r.target.clone()).collect();
        let expected: Vec<_> = (50..150).map(|i| format!("host{i}.example.com")).collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn hundred_and_first_record_evicts_oldest() {
        let mut history = ProbeHistory::default();
        for i in 0..101 {
            history.push(record(i));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next().unwrap().target, "host1.example.com");
    }

    #[test]
    fn tail_returns_last_n_records() {
        let mut history = ProbeHistory::new(20);
        for i in 0..15 {
            history.push(record(i));
        }
        let tail: Vec<_> = history.tail(3).iter().map(|r| r.duration_ms).collect();
        assert_eq!(tail, vec![12, 13, 14]);
        assert_eq!(history.tail(100).len(), 15);
    }

    #[test]
    fn success_counts() {
        let mut history = ProbeHistory::default();
        for i in 0..5 {
            history.push(record(i));
        }
        assert_eq!(history.successful(), 3);
        assert_eq!(history.failed(), 2);
    }

    #[test]
    fn error_rate_is_zero_without_requests() {
        let mut state = PluginState::new();
        assert_eq!(state.error_rate(), 0.0);
        state.request_count = 4;
        state.error_count = 1;
        assert_eq!(state.error_rate(), 0.25);
    }
}
