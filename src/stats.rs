use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-wide counters, shared via `Arc` across every strategy's workers.
/// Counters are read only for periodic/final reporting, never used for
/// synchronization, so `Relaxed` ordering is sufficient throughout.
#[derive(Default)]
pub struct Stats {
    requests_received: AtomicUsize,
    responses_sent: AtomicUsize,
    bytes_received: AtomicUsize,
    bytes_sent: AtomicUsize,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_responses_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, n: usize) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests_received: usize,
    pub responses_sent: usize,
    pub bytes_received: usize,
    pub bytes_sent: usize,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "requests_received={} responses_sent={} bytes_received={} bytes_sent={}",
            self.requests_received, self.responses_sent, self.bytes_received, self.bytes_sent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.requests_received, 0);
        assert_eq!(snap.bytes_sent, 0);
    }

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.inc_requests_received();
        stats.inc_requests_received();
        stats.add_bytes_sent(128);
        let snap = stats.snapshot();
        assert_eq!(snap.requests_received, 2);
        assert_eq!(snap.bytes_sent, 128);
    }
}
