//! Per-host counters for conditions that §7 says are "locally recovered" rather than `Result`
//! errors: discarded events and per-event execution faults.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters read back after `finish()`, matching §7's "counted" rows of the error taxonomy: an
/// event arriving after `end_time` and a per-event execute fault are never propagated as errors,
/// only recorded here for the embedder to inspect.
#[derive(Debug, Default)]
pub struct HostStats {
    events_dropped_after_end: AtomicU64,
    events_faulted: AtomicU64,
}

impl HostStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dropped_after_end(&self) {
        self.events_dropped_after_end.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.events_faulted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_dropped_after_end(&self) -> u64 {
        self.events_dropped_after_end.load(Ordering::Relaxed)
    }

    pub fn events_faulted(&self) -> u64 {
        self.events_faulted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let stats = HostStats::new();
        assert_eq!(stats.events_dropped_after_end(), 0);
        stats.record_dropped_after_end();
        stats.record_dropped_after_end();
        stats.record_fault();
        assert_eq!(stats.events_dropped_after_end(), 2);
        assert_eq!(stats.events_faulted(), 1);
    }
}
