use crate::telemetry::{runtime_counters, RuntimeCounters};
use std::sync::OnceLock;

pub use crate::telemetry::{AttemptCountSnapshot, PollOutcomeSnapshot, RuntimeCountersSnapshot};

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn record_call_attempt(&self, endpoint: &str, classification: &str) {
        self.counters.record_call_attempt(endpoint, classification);
    }

    pub fn record_poll_outcome(&self, tier: &str, satisfied: bool, ready: usize, total: usize) {
        self.counters
            .record_poll_outcome(tier, satisfied, ready, total);
    }

    pub fn inc_launch_success(&self) {
        self.counters.inc_launch_success();
    }

    pub fn inc_launch_failure(&self) {
        self.counters.inc_launch_failure();
    }

    pub fn inc_fallback_engaged(&self) {
        self.counters.inc_fallback_engaged();
    }

    pub fn inc_monitor_degradation(&self) {
        self.counters.inc_monitor_degradation();
    }
}

pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}
