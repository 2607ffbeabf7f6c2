use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Invocation counters, shared between clients through an `Arc`.
#[derive(Default)]
pub struct Metrics {
    prechecks: AtomicU64,
    executions: AtomicU64,
    policy_denials: AtomicU64,
    schema_failures: AtomicU64,
    fatal_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_prechecks(&self) {
        self.prechecks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_policy_denials(&self) {
        self.policy_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_schema_failures(&self) {
        self.schema_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fatal_errors(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            prechecks: self.prechecks.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            policy_denials: self.policy_denials.load(Ordering::Relaxed),
            schema_failures: self.schema_failures.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub prechecks: u64,
    pub executions: u64,
    pub policy_denials: u64,
    pub schema_failures: u64,
    pub fatal_errors: u64,
}
