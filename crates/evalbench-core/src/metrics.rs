//! Global atomic counters for grading runs.
//!
//! Counters are bumped at the call site without logging. Call
//! [`Metrics::flush`] at the end of a grading run to emit the totals as one
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::sandbox::ExecutionOutcome;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    executions: AtomicU64,
    timeouts: AtomicU64,
    syntax_failures: AtomicU64,
    runtime_failures: AtomicU64,
    launch_faults: AtomicU64,
    grades_emitted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            executions: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            syntax_failures: AtomicU64::new(0),
            runtime_failures: AtomicU64::new(0),
            launch_faults: AtomicU64::new(0),
            grades_emitted: AtomicU64::new(0),
        }
    }

    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a sandbox fault (interpreter missing, malformed reply, ...).
    pub fn inc_launch_faults(&self) {
        self.launch_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_grades(&self, n: u64) {
        self.grades_emitted.fetch_add(n, Ordering::Relaxed);
    }

    /// Bump the counter matching a failed outcome. Successes are not counted
    /// separately.
    pub fn record_outcome(&self, outcome: &ExecutionOutcome) {
        let counter = match outcome {
            ExecutionOutcome::Success { .. } => return,
            ExecutionOutcome::Timeout { .. } => &self.timeouts,
            ExecutionOutcome::SyntaxFailure { .. } => &self.syntax_failures,
            ExecutionOutcome::RuntimeFailure { .. } => &self.runtime_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            executions = self.executions(),
            timeouts = self.timeouts(),
            syntax_failures = self.syntax_failures(),
            runtime_failures = self.runtime_failures(),
            launch_faults = self.launch_faults(),
            grades_emitted = self.grades_emitted(),
        );
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn syntax_failures(&self) -> u64 {
        self.syntax_failures.load(Ordering::Relaxed)
    }

    pub fn runtime_failures(&self) -> u64 {
        self.runtime_failures.load(Ordering::Relaxed)
    }

    pub fn launch_faults(&self) -> u64 {
        self.launch_faults.load(Ordering::Relaxed)
    }

    pub fn grades_emitted(&self) -> u64 {
        self.grades_emitted.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.executions,
            &self.timeouts,
            &self.syntax_failures,
            &self.runtime_failures,
            &self.launch_faults,
            &self.grades_emitted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
