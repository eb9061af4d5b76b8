//! Global atomic counters for TierGate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters.
pub struct Metrics {
    pipelines_submitted: AtomicU64,
    decisions_approved: AtomicU64,
    decisions_rejected: AtomicU64,
    consultant_timeouts: AtomicU64,
    consultant_failures: AtomicU64,
    cancellation_violations: AtomicU64,
    reports_dropped: AtomicU64,
    report_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($inc:ident, $get:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = stringify!($field), "counter incremented");
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            pipelines_submitted: AtomicU64::new(0),
            decisions_approved: AtomicU64::new(0),
            decisions_rejected: AtomicU64::new(0),
            consultant_timeouts: AtomicU64::new(0),
            consultant_failures: AtomicU64::new(0),
            cancellation_violations: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            report_failures: AtomicU64::new(0),
        }
    }

    counter!(inc_pipelines_submitted, pipelines_submitted, pipelines_submitted);
    counter!(inc_decisions_approved, decisions_approved, decisions_approved);
    counter!(inc_decisions_rejected, decisions_rejected, decisions_rejected);
    counter!(inc_consultant_timeouts, consultant_timeouts, consultant_timeouts);
    counter!(inc_consultant_failures, consultant_failures, consultant_failures);
    counter!(
        inc_cancellation_violations,
        cancellation_violations,
        cancellation_violations
    );
    counter!(inc_reports_dropped, reports_dropped, reports_dropped);
    counter!(inc_report_failures, report_failures, report_failures);

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            pipelines_submitted = self.pipelines_submitted(),
            decisions_approved = self.decisions_approved(),
            decisions_rejected = self.decisions_rejected(),
            consultant_timeouts = self.consultant_timeouts(),
            consultant_failures = self.consultant_failures(),
            cancellation_violations = self.cancellation_violations(),
            reports_dropped = self.reports_dropped(),
            report_failures = self.report_failures(),
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for c in [
            &self.pipelines_submitted,
            &self.decisions_approved,
            &self.decisions_rejected,
            &self.consultant_timeouts,
            &self.consultant_failures,
            &self.cancellation_violations,
            &self.reports_dropped,
            &self.report_failures,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}
