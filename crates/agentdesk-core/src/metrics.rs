//! Global atomic counters for AgentDesk observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`DeskMetrics::flush`] to emit current values as a single
//! `tracing::info!` event, or [`DeskMetrics::snapshot`] to read them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: DeskMetrics = DeskMetrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct DeskMetrics {
    provider_attempts: AtomicU64,
    provider_failures: AtomicU64,
    generations_succeeded: AtomicU64,
    generations_exhausted: AtomicU64,
    runs_recorded: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub provider_attempts: u64,
    pub provider_failures: u64,
    pub generations_succeeded: u64,
    pub generations_exhausted: u64,
    pub runs_recorded: u64,
}

impl Default for DeskMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DeskMetrics {
    pub const fn new() -> Self {
        Self {
            provider_attempts: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            generations_succeeded: AtomicU64::new(0),
            generations_exhausted: AtomicU64::new(0),
            runs_recorded: AtomicU64::new(0),
        }
    }

    pub fn inc_provider_attempts(&self) {
        self.provider_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "provider_attempts", "counter incremented");
    }

    pub fn inc_provider_failures(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "provider_failures", "counter incremented");
    }

    pub fn inc_generations_succeeded(&self) {
        self.generations_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_succeeded", "counter incremented");
    }

    pub fn inc_generations_exhausted(&self) {
        self.generations_exhausted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_exhausted", "counter incremented");
    }

    pub fn inc_runs_recorded(&self) {
        self.runs_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_recorded", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            provider_attempts: self.provider_attempts.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            generations_succeeded: self.generations_succeeded.load(Ordering::Relaxed),
            generations_exhausted: self.generations_exhausted.load(Ordering::Relaxed),
            runs_recorded: self.runs_recorded.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a command) rather than on
    /// every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            provider_attempts = s.provider_attempts,
            provider_failures = s.provider_failures,
            generations_succeeded = s.generations_succeeded,
            generations_exhausted = s.generations_exhausted,
            runs_recorded = s.runs_recorded,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.provider_attempts.store(0, Ordering::Relaxed);
        self.provider_failures.store(0, Ordering::Relaxed);
        self.generations_succeeded.store(0, Ordering::Relaxed);
        self.generations_exhausted.store(0, Ordering::Relaxed);
        self.runs_recorded.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = DeskMetrics::new();
        m.inc_provider_attempts();
        m.inc_provider_attempts();
        m.inc_provider_failures();
        m.inc_generations_exhausted();
        m.inc_runs_recorded();

        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                provider_attempts: 2,
                provider_failures: 1,
                generations_succeeded: 0,
                generations_exhausted: 1,
                runs_recorded: 1,
            }
        );
    }

    #[test]
    fn reset_zeroes_all() {
        let m = DeskMetrics::new();
        m.inc_provider_attempts();
        m.inc_generations_succeeded();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
