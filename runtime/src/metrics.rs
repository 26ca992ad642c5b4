//! Prometheus metrics for lock coordination and protected sections.
//!
//! This module provides metric collection for:
//! - Lock acquisition (acquired, unavailable, interrupted, store faults)
//! - Lease overruns observed on release
//! - Protected section duration, commits and rollbacks
//!
//! Nothing is recorded until a recorder is installed; without one every
//! `counter!`/`histogram!` call is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use tastebud_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::install()?;
//!
//! // Serve this from the application's `/metrics` route.
//! let scrape = metrics.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Histogram buckets, in seconds. Lock waits are bounded by the wait bound
/// and sections by the lease, both a few seconds at most.
const DURATION_BUCKETS: &[f64] = &[
    0.000_5, 0.001, 0.002_5, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 3.0, 5.0,
];

/// Errors from installing the Prometheus recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The bucket layout was rejected
    #[error("Invalid Prometheus bucket layout: {0}")]
    Buckets(String),
    /// Another recorder owns the global slot
    #[error("Could not install Prometheus recorder: {0}")]
    Install(String),
}

/// Global Prometheus recorder for lock and section metrics.
///
/// The application exposes [`PrometheusMetrics::render`] on its own scrape
/// route.
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: PrometheusHandle,
}

impl PrometheusMetrics {
    /// Describe every metric and install the recorder process-wide.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), DURATION_BUCKETS)
            .map_err(|e| MetricsError::Buckets(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus recorder installed");
        Ok(Self { handle })
    }

    /// Current values in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "lock_acquired_total",
        "Total number of named locks acquired"
    );
    describe_counter!(
        "lock_unavailable_total",
        "Total number of acquisitions that timed out on the wait bound"
    );
    describe_counter!(
        "lock_interrupted_total",
        "Total number of lock waits abandoned because of shutdown"
    );
    describe_counter!(
        "lock_store_errors_total",
        "Total number of coordination store faults"
    );
    describe_counter!(
        "lock_lease_overruns_total",
        "Total number of locks released after their lease had elapsed"
    );
    describe_histogram!(
        "lock_wait_duration_seconds",
        "Time spent queueing for a lock"
    );

    describe_histogram!(
        "protected_section_duration_seconds",
        "Time spent inside a protected section, including commit"
    );
    describe_counter!(
        "protected_section_commits_total",
        "Total number of protected sections that committed"
    );
    describe_counter!(
        "protected_section_rollbacks_total",
        "Total number of protected sections that rolled back"
    );
}

/// Lock coordinator metrics recorder.
pub struct LockMetrics;

impl LockMetrics {
    /// Record a successful acquisition.
    pub fn record_acquired(waited: Duration) {
        counter!("lock_acquired_total").increment(1);
        histogram!("lock_wait_duration_seconds").record(waited.as_secs_f64());
    }

    /// Record an acquisition that ran out of wait time.
    pub fn record_unavailable(waited: Duration) {
        counter!("lock_unavailable_total").increment(1);
        histogram!("lock_wait_duration_seconds").record(waited.as_secs_f64());
    }

    /// Record a wait abandoned on shutdown.
    pub fn record_interrupted() {
        counter!("lock_interrupted_total").increment(1);
    }

    /// Record a coordination store fault.
    pub fn record_store_error() {
        counter!("lock_store_errors_total").increment(1);
    }

    /// Record a release that happened after the lease elapsed.
    pub fn record_lease_overrun() {
        counter!("lock_lease_overruns_total").increment(1);
    }
}

/// Protected section metrics recorder.
pub struct SectionMetrics;

impl SectionMetrics {
    /// Record a committed section.
    pub fn record_commit(duration: Duration) {
        counter!("protected_section_commits_total").increment(1);
        histogram!("protected_section_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a rolled back section.
    pub fn record_rollback(duration: Duration) {
        counter!("protected_section_rollbacks_total").increment(1);
        histogram!("protected_section_duration_seconds").record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_are_noops_without_exporter() {
        LockMetrics::record_acquired(Duration::from_millis(1));
        SectionMetrics::record_rollback(Duration::from_millis(1));
    }

    #[test]
    fn test_rendered_after_install() {
        // The global slot may already be taken by another test in this binary.
        let Ok(metrics) = PrometheusMetrics::install() else {
            return;
        };

        LockMetrics::record_acquired(Duration::from_millis(3));
        LockMetrics::record_unavailable(Duration::from_millis(50));
        LockMetrics::record_lease_overrun();
        SectionMetrics::record_commit(Duration::from_millis(2));

        let rendered = metrics.render();
        assert!(rendered.contains("lock_acquired_total"));
        assert!(rendered.contains("lock_unavailable_total"));
        assert!(rendered.contains("lock_lease_overruns_total"));
        assert!(rendered.contains("protected_section_commits_total"));
        assert!(rendered.contains("lock_wait_duration_seconds_bucket"));
    }
}
