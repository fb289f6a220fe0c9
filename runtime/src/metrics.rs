//! Prometheus metrics for reroute passes and lifecycle phases.
//!
//! Recording goes through the `metrics` facade and is free when no recorder
//! is installed. Hosts that want a scrape endpoint install the Prometheus
//! recorder once and serve [`PrometheusMetrics::render`] themselves.
//!
//! # Example
//!
//! ```rust,no_run
//! use switchyard_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut metrics = PrometheusMetrics::new();
//! metrics.install()?;
//!
//! if let Some(text) = metrics.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use switchyard_core::{ChangeEventKind, Phase};
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from installing the metrics recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The exporter configuration was rejected
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// The recorder could not be installed
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Process-wide Prometheus recorder.
#[derive(Default)]
pub struct PrometheusMetrics {
    handle: Option<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Create an uninstalled recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe every metric and install the Prometheus recorder globally.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is not an error; [`render`](Self::render)
    /// then yields `None` for this instance.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 3.0, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("Metrics recorder already installed, keeping the existing one");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            }
        }
    }

    /// The installed handle, if this instance installed the recorder.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Passes
    describe_counter!("reroute_requests_total", "Reroute requests received");
    describe_counter!(
        "reroute_requests_queued_total",
        "Reroute requests parked behind an in-flight pass"
    );
    describe_gauge!("reroute_queue_depth", "Requests waiting for the next pass");
    describe_counter!("reroute_passes_total", "Reroute passes driven, by mode");
    describe_counter!("reroute_pass_failures_total", "Full passes that rejected");
    describe_counter!(
        "reroute_navigations_canceled_total",
        "Navigations canceled by a before-routing-event subscriber"
    );
    describe_histogram!(
        "reroute_pass_duration_seconds",
        "Time from a pass starting to its waiters settling"
    );

    // Lifecycle phases
    describe_counter!("lifecycle_phases_total", "Lifecycle phases run, by phase");
    describe_counter!(
        "lifecycle_phase_failures_total",
        "Lifecycle phases that failed, by phase"
    );
    describe_counter!(
        "lifecycle_phase_timeouts_total",
        "Lifecycle phases that exceeded their budget, by phase"
    );
    describe_histogram!(
        "lifecycle_phase_duration_seconds",
        "Time spent in a lifecycle hook, by phase"
    );

    // Notifications
    describe_counter!("notifications_emitted_total", "Lifecycle notifications emitted, by kind");
    describe_counter!(
        "notification_errors_deferred_total",
        "Subscriber or listener errors rescheduled outside a pass"
    );
}

/// Reroute pass metrics recorder.
pub struct RerouteMetrics;

impl RerouteMetrics {
    /// Record a reroute request.
    pub fn record_request() {
        counter!("reroute_requests_total").increment(1);
    }

    /// Record requests parked behind an in-flight pass.
    pub fn record_queued(depth: usize) {
        counter!("reroute_requests_queued_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!("reroute_queue_depth").set(depth as f64);
    }

    /// Record a pass that started.
    pub fn record_pass(mode: &'static str) {
        counter!("reroute_passes_total", "mode" => mode).increment(1);
    }

    /// Record a pass that settled its waiters.
    pub fn record_settled(duration: Duration) {
        gauge!("reroute_queue_depth").set(0.0);
        histogram!("reroute_pass_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a pass that rejected.
    pub fn record_failure() {
        counter!("reroute_pass_failures_total").increment(1);
    }

    /// Record a canceled navigation.
    pub fn record_canceled() {
        counter!("reroute_navigations_canceled_total").increment(1);
    }
}

/// Lifecycle phase metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a phase that ran to completion, successfully or not.
    pub fn record_phase(phase: Phase, duration: Duration) {
        counter!("lifecycle_phases_total", "phase" => phase.as_str()).increment(1);
        histogram!("lifecycle_phase_duration_seconds", "phase" => phase.as_str())
            .record(duration.as_secs_f64());
    }

    /// Record a failed phase.
    pub fn record_failure(phase: Phase) {
        counter!("lifecycle_phase_failures_total", "phase" => phase.as_str()).increment(1);
    }

    /// Record a phase that exceeded its budget.
    pub fn record_timeout(phase: Phase) {
        counter!("lifecycle_phase_timeouts_total", "phase" => phase.as_str()).increment(1);
    }
}

/// Notification metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record an emitted notification.
    pub fn record_emitted(kind: ChangeEventKind) {
        counter!("notifications_emitted_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record an error rescheduled outside a pass.
    pub fn record_deferred_error() {
        counter!("notification_errors_deferred_total").increment(1);
    }
}
