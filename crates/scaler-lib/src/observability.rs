//! Observability infrastructure for the resource scaler
//!
//! Provides:
//! - Prometheus metrics (evaluation latency, outcomes, activity, pod counts)
//! - Structured JSON logging of lifecycle events with tracing

use crate::error::ScalerError;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Histogram, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for evaluation latency (in seconds); one evaluation
/// is a handful of API round trips
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    evaluation_latency_seconds: Histogram,
    evaluations_total: IntCounterVec,
    evaluation_errors_total: IntCounterVec,
    active: IntGaugeVec,
    contributing_pods: IntGaugeVec,
    scalers_registered: IntGauge,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_latency_seconds: register_histogram!(
                "resource_scaler_evaluation_latency_seconds",
                "Time spent evaluating one scaler, listing included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            evaluations_total: register_int_counter_vec!(
                "resource_scaler_evaluations_total",
                "Total number of scaler evaluations",
                &["scaler"]
            )
            .expect("Failed to register evaluations_total"),

            evaluation_errors_total: register_int_counter_vec!(
                "resource_scaler_evaluation_errors_total",
                "Total number of failed scaler evaluations by error kind",
                &["scaler", "kind"]
            )
            .expect("Failed to register evaluation_errors_total"),

            active: register_int_gauge_vec!(
                "resource_scaler_active",
                "Whether the scaler last reported its workload active (0/1)",
                &["scaler"]
            )
            .expect("Failed to register active"),

            contributing_pods: register_int_gauge_vec!(
                "resource_scaler_contributing_pods",
                "Pods that contributed to the last aggregate",
                &["scaler"]
            )
            .expect("Failed to register contributing_pods"),

            scalers_registered: register_int_gauge!(
                "resource_scaler_scalers_registered",
                "Number of scalers currently registered"
            )
            .expect("Failed to register scalers_registered"),
        }
    }
}

/// Scaler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    /// Record a successful evaluation
    pub fn record_evaluation(&self, scaler: &str, active: bool, pods: usize) {
        let inner = self.inner();
        inner.evaluations_total.with_label_values(&[scaler]).inc();
        inner
            .active
            .with_label_values(&[scaler])
            .set(i64::from(active));
        inner
            .contributing_pods
            .with_label_values(&[scaler])
            .set(i64::try_from(pods).unwrap_or(i64::MAX));
    }

    /// Record a failed evaluation
    pub fn record_error(&self, scaler: &str, error: &ScalerError) {
        let inner = self.inner();
        inner.evaluations_total.with_label_values(&[scaler]).inc();
        inner
            .evaluation_errors_total
            .with_label_values(&[scaler, error.kind()])
            .inc();
    }

    pub fn set_scalers_registered(&self, count: i64) {
        self.inner().scalers_registered.set(count);
    }
}

/// Structured logger for scaler lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, triggers: usize) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            triggers = triggers,
            "Resource scaler started"
        );
    }

    /// Log a scaler built from a trigger
    pub fn log_scaler_registered(
        &self,
        scaler: &str,
        resource: &str,
        metric_type: &str,
        namespace: &str,
        workload: Option<&str>,
    ) {
        info!(
            event = "scaler_registered",
            node = %self.node_name,
            scaler = %scaler,
            resource = %resource,
            metric_type = %metric_type,
            namespace = %namespace,
            workload = ?workload,
            "Registered resource scaler"
        );
    }

    /// Log a completed evaluation
    pub fn log_evaluation(
        &self,
        scaler: &str,
        aggregate: Option<&str>,
        pods: usize,
        active: bool,
        elapsed_ms: u128,
    ) {
        info!(
            event = "evaluation_completed",
            node = %self.node_name,
            scaler = %scaler,
            aggregate = ?aggregate,
            pods = pods,
            active = active,
            elapsed_ms = elapsed_ms as u64,
            "Evaluated scaler activity"
        );
    }

    /// Log a failed evaluation
    pub fn log_evaluation_failed(&self, scaler: &str, error: &ScalerError) {
        warn!(
            event = "evaluation_failed",
            node = %self.node_name,
            scaler = %scaler,
            kind = %error.kind(),
            retryable = error.is_retryable(),
            error = %error,
            "Scaler evaluation failed"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Resource scaler shutting down"
        );
    }
}
