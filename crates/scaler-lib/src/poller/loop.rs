//! Evaluation loop
//!
//! Periodically evaluates every registered scaler with a configurable
//! interval and jitter, recording the outcome, the metrics and the
//! component health.

use super::{ActivityRegistry, ActivityReport, RegisteredScaler};
use crate::error::{Collaborator, ScalerError};
use crate::health::{components, HealthRegistry};
use crate::observability::{ScalerMetrics, StructuredLogger};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

/// Configuration for the evaluation loop
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Base evaluation interval (default: 15 seconds)
    pub interval: Duration,
    /// Maximum jitter to add to interval (default: 1 second)
    pub jitter: Duration,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            jitter: Duration::from_secs(1),
        }
    }
}

/// Results from one evaluation cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleResults {
    pub evaluated: usize,
    pub active: usize,
    pub errors: usize,
}

/// Health component a failed evaluation is charged to
///
/// `None` for outcomes that say nothing about the collaborators, such as
/// a workload that currently has no running pods.
fn failing_component(error: &ScalerError) -> Option<&'static str> {
    match error {
        ScalerError::Listing {
            collaborator: Collaborator::Metrics,
            ..
        } => Some(components::METRICS_API),
        ScalerError::Listing {
            collaborator: Collaborator::Cluster,
            ..
        }
        | ScalerError::NotFound { .. } => Some(components::CLUSTER_API),
        ScalerError::Config(_)
        | ScalerError::UnsupportedWorkload(_)
        | ScalerError::UnsupportedMetric(_) => Some(components::EVALUATOR),
        ScalerError::NoActivePods { .. } => None,
    }
}

/// Loop that evaluates all registered scalers once per interval
pub struct EvaluationLoop {
    registry: Arc<ActivityRegistry>,
    health: HealthRegistry,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
    config: EvaluationConfig,
}

impl EvaluationLoop {
    pub fn new(
        registry: Arc<ActivityRegistry>,
        health: HealthRegistry,
        logger: StructuredLogger,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            registry,
            health,
            metrics: ScalerMetrics::new(),
            logger,
            config,
        }
    }

    /// Run until a shutdown signal is received
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            scalers = self.registry.len(),
            "Starting scaler evaluation loop"
        );

        let mut ticker = interval(self.current_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let results = self.evaluate_all().await;
                    debug!(
                        evaluated = results.evaluated,
                        active = results.active,
                        errors = results.errors,
                        "Evaluation cycle complete"
                    );

                    // Re-draw the jitter for the next cycle
                    ticker = interval(self.current_interval());
                    ticker.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scaler evaluation loop");
                    break;
                }
            }
        }
    }

    fn current_interval(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }

    /// Evaluate every registered scaler once, sequentially
    pub async fn evaluate_all(&self) -> CycleResults {
        let mut results = CycleResults::default();
        let scalers = self.registry.scalers();
        self.metrics.set_scalers_registered(scalers.len() as i64);

        for registered in scalers {
            results.evaluated += 1;
            match self.evaluate_one(&registered).await {
                Some(true) => results.active += 1,
                Some(false) => {}
                None => results.errors += 1,
            }
        }

        results
    }

    /// Evaluate one scaler, returning its activity or `None` on failure.
    /// Failures are recorded, never retried here.
    async fn evaluate_one(&self, registered: &RegisteredScaler) -> Option<bool> {
        let name = registered.name.as_str();
        let metric_name = registered.metric_name();
        let start = Instant::now();

        let outcome = registered.scaler.evaluate(metric_name).await;
        let elapsed = start.elapsed();
        self.metrics.observe_evaluation_latency(elapsed.as_secs_f64());

        match outcome {
            Ok(evaluation) => {
                let report = ActivityReport::from_evaluation(name, metric_name, &evaluation);
                let aggregate = evaluation.aggregate.as_ref().map(ToString::to_string);

                self.metrics
                    .record_evaluation(name, report.active, report.contributing_pods);
                self.logger.log_evaluation(
                    name,
                    aggregate.as_deref(),
                    report.contributing_pods,
                    report.active,
                    elapsed.as_millis(),
                );
                // Skipped evaluations touch no collaborator
                if evaluation.aggregate.is_some() {
                    self.health.record_success(components::CLUSTER_API).await;
                    self.health.record_success(components::METRICS_API).await;
                }
                self.health.record_success(components::EVALUATOR).await;

                let active = report.active;
                self.registry.record(report);
                Some(active)
            }
            Err(error) => {
                self.metrics.record_error(name, &error);
                self.logger.log_evaluation_failed(name, &error);
                if let Some(component) = failing_component(&error) {
                    self.health.record_failure(component, error.to_string()).await;
                }

                self.registry
                    .record(ActivityReport::from_error(name, metric_name, &error));
                None
            }
        }
    }
}

/// Generate a pseudo-random jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

/// Builder for creating the evaluation loop
pub struct EvaluationLoopBuilder {
    registry: Option<Arc<ActivityRegistry>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: EvaluationConfig,
}

impl EvaluationLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            registry: None,
            health: None,
            logger: None,
            config: EvaluationConfig::default(),
        }
    }

    /// Set the scaler registry
    pub fn registry(mut self, registry: Arc<ActivityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the health registry updated after each evaluation
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the evaluation interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the jitter duration
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Build the evaluation loop
    pub fn build(self) -> Result<EvaluationLoop> {
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Registry is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Evaluation interval must be positive");
        }

        Ok(EvaluationLoop::new(
            registry,
            self.health.unwrap_or_default(),
            self.logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
            self.config,
        ))
    }
}

impl Default for EvaluationLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
