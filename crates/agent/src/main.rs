//! Resource Scaler - CPU/memory activation for ScaledObject triggers
//!
//! This binary evaluates the configured cpu and memory triggers against
//! the cluster on a fixed cadence and serves their activity, the HPA
//! metric specs, health and Prometheus metrics over HTTP.

use anyhow::{Context, Result};
use kube::Client;
use scaler_lib::{
    cluster::{ClusterStore, KubeClusterStore, MetricsApiSource, PodMetricsSource},
    health::{components, HealthRegistry},
    observability::{ScalerMetrics, StructuredLogger},
    poller::{ActivityRegistry, EvaluationLoopBuilder},
    scaler::{ResourceName, ResourceScaler},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build and register one scaler per trigger; broken triggers are skipped
async fn register_scalers(
    triggers: &[config::TriggerConfig],
    store: Arc<dyn ClusterStore>,
    metrics_source: Arc<dyn PodMetricsSource>,
    activity: &ActivityRegistry,
    health: &HealthRegistry,
    logger: &StructuredLogger,
) {
    for trigger in triggers {
        let built = match trigger.resource.parse::<ResourceName>() {
            Ok(resource) => {
                ResourceScaler::new(
                    resource,
                    &trigger.to_scaler_config(),
                    store.clone(),
                    metrics_source.clone(),
                )
                .await
            }
            Err(e) => Err(e),
        };

        match built {
            Ok(scaler) => {
                let metadata = scaler.metadata();
                logger.log_scaler_registered(
                    &trigger.name,
                    scaler.resource().as_str(),
                    metadata.metric_type().as_str(),
                    &metadata.namespace,
                    metadata.workload.as_ref().map(|w| w.name.as_str()),
                );
                activity.register(trigger.name.clone(), Arc::new(scaler));
            }
            Err(e) => {
                warn!(
                    trigger = %trigger.name,
                    kind = %e.kind(),
                    error = %e,
                    "Skipping trigger that failed to initialize"
                );
                health
                    .record_failure(components::EVALUATOR, format!("{}: {}", trigger.name, e))
                    .await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting resource-scaler");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        triggers = config.triggers.len(),
        "Scaler configured"
    );

    let health_registry = HealthRegistry::with_threshold(config.unhealthy_after_failures);
    health_registry.register(components::CLUSTER_API).await;
    health_registry.register(components::METRICS_API).await;
    health_registry.register(components::EVALUATOR).await;

    let metrics = ScalerMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, config.triggers.len());

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let store: Arc<dyn ClusterStore> = Arc::new(KubeClusterStore::new(client.clone()));
    let metrics_source: Arc<dyn PodMetricsSource> = Arc::new(MetricsApiSource::new(client));

    let activity = Arc::new(ActivityRegistry::new());
    register_scalers(
        &config.triggers,
        store,
        metrics_source,
        &activity,
        &health_registry,
        &logger,
    )
    .await;
    metrics.set_scalers_registered(activity.len() as i64);

    let evaluation_loop = EvaluationLoopBuilder::new()
        .registry(activity.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(Duration::from_secs(config.evaluation_interval_secs))
        .jitter(Duration::from_millis(config.jitter_ms))
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(evaluation_loop.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        activity,
    ));

    // Mark as ready after initialization
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    health_registry.set_ready(false).await;
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Evaluation loop terminated abnormally");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
