//! Agent configuration

use anyhow::{Context, Result};
use scaler_lib::scaler::{
    MetricTargetType, ScalerConfig, ACTIVATION_VALUE_KEY, CONTAINER_NAME_KEY, TYPE_KEY, VALUE_KEY,
};
use serde::Deserialize;
use std::collections::HashMap;

const CONFIG_PATH_ENV: &str = "SCALER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "/etc/resource-scaler/config.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/activity
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Evaluation interval in seconds
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,

    /// Maximum jitter added to each interval, in milliseconds
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Consecutive failures before a component is reported unhealthy
    #[serde(default = "default_unhealthy_after")]
    pub unhealthy_after_failures: u32,

    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

/// One cpu/memory trigger
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    /// `cpu` or `memory`
    pub resource: String,
    #[serde(default)]
    pub metric_type: Option<MetricTargetType>,
    /// Raw trigger metadata (`value`, `activationValue`, `containerName`, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default = "default_scalable_object_type")]
    pub scalable_object_type: String,
    pub scalable_object_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl TriggerConfig {
    pub fn to_scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            trigger_metadata: self
                .metadata
                .iter()
                .map(|(key, value)| (canonical_key(key), value.clone()))
                .collect(),
            metric_type: self.metric_type,
            scalable_object_type: self.scalable_object_type.clone(),
            scalable_object_name: self.scalable_object_name.clone(),
            scalable_object_namespace: self.namespace.clone(),
        }
    }
}

/// Restore the camelCase spelling of known metadata keys, sources may
/// fold key case
fn canonical_key(key: &str) -> String {
    [TYPE_KEY, VALUE_KEY, ACTIVATION_VALUE_KEY, CONTAINER_NAME_KEY]
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(key))
        .unwrap_or(key)
        .to_string()
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_evaluation_interval() -> u64 {
    15
}

fn default_jitter_ms() -> u64 {
    1000
}

fn default_unhealthy_after() -> u32 {
    3
}

fn default_scalable_object_type() -> String {
    "ScaledObject".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

impl AgentConfig {
    /// Load configuration from the config file and environment
    ///
    /// The file named by `SCALER_CONFIG` is optional; `SCALER_`-prefixed
    /// variables override it, with `__` separating nested keys.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("SCALER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path))?;

        config
            .try_deserialize()
            .context("failed to parse agent configuration")
    }
}
