//! CLI commands
//!
//! Both commands build a scaler from trigger flags exactly like the agent
//! does from its configuration file.

pub mod evaluate;
pub mod spec;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use scaler_lib::scaler::{
    MetricTargetType, ResourceName, ResourceScaler, ScalerConfig, ACTIVATION_VALUE_KEY,
    CONTAINER_NAME_KEY, TYPE_KEY, VALUE_KEY,
};
use std::collections::HashMap;

use crate::client::ClusterClients;

/// Metric target type accepted by `--metric-type`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MetricTypeArg {
    #[value(name = "Utilization")]
    Utilization,
    #[value(name = "AverageValue")]
    AverageValue,
}

impl From<MetricTypeArg> for MetricTargetType {
    fn from(arg: MetricTypeArg) -> Self {
        match arg {
            MetricTypeArg::Utilization => MetricTargetType::Utilization,
            MetricTypeArg::AverageValue => MetricTargetType::AverageValue,
        }
    }
}

/// Trigger definition shared by `evaluate` and `spec`
#[derive(Debug, Clone, Args)]
pub struct TriggerArgs {
    /// Resource to scale on (cpu or memory)
    #[arg(long)]
    pub resource: String,

    /// Target value: a percentage for Utilization, a quantity for AverageValue
    #[arg(long)]
    pub value: String,

    /// Metric target type
    #[arg(long, value_enum)]
    pub metric_type: Option<MetricTypeArg>,

    /// Deprecated free-text metric target type, use --metric-type
    #[arg(long = "type")]
    pub legacy_type: Option<String>,

    /// Activation threshold (defaults to 0)
    #[arg(long)]
    pub activation_value: Option<String>,

    /// Only read this container of each pod
    #[arg(long)]
    pub container: Option<String>,

    /// Name of the ScaledObject (or ScaledJob) owning the trigger
    #[arg(long)]
    pub scaled_object: String,

    /// Namespace of the scaled object
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// The trigger belongs to a ScaledJob
    #[arg(long)]
    pub scaled_job: bool,
}

impl TriggerArgs {
    /// Raw trigger configuration for `namespace`
    pub fn to_scaler_config(&self, namespace: String) -> ScalerConfig {
        let mut metadata = HashMap::new();
        metadata.insert(VALUE_KEY.to_string(), self.value.clone());

        let optional = [
            (TYPE_KEY, &self.legacy_type),
            (ACTIVATION_VALUE_KEY, &self.activation_value),
            (CONTAINER_NAME_KEY, &self.container),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        let scalable_object_type = if self.scaled_job {
            "ScaledJob"
        } else {
            "ScaledObject"
        };

        ScalerConfig {
            trigger_metadata: metadata,
            metric_type: self.metric_type.map(Into::into),
            scalable_object_type: scalable_object_type.to_string(),
            scalable_object_name: self.scaled_object.clone(),
            scalable_object_namespace: namespace,
        }
    }

    pub fn resource_name(&self) -> Result<ResourceName> {
        self.resource
            .parse()
            .with_context(|| format!("Invalid --resource {:?}", self.resource))
    }

    /// Normalize the trigger against the cluster
    pub async fn build_scaler(
        &self,
        clients: &ClusterClients,
        namespace: String,
    ) -> Result<ResourceScaler> {
        let resource = self.resource_name()?;
        let config = self.to_scaler_config(namespace);

        ResourceScaler::new(
            resource,
            &config,
            clients.store.clone(),
            clients.metrics.clone(),
        )
        .await
        .context("Failed to build scaler from trigger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TriggerArgs {
        TriggerArgs {
            resource: "cpu".to_string(),
            value: "50".to_string(),
            metric_type: Some(MetricTypeArg::Utilization),
            legacy_type: None,
            activation_value: None,
            container: None,
            scaled_object: "web-scaler".to_string(),
            namespace: None,
            scaled_job: false,
        }
    }

    #[test]
    fn test_minimal_trigger_config() {
        let config = args().to_scaler_config("shop".to_string());

        assert_eq!(config.trigger_metadata.len(), 1);
        assert_eq!(config.trigger_metadata[VALUE_KEY], "50");
        assert_eq!(config.metric_type, Some(MetricTargetType::Utilization));
        assert_eq!(config.scalable_object_type, "ScaledObject");
        assert_eq!(config.scalable_object_name, "web-scaler");
        assert_eq!(config.scalable_object_namespace, "shop");
    }

    #[test]
    fn test_optional_flags_become_metadata() {
        let mut args = args();
        args.metric_type = None;
        args.legacy_type = Some("AverageValue".to_string());
        args.activation_value = Some("100m".to_string());
        args.container = Some("app".to_string());
        args.scaled_job = true;

        let config = args.to_scaler_config("default".to_string());
        assert_eq!(config.trigger_metadata[TYPE_KEY], "AverageValue");
        assert_eq!(config.trigger_metadata[ACTIVATION_VALUE_KEY], "100m");
        assert_eq!(config.trigger_metadata[CONTAINER_NAME_KEY], "app");
        assert_eq!(config.metric_type, None);
        assert_eq!(config.scalable_object_type, "ScaledJob");
    }

    #[test]
    fn test_resource_name_validation() {
        let mut args = args();
        assert_eq!(args.resource_name().unwrap(), ResourceName::Cpu);

        args.resource = "gpu".to_string();
        assert!(args.resource_name().is_err());
    }
}
