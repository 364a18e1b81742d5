//! Trigger metadata normalization
//!
//! Turns the raw key/value trigger metadata into an immutable
//! [`ScalerMetadata`]. The metric target type has two sources: the
//! structured `metricType` field and the deprecated free-text `type`
//! metadata key. Both collapse into a single [`MetricTarget`] here, so
//! nothing downstream knows about the legacy key.

use super::workload::{resolve_scale_target, WorkloadRef};
use crate::cluster::ClusterStore;
use crate::error::{Result, ScalerError};
use crate::quantity::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Metadata key of the deprecated metric type field
pub const TYPE_KEY: &str = "type";
/// Metadata key of the target value
pub const VALUE_KEY: &str = "value";
/// Metadata key of the activation threshold
pub const ACTIVATION_VALUE_KEY: &str = "activationValue";
/// Metadata key restricting the metric to one container
pub const CONTAINER_NAME_KEY: &str = "containerName";

const DEFAULT_ACTIVATION_VALUE: &str = "0";

/// HPA metric target type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricTargetType {
    Utilization,
    AverageValue,
    Value,
}

impl MetricTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricTargetType::Utilization => "Utilization",
            MetricTargetType::AverageValue => "AverageValue",
            MetricTargetType::Value => "Value",
        }
    }
}

impl fmt::Display for MetricTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricTargetType {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Utilization" => Ok(MetricTargetType::Utilization),
            "AverageValue" => Ok(MetricTargetType::AverageValue),
            "Value" => Ok(MetricTargetType::Value),
            other => Err(unknown_metric_type(other)),
        }
    }
}

fn unknown_metric_type(value: &str) -> ScalerError {
    ScalerError::config(format!(
        "unknown metric type: {}, allowed values are 'Utilization' or 'AverageValue'",
        value
    ))
}

/// Kind of object owning the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalableObjectType {
    ScaledObject,
    ScaledJob,
}

impl FromStr for ScalableObjectType {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ScaledObject" => Ok(ScalableObjectType::ScaledObject),
            "ScaledJob" => Ok(ScalableObjectType::ScaledJob),
            other => Err(ScalerError::config(format!(
                "unknown scalable object type: {}",
                other
            ))),
        }
    }
}

/// Raw trigger configuration handed over by the orchestration layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalerConfig {
    /// Free-form trigger metadata (`value`, `activationValue`, ...)
    #[serde(default)]
    pub trigger_metadata: HashMap<String, String>,
    /// Structured metric target type
    #[serde(default)]
    pub metric_type: Option<MetricTargetType>,
    pub scalable_object_type: String,
    pub scalable_object_name: String,
    pub scalable_object_namespace: String,
}

/// Target and activation threshold, one variant per metric target type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum MetricTarget {
    #[serde(rename_all = "camelCase")]
    AverageValue {
        average_value: Quantity,
        activation_average_value: Quantity,
    },
    #[serde(rename_all = "camelCase")]
    Utilization {
        average_utilization: i32,
        activation_average_utilization: i32,
    },
}

impl MetricTarget {
    pub fn metric_type(&self) -> MetricTargetType {
        match self {
            MetricTarget::AverageValue { .. } => MetricTargetType::AverageValue,
            MetricTarget::Utilization { .. } => MetricTargetType::Utilization,
        }
    }
}

/// Normalized, immutable scaler configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalerMetadata {
    pub target: MetricTarget,
    pub container_name: Option<String>,
    pub scalable_object_type: ScalableObjectType,
    pub namespace: String,
    /// Resolved scale target, only set for ScaledObjects
    pub workload: Option<WorkloadRef>,
}

impl ScalerMetadata {
    pub fn metric_type(&self) -> MetricTargetType {
        self.target.metric_type()
    }
}

fn non_empty<'a>(metadata: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Pick the metric target type from exactly one of its two sources
fn resolve_metric_type(config: &ScalerConfig) -> Result<MetricTargetType> {
    // Legacy `type` key, scheduled for removal
    let legacy = non_empty(&config.trigger_metadata, TYPE_KEY);

    match (legacy, config.metric_type) {
        (Some(_), Some(_)) => Err(ScalerError::config(
            "'type' and 'metricType' are mutually exclusive, use only 'metricType'",
        )),
        (Some(legacy), None) => {
            warn!("The 'type' setting is DEPRECATED and will be removed - use 'metricType' instead");
            match legacy {
                "AverageValue" => Ok(MetricTargetType::AverageValue),
                "Utilization" => Ok(MetricTargetType::Utilization),
                other => Err(unknown_metric_type(other)),
            }
        }
        (None, Some(metric_type)) => Ok(metric_type),
        (None, None) => Err(ScalerError::config("metricType is required")),
    }
}

fn parse_quantity(field: &str, raw: &str) -> Result<Quantity> {
    Quantity::parse(raw)
        .map_err(|e| ScalerError::config(format!("invalid {} {:?}: {}", field, raw, e)))
}

fn parse_utilization(field: &str, raw: &str) -> Result<i32> {
    raw.parse::<i32>()
        .map_err(|e| ScalerError::config(format!("invalid {} {:?}: {}", field, raw, e)))
}

/// Normalize raw trigger configuration
///
/// For ScaledObjects the scale target is resolved through `store`;
/// resolver errors are returned unchanged.
pub async fn parse_metadata(
    config: &ScalerConfig,
    store: &dyn ClusterStore,
) -> Result<ScalerMetadata> {
    let metadata = &config.trigger_metadata;

    let value = non_empty(metadata, VALUE_KEY)
        .ok_or_else(|| ScalerError::config("no value given, 'value' is required"))?;
    let activation_value =
        non_empty(metadata, ACTIVATION_VALUE_KEY).unwrap_or(DEFAULT_ACTIVATION_VALUE);

    let target = match resolve_metric_type(config)? {
        MetricTargetType::AverageValue => MetricTarget::AverageValue {
            average_value: parse_quantity(VALUE_KEY, value)?,
            activation_average_value: parse_quantity(ACTIVATION_VALUE_KEY, activation_value)?,
        },
        MetricTargetType::Utilization => MetricTarget::Utilization {
            average_utilization: parse_utilization(VALUE_KEY, value)?,
            activation_average_utilization: parse_utilization(
                ACTIVATION_VALUE_KEY,
                activation_value,
            )?,
        },
        other => return Err(unknown_metric_type(other.as_str())),
    };

    let scalable_object_type: ScalableObjectType = config.scalable_object_type.parse()?;

    let workload = match scalable_object_type {
        ScalableObjectType::ScaledObject => Some(
            resolve_scale_target(
                store,
                &config.scalable_object_namespace,
                &config.scalable_object_name,
            )
            .await?,
        ),
        ScalableObjectType::ScaledJob => None,
    };

    Ok(ScalerMetadata {
        target,
        container_name: non_empty(metadata, CONTAINER_NAME_KEY).map(str::to_string),
        scalable_object_type,
        namespace: config.scalable_object_namespace.clone(),
        workload,
    })
}
