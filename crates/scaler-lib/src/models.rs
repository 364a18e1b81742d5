//! Core data models shared by the scaler and its collaborators

use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource usage of one pod, as served by `metrics.k8s.io/v1beta1`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodMetrics {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

impl PodMetrics {
    /// Pod name, empty when the metadata carries none
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Resource usage of one container within a pod
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, K8sQuantity>,
}

/// Target workload referenced by a ScaledObject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: String,
    pub name: String,
}

/// The part of a `keda.sh/v1alpha1` ScaledObject the resolver reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaledObjectRef {
    pub name: String,
    pub namespace: String,
    pub scale_target_ref: Option<ScaleTargetRef>,
}

/// A single external metric sample
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricValue {
    pub metric_name: String,
    pub value: K8sQuantity,
    pub timestamp: i64,
}
