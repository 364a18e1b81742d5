//! Cluster and metrics lookups consumed by the scaler
//!
//! The scaler never talks to the API server directly. It goes through
//! [`ClusterStore`] for objects and [`PodMetricsSource`] for the usage
//! snapshot, so evaluations can run against the real cluster
//! ([`KubeClusterStore`], [`MetricsApiSource`]) or against fixtures.

mod kubernetes;

pub use kubernetes::{KubeClusterStore, MetricsApiSource};

use crate::models::{PodMetrics, ScaledObjectRef};
use crate::scaler::WorkloadSelector;
use anyhow::Result;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;

pub use async_trait::async_trait;

/// Read access to cluster objects
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a ScaledObject by namespace and name
    async fn get_scaled_object(&self, namespace: &str, name: &str) -> Result<ScaledObjectRef>;

    /// Fetch a Deployment by namespace and name
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// Fetch a StatefulSet by namespace and name
    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet>;

    /// List pods in a namespace matching a label selector
    async fn list_pods(&self, namespace: &str, selector: &WorkloadSelector) -> Result<Vec<Pod>>;
}

/// Point-in-time pod usage snapshot provider
#[async_trait]
pub trait PodMetricsSource: Send + Sync {
    /// List usage for pods in a namespace matching a label selector
    async fn list_pod_metrics(
        &self,
        namespace: &str,
        selector: &WorkloadSelector,
    ) -> Result<Vec<PodMetrics>>;
}
