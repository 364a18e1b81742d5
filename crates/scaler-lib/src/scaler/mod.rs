//! Resource-based scaler
//!
//! A [`ResourceScaler`] decides whether a workload is "active" from the
//! averaged CPU or memory consumption of its pods. One evaluation runs
//! sequentially: resolve the workload selector, list pods, list the
//! usage snapshot, aggregate, compare against the activation threshold.
//! Nothing is cached between evaluations.

mod aggregate;
mod matcher;
mod metadata;
mod workload;


pub use aggregate::{average_utilization, average_value, AggregateResult, ResourceName};
pub use matcher::{
    container_metrics, is_running, list_metrics, list_pods, pod_name, workload_selector,
    MetricsIndex, WorkloadSelector,
};
pub use metadata::{
    parse_metadata, MetricTarget, MetricTargetType, ScalableObjectType, ScalerConfig,
    ScalerMetadata, ACTIVATION_VALUE_KEY, CONTAINER_NAME_KEY, TYPE_KEY, VALUE_KEY,
};
pub use workload::{resolve_scale_target, WorkloadRef};

use crate::cluster::{ClusterStore, PodMetricsSource};
use crate::error::{Result, ScalerError};
use crate::models::ExternalMetricValue;
use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::{
    ContainerResourceMetricSource, MetricSpec, MetricTarget as HpaMetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const RESOURCE_METRIC_SOURCE_TYPE: &str = "Resource";
const CONTAINER_RESOURCE_METRIC_SOURCE_TYPE: &str = "ContainerResource";

/// Interface the orchestration layer drives scalers through
#[async_trait]
pub trait Scaler: Send + Sync {
    /// Metric specs to register with the horizontal pod autoscaler
    async fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec>;

    /// Metric values and activity for one polling cycle
    async fn get_metrics_and_activity(
        &self,
        metric_name: &str,
    ) -> Result<(Vec<ExternalMetricValue>, bool)>;

    /// Release held resources
    async fn close(&self) -> Result<()>;
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// `None` when the evaluation was skipped
    pub aggregate: Option<AggregateResult>,
    pub active: bool,
}

impl Evaluation {
    /// Evaluation that did no work and reports inactivity
    pub fn skipped() -> Self {
        Self {
            aggregate: None,
            active: false,
        }
    }
}

/// Scaler driven by pod CPU or memory consumption
pub struct ResourceScaler {
    metadata: ScalerMetadata,
    resource: ResourceName,
    store: Arc<dyn ClusterStore>,
    metrics_source: Arc<dyn PodMetricsSource>,
}

impl ResourceScaler {
    /// Normalize `config` and build a scaler for `resource`
    pub async fn new(
        resource: ResourceName,
        config: &ScalerConfig,
        store: Arc<dyn ClusterStore>,
        metrics_source: Arc<dyn PodMetricsSource>,
    ) -> Result<Self> {
        let metadata = parse_metadata(config, store.as_ref()).await?;

        Ok(Self {
            metadata,
            resource,
            store,
            metrics_source,
        })
    }

    pub fn metadata(&self) -> &ScalerMetadata {
        &self.metadata
    }

    pub fn resource(&self) -> ResourceName {
        self.resource
    }

    /// HPA metric spec, container scoped when a container name is set
    pub fn metric_spec(&self) -> MetricSpec {
        let target = match &self.metadata.target {
            MetricTarget::AverageValue { average_value, .. } => HpaMetricTarget {
                type_: MetricTargetType::AverageValue.to_string(),
                average_value: Some(K8sQuantity::from(average_value)),
                ..Default::default()
            },
            MetricTarget::Utilization {
                average_utilization,
                ..
            } => HpaMetricTarget {
                type_: MetricTargetType::Utilization.to_string(),
                average_utilization: Some(*average_utilization),
                ..Default::default()
            },
        };
        let name = self.resource.as_str().to_string();

        match &self.metadata.container_name {
            Some(container) => MetricSpec {
                type_: CONTAINER_RESOURCE_METRIC_SOURCE_TYPE.to_string(),
                container_resource: Some(ContainerResourceMetricSource {
                    container: container.clone(),
                    name,
                    target,
                }),
                ..Default::default()
            },
            None => MetricSpec {
                type_: RESOURCE_METRIC_SOURCE_TYPE.to_string(),
                resource: Some(ResourceMetricSource { name, target }),
                ..Default::default()
            },
        }
    }

    /// Aggregate current pod usage for `metric_name` and compare it to the
    /// activation threshold
    pub async fn evaluate(&self, metric_name: &str) -> Result<Evaluation> {
        if self.metadata.scalable_object_type == ScalableObjectType::ScaledJob {
            return Ok(Evaluation::skipped());
        }

        let resource: ResourceName = metric_name.parse()?;
        let namespace = &self.metadata.namespace;
        let workload = self
            .metadata
            .workload
            .as_ref()
            .ok_or_else(|| ScalerError::UnsupportedWorkload(String::new()))?;

        let (pods, selector) = list_pods(self.store.as_ref(), namespace, workload).await?;
        let snapshot = list_metrics(self.metrics_source.as_ref(), namespace, &selector).await?;
        let container = self.metadata.container_name.as_deref();

        let (aggregate, active) = match &self.metadata.target {
            MetricTarget::AverageValue {
                activation_average_value,
                ..
            } => {
                let aggregate = average_value(&pods, &snapshot, container, resource)?;
                let active = matches!(
                    &aggregate,
                    AggregateResult::AverageValue { value, .. } if value > activation_average_value
                );
                (aggregate, active)
            }
            MetricTarget::Utilization {
                activation_average_utilization,
                ..
            } => {
                let aggregate = average_utilization(&pods, &snapshot, container, resource)?;
                let active = matches!(
                    &aggregate,
                    AggregateResult::Utilization { percent, .. } if percent > activation_average_utilization
                );
                (aggregate, active)
            }
        };

        debug!(
            namespace = %namespace,
            workload = %workload.name,
            metric = %resource,
            aggregate = %aggregate,
            pods = aggregate.pod_count(),
            active = active,
            "Evaluated resource activity"
        );

        Ok(Evaluation {
            aggregate: Some(aggregate),
            active,
        })
    }
}

#[async_trait]
impl Scaler for ResourceScaler {
    async fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec> {
        vec![self.metric_spec()]
    }

    /// Only reports activity; metric values are served elsewhere
    async fn get_metrics_and_activity(
        &self,
        metric_name: &str,
    ) -> Result<(Vec<ExternalMetricValue>, bool)> {
        let evaluation = self.evaluate(metric_name).await?;
        Ok((Vec::new(), evaluation.active))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
