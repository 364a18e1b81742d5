//! `kube`-backed implementations of the cluster collaborators

use super::{async_trait, ClusterStore, PodMetricsSource};
use crate::models::{ContainerMetrics, PodMetrics, ScaleTargetRef, ScaledObjectRef};
use crate::scaler::WorkloadSelector;
use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::Client;
use tracing::debug;

const KEDA_GROUP: &str = "keda.sh";
const KEDA_VERSION: &str = "v1alpha1";
const SCALED_OBJECT_KIND: &str = "ScaledObject";

const METRICS_GROUP: &str = "metrics.k8s.io";
const METRICS_VERSION: &str = "v1beta1";
const POD_METRICS_KIND: &str = "PodMetrics";
const POD_METRICS_PLURAL: &str = "pods";

fn scaled_object_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        KEDA_GROUP,
        KEDA_VERSION,
        SCALED_OBJECT_KIND,
    ))
}

fn pod_metrics_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(METRICS_GROUP, METRICS_VERSION, POD_METRICS_KIND),
        POD_METRICS_PLURAL,
    )
}

fn list_params(selector: &WorkloadSelector) -> ListParams {
    let labels = selector.to_string();
    if labels.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(&labels)
    }
}

/// Reads ScaledObjects, workloads and pods from the API server
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Pull `spec.scaleTargetRef` out of a dynamic ScaledObject
fn scale_target_from(object: &DynamicObject) -> Result<Option<ScaleTargetRef>> {
    match object.data.get("spec").and_then(|spec| spec.get("scaleTargetRef")) {
        Some(value) if !value.is_null() => {
            let target = serde_json::from_value(value.clone())
                .context("Malformed scaleTargetRef")?;
            Ok(Some(target))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get_scaled_object(&self, namespace: &str, name: &str) -> Result<ScaledObjectRef> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &scaled_object_resource());
        let object = api
            .get(name)
            .await
            .with_context(|| format!("Failed to get scaledobject {}/{}", namespace, name))?;

        Ok(ScaledObjectRef {
            name: name.to_string(),
            namespace: namespace.to_string(),
            scale_target_ref: scale_target_from(&object)?,
        })
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .with_context(|| format!("Failed to get deployment {}/{}", namespace, name))
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .with_context(|| format!("Failed to get statefulset {}/{}", namespace, name))
    }

    async fn list_pods(&self, namespace: &str, selector: &WorkloadSelector) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&list_params(selector))
            .await
            .with_context(|| format!("Failed to list pods in {}", namespace))?;

        debug!(namespace = %namespace, selector = %selector, count = pods.items.len(), "Listed pods");
        Ok(pods.items)
    }
}

/// Reads the pod usage snapshot from the resource metrics API
#[derive(Clone)]
pub struct MetricsApiSource {
    client: Client,
}

impl MetricsApiSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn pod_metrics_from(object: DynamicObject) -> Result<PodMetrics> {
    let containers: Vec<ContainerMetrics> = match object.data.get("containers") {
        Some(value) => serde_json::from_value(value.clone()).context("Malformed pod metrics")?,
        None => Vec::new(),
    };
    let field = |key: &str| {
        object
            .data
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    Ok(PodMetrics {
        timestamp: field("timestamp"),
        window: field("window"),
        metadata: object.metadata,
        containers,
    })
}

#[async_trait]
impl PodMetricsSource for MetricsApiSource {
    async fn list_pod_metrics(
        &self,
        namespace: &str,
        selector: &WorkloadSelector,
    ) -> Result<Vec<PodMetrics>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &pod_metrics_resource());
        let list = api
            .list(&list_params(selector))
            .await
            .with_context(|| format!("Failed to list pod metrics in {}", namespace))?;

        debug!(namespace = %namespace, selector = %selector, count = list.items.len(), "Listed pod metrics");
        list.items.into_iter().map(pod_metrics_from).collect()
    }
}
