//! Pod discovery and the pod/metrics join
//!
//! Pods are selected through the pod-template match labels of the scale
//! target. The usage snapshot is listed with the same selector and joined
//! to the pods by exact name. Pods without a snapshot entry are skipped,
//! they usually just have not been scraped yet.

use super::workload::WorkloadRef;
use crate::cluster::{ClusterStore, PodMetricsSource};
use crate::error::{Collaborator, Result, ScalerError};
use crate::models::{ContainerMetrics, PodMetrics};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

const POD_PHASE_RUNNING: &str = "Running";

/// Equality-based label selector derived from a workload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadSelector {
    labels: BTreeMap<String, String>,
}

impl WorkloadSelector {
    pub fn from_labels(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// Take the `matchLabels` of a Kubernetes label selector
    pub fn from_label_selector(selector: &LabelSelector) -> Self {
        Self::from_labels(selector.match_labels.clone().unwrap_or_default())
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Whether an object carrying `labels` is selected
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for WorkloadSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Build the pod selector of a Deployment or StatefulSet
pub async fn workload_selector(
    store: &dyn ClusterStore,
    namespace: &str,
    workload: &WorkloadRef,
) -> Result<WorkloadSelector> {
    let not_found = |kind: &'static str| {
        move |source| ScalerError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: workload.name.clone(),
            source,
        }
    };
    let no_spec = |kind: &str| {
        ScalerError::config(format!("{} {} has no spec", kind, workload.name))
    };

    let selector = match workload.kind.as_str() {
        "Deployment" => {
            let deployment = store
                .get_deployment(namespace, &workload.name)
                .await
                .map_err(not_found("deployment"))?;
            let spec = deployment.spec.ok_or_else(|| no_spec("deployment"))?;
            WorkloadSelector::from_label_selector(&spec.selector)
        }
        "StatefulSet" => {
            let stateful_set = store
                .get_stateful_set(namespace, &workload.name)
                .await
                .map_err(not_found("statefulset"))?;
            let spec = stateful_set.spec.ok_or_else(|| no_spec("statefulset"))?;
            WorkloadSelector::from_label_selector(&spec.selector)
        }
        other => return Err(ScalerError::UnsupportedWorkload(other.to_string())),
    };

    Ok(selector)
}

/// List the pods of a workload, returning the selector used
pub async fn list_pods(
    store: &dyn ClusterStore,
    namespace: &str,
    workload: &WorkloadRef,
) -> Result<(Vec<Pod>, WorkloadSelector)> {
    let selector = workload_selector(store, namespace, workload).await?;

    let pods = store
        .list_pods(namespace, &selector)
        .await
        .map_err(|source| ScalerError::Listing {
            context: "failed to list pods",
            collaborator: Collaborator::Cluster,
            source,
        })?;

    debug!(
        namespace = %namespace,
        workload = %workload.name,
        selector = %selector,
        pods = pods.len(),
        "Listed workload pods"
    );
    Ok((pods, selector))
}

/// List the usage snapshot for the pods matching `selector`
pub async fn list_metrics(
    source: &dyn PodMetricsSource,
    namespace: &str,
    selector: &WorkloadSelector,
) -> Result<Vec<PodMetrics>> {
    source
        .list_pod_metrics(namespace, selector)
        .await
        .map_err(|source| ScalerError::Listing {
            context: "failed to list pod metrics",
            collaborator: Collaborator::Metrics,
            source,
        })
}

/// Pod name of a Kubernetes pod, empty when unset
pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

/// Whether the pod phase is exactly `Running`
pub fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(POD_PHASE_RUNNING)
}

/// Name-indexed view over a metrics snapshot, built once per evaluation
pub struct MetricsIndex<'a> {
    by_name: HashMap<&'a str, &'a PodMetrics>,
}

impl<'a> MetricsIndex<'a> {
    pub fn new(snapshot: &'a [PodMetrics]) -> Self {
        let mut by_name = HashMap::with_capacity(snapshot.len());
        for metrics in snapshot {
            // First entry wins on duplicate names
            by_name.entry(metrics.name()).or_insert(metrics);
        }
        Self { by_name }
    }

    pub fn get(&self, pod_name: &str) -> Option<&'a PodMetrics> {
        self.by_name.get(pod_name).copied()
    }

    /// Running pods paired with their metrics, in pod list order
    pub fn join<'p>(
        &'p self,
        pods: &'p [Pod],
    ) -> impl Iterator<Item = (&'p Pod, &'a PodMetrics)> + 'p {
        pods.iter().filter(|pod| is_running(pod)).filter_map(|pod| {
            let metrics = self.get(pod_name(pod));
            if metrics.is_none() {
                debug!(pod = %pod_name(pod), "Skipping pod without metrics");
            }
            metrics.map(|m| (pod, m))
        })
    }
}

/// Metrics of a named container within a pod's metrics
pub fn container_metrics<'a>(
    pod_metrics: &'a PodMetrics,
    container_name: &str,
) -> Option<&'a ContainerMetrics> {
    pod_metrics
        .containers
        .iter()
        .find(|container| container.name == container_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::tests::fixtures::{pod, pod_metrics, pod_with_phase};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_display_is_sorted() {
        let selector = WorkloadSelector::from_labels(labels(&[("tier", "web"), ("app", "shop")]));
        assert_eq!(selector.to_string(), "app=shop,tier=web");
        assert_eq!(WorkloadSelector::default().to_string(), "");
    }

    #[test]
    fn test_selector_matches_subset() {
        let selector = WorkloadSelector::from_labels(labels(&[("app", "shop")]));
        assert!(selector.matches(&labels(&[("app", "shop"), ("pod-template-hash", "abc")])));
        assert!(!selector.matches(&labels(&[("app", "cart")])));
        assert!(!selector.matches(&BTreeMap::new()));
        assert!(WorkloadSelector::default().matches(&BTreeMap::new()));
    }

    #[test]
    fn test_selector_from_label_selector_without_match_labels() {
        let selector = WorkloadSelector::from_label_selector(&LabelSelector::default());
        assert!(selector.is_empty());
    }

    #[test]
    fn test_join_skips_pods_without_metrics_and_non_running() {
        let pods = vec![
            pod("web-1", &[("app", "100m")]),
            pod("web-2", &[("app", "100m")]),
            pod_with_phase("web-3", "Pending", &[("app", "100m")]),
        ];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "50m")]),
            pod_metrics("web-3", &[("app", "cpu", "50m")]),
        ];

        let index = MetricsIndex::new(&snapshot);
        let joined: Vec<&str> = index.join(&pods).map(|(p, _)| pod_name(p)).collect();
        assert_eq!(joined, vec!["web-1"]);
    }

    #[test]
    fn test_index_keeps_first_duplicate() {
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "50m")]),
            pod_metrics("web-1", &[("app", "cpu", "900m")]),
        ];
        let index = MetricsIndex::new(&snapshot);
        let metrics = index.get("web-1").unwrap();
        assert_eq!(metrics.containers[0].usage["cpu"].0, "50m");
    }

    #[test]
    fn test_container_metrics_lookup() {
        let metrics = pod_metrics("web-1", &[("app", "cpu", "50m"), ("proxy", "cpu", "5m")]);
        assert_eq!(container_metrics(&metrics, "proxy").unwrap().name, "proxy");
        assert!(container_metrics(&metrics, "missing").is_none());
    }
}
