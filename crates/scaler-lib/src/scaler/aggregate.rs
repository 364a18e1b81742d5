//! Reduction of joined pod/metrics records into one scaling signal
//!
//! Two reductions are supported:
//! - average value: mean absolute usage per contributing pod, computed at
//!   nano-unit resolution
//! - average utilization: mean of per-pod `usage * 100 / request`
//!   percentages (not the ratio of summed usage to summed requests)
//!
//! When a container name is configured only that container is read,
//! otherwise all containers of a pod are summed.

use super::matcher::{container_metrics, pod_name, MetricsIndex};
use crate::error::{Collaborator, Result, ScalerError};
use crate::models::{ContainerMetrics, PodMetrics};
use crate::quantity::Quantity;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Resource a scaler reads from the usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    Cpu,
    Memory,
}

impl ResourceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::Cpu => "cpu",
            ResourceName::Memory => "memory",
        }
    }

    /// Integer unit used for utilization: milli-cores or bytes
    fn utilization_units(&self, quantity: &Quantity) -> i64 {
        match self {
            ResourceName::Cpu => quantity.milli_value(),
            ResourceName::Memory => quantity.value(),
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceName {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(ResourceName::Cpu),
            "memory" => Ok(ResourceName::Memory),
            other => Err(ScalerError::UnsupportedMetric(other.to_string())),
        }
    }
}

/// Outcome of one aggregation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AggregateResult {
    #[serde(rename_all = "camelCase")]
    AverageValue { value: Quantity, pod_count: usize },
    #[serde(rename_all = "camelCase")]
    Utilization { percent: i32, pod_count: usize },
}

impl AggregateResult {
    /// Number of pods that contributed to the aggregate
    pub fn pod_count(&self) -> usize {
        match self {
            AggregateResult::AverageValue { pod_count, .. }
            | AggregateResult::Utilization { pod_count, .. } => *pod_count,
        }
    }
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateResult::AverageValue { value, .. } => write!(f, "{}", value),
            AggregateResult::Utilization { percent, .. } => write!(f, "{}%", percent),
        }
    }
}

fn decode(raw: &K8sQuantity, collaborator: Collaborator) -> Result<Quantity> {
    Quantity::try_from(raw).map_err(|e| ScalerError::Listing {
        context: "failed to decode resource quantity",
        collaborator,
        source: e.into(),
    })
}

/// Usage of one container, zero when the resource is not reported
fn container_usage(container: &ContainerMetrics, resource: ResourceName) -> Result<Quantity> {
    container
        .usage
        .get(resource.as_str())
        .map(|raw| decode(raw, Collaborator::Metrics))
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Usage of the configured container, or the pod total
///
/// `None` when the configured container has no metrics.
fn pod_usage(
    metrics: &PodMetrics,
    container_name: Option<&str>,
    resource: ResourceName,
) -> Result<Option<Quantity>> {
    match container_name {
        Some(name) => match container_metrics(metrics, name) {
            Some(container) => container_usage(container, resource).map(Some),
            None => Ok(None),
        },
        None => {
            let mut total = Quantity::ZERO;
            for container in &metrics.containers {
                total = total.saturating_add(&container_usage(container, resource)?);
            }
            Ok(Some(total))
        }
    }
}

/// Sum of a usage in utilization units across all containers of a pod
fn pod_usage_units(metrics: &PodMetrics, resource: ResourceName) -> Result<i64> {
    let mut total: i64 = 0;
    for container in &metrics.containers {
        let usage = container_usage(container, resource)?;
        total = total.saturating_add(resource.utilization_units(&usage));
    }
    Ok(total)
}

/// Request of one container in utilization units, zero when unset
fn container_request(container: &Container, resource: ResourceName) -> Result<i64> {
    let request = container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .and_then(|requests| requests.get(resource.as_str()));

    match request {
        Some(raw) => Ok(resource.utilization_units(&decode(raw, Collaborator::Cluster)?)),
        None => Ok(0),
    }
}

fn spec_containers(pod: &Pod) -> &[Container] {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default()
}

/// Requested capacity of the configured container, or the pod total
fn pod_capacity(pod: &Pod, container_name: Option<&str>, resource: ResourceName) -> Result<i64> {
    let mut total: i64 = 0;
    for container in spec_containers(pod) {
        match container_name {
            Some(name) if container.name == name => {
                return container_request(container, resource);
            }
            Some(_) => {}
            None => total = total.saturating_add(container_request(container, resource)?),
        }
    }
    Ok(total)
}

/// Average absolute usage across running pods with metrics
pub fn average_value(
    pods: &[Pod],
    snapshot: &[PodMetrics],
    container_name: Option<&str>,
    resource: ResourceName,
) -> Result<AggregateResult> {
    let index = MetricsIndex::new(snapshot);
    let mut total = Quantity::ZERO;
    let mut pod_count: usize = 0;

    for (pod, metrics) in index.join(pods) {
        let Some(usage) = pod_usage(metrics, container_name, resource)? else {
            debug!(pod = %pod_name(pod), container = ?container_name, "Skipping pod without container metrics");
            continue;
        };

        total = total.saturating_add(&usage);
        pod_count += 1;
    }

    if pod_count == 0 {
        return Err(ScalerError::NoActivePods { qualifier: "" });
    }

    let average_nanos = total.nano_value() / pod_count as i128;
    Ok(AggregateResult::AverageValue {
        value: Quantity::from_nano_value(average_nanos),
        pod_count,
    })
}

/// Average of per-pod utilization percentages across running pods with
/// metrics and a non-zero request
pub fn average_utilization(
    pods: &[Pod],
    snapshot: &[PodMetrics],
    container_name: Option<&str>,
    resource: ResourceName,
) -> Result<AggregateResult> {
    let index = MetricsIndex::new(snapshot);
    let mut total_utilization: i128 = 0;
    let mut pod_count: usize = 0;

    for (pod, metrics) in index.join(pods) {
        let usage = match container_name {
            Some(name) => match container_metrics(metrics, name) {
                Some(container) => {
                    resource.utilization_units(&container_usage(container, resource)?)
                }
                None => {
                    debug!(pod = %pod_name(pod), container = %name, "Skipping pod without container metrics");
                    continue;
                }
            },
            None => pod_usage_units(metrics, resource)?,
        };

        let capacity = pod_capacity(pod, container_name, resource)?;
        if capacity == 0 {
            debug!(pod = %pod_name(pod), resource = %resource, "Skipping pod without resource request");
            continue;
        }

        total_utilization += i128::from(usage) * 100 / i128::from(capacity);
        pod_count += 1;
    }

    if pod_count == 0 {
        return Err(ScalerError::NoActivePods {
            qualifier: " with non-zero capacity",
        });
    }

    let average = total_utilization / pod_count as i128;
    let percent = i32::try_from(average).unwrap_or(if average > 0 { i32::MAX } else { i32::MIN });
    Ok(AggregateResult::Utilization { percent, pod_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::tests::fixtures::{
        pod, pod_metrics, pod_with_phase, pod_with_resources,
    };

    fn value_of(result: AggregateResult) -> Quantity {
        match result {
            AggregateResult::AverageValue { value, .. } => value,
            other => panic!("expected average value, got {:?}", other),
        }
    }

    fn percent_of(result: AggregateResult) -> i32 {
        match result {
            AggregateResult::Utilization { percent, .. } => percent,
            other => panic!("expected utilization, got {:?}", other),
        }
    }

    #[test]
    fn test_resource_name_parsing() {
        assert_eq!("cpu".parse::<ResourceName>().unwrap(), ResourceName::Cpu);
        assert_eq!("memory".parse::<ResourceName>().unwrap(), ResourceName::Memory);
        assert!(matches!(
            "CPU".parse::<ResourceName>(),
            Err(ScalerError::UnsupportedMetric(_))
        ));
    }

    #[test]
    fn test_average_value_is_exact() {
        let pods = vec![pod("web-1", &[("app", "")]), pod("web-2", &[("app", "")])];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "200m")]),
            pod_metrics("web-2", &[("app", "cpu", "600m")]),
        ];

        let result = average_value(&pods, &snapshot, None, ResourceName::Cpu).unwrap();
        assert_eq!(result.pod_count(), 2);
        let value = value_of(result);
        assert_eq!(value, Quantity::parse("400m").unwrap());
        assert_eq!(value.to_string(), "400m");
    }

    #[test]
    fn test_average_value_truncates_below_nano() {
        let pods = vec![
            pod("web-1", &[("app", "")]),
            pod("web-2", &[("app", "")]),
            pod("web-3", &[("app", "")]),
        ];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "1n")]),
            pod_metrics("web-2", &[("app", "cpu", "1n")]),
            pod_metrics("web-3", &[("app", "cpu", "0")]),
        ];

        let value = value_of(average_value(&pods, &snapshot, None, ResourceName::Cpu).unwrap());
        assert!(value.is_zero());
    }

    #[test]
    fn test_average_value_sums_containers_per_pod() {
        let pods = vec![pod("web-1", &[("app", ""), ("proxy", "")])];
        let snapshot = vec![pod_metrics(
            "web-1",
            &[("app", "memory", "64Mi"), ("proxy", "memory", "16Mi")],
        )];

        let value = value_of(average_value(&pods, &snapshot, None, ResourceName::Memory).unwrap());
        assert_eq!(value.value(), 80 * 1024 * 1024);
    }

    #[test]
    fn test_average_value_container_scoped() {
        let pods = vec![
            pod("web-1", &[("app", ""), ("proxy", "")]),
            pod("web-2", &[("app", "")]),
        ];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "300m"), ("proxy", "cpu", "900m")]),
            pod_metrics("web-2", &[("app", "cpu", "100m")]),
        ];

        let result = average_value(&pods, &snapshot, Some("proxy"), ResourceName::Cpu).unwrap();
        assert_eq!(result.pod_count(), 1);
        assert_eq!(value_of(result).milli_value(), 900);
    }

    #[test]
    fn test_average_value_missing_resource_counts_as_zero() {
        let pods = vec![pod("web-1", &[("app", "")]), pod("web-2", &[("app", "")])];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "400m")]),
            pod_metrics("web-2", &[("app", "memory", "1Mi")]),
        ];

        let value = value_of(average_value(&pods, &snapshot, None, ResourceName::Cpu).unwrap());
        assert_eq!(value.milli_value(), 200);
    }

    #[test]
    fn test_average_value_no_active_pods() {
        let pods = vec![
            pod_with_phase("web-1", "Pending", &[("app", "")]),
            pod("web-2", &[("app", "")]),
        ];
        let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", "400m")])];

        let err = average_value(&pods, &snapshot, None, ResourceName::Cpu).unwrap_err();
        assert!(matches!(err, ScalerError::NoActivePods { .. }));

        let err = average_value(&[], &[], None, ResourceName::Cpu).unwrap_err();
        assert!(matches!(err, ScalerError::NoActivePods { .. }));
    }

    #[test]
    fn test_utilization_single_pod() {
        let pods = vec![pod("web-1", &[("app", "400m")])];
        let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", "500m")])];

        let result = average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap();
        assert_eq!(result.pod_count(), 1);
        assert_eq!(percent_of(result), 125);
    }

    #[test]
    fn test_utilization_truncates_per_pod() {
        let pods = vec![pod("web-1", &[("app", "300m")])];
        let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", "100m")])];

        let percent = percent_of(
            average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap(),
        );
        assert_eq!(percent, 33);
    }

    #[test]
    fn test_utilization_averages_per_pod_percentages() {
        // 100m/100m = 100%, 100m/1000m = 10%: average 55%, while the
        // ratio of sums would be 200m/1100m = 18%
        let pods = vec![pod("web-1", &[("app", "100m")]), pod("web-2", &[("app", "1")])];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "100m")]),
            pod_metrics("web-2", &[("app", "cpu", "100m")]),
        ];

        let percent = percent_of(
            average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap(),
        );
        assert_eq!(percent, 55);
    }

    #[test]
    fn test_utilization_skips_zero_capacity_pods() {
        let pods = vec![pod("web-1", &[("app", "200m")]), pod("web-2", &[("app", "")])];
        let snapshot = vec![
            pod_metrics("web-1", &[("app", "cpu", "100m")]),
            pod_metrics("web-2", &[("app", "cpu", "900m")]),
        ];

        let result = average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap();
        assert_eq!(result.pod_count(), 1);
        assert_eq!(percent_of(result), 50);
    }

    #[test]
    fn test_utilization_all_zero_capacity() {
        let pods = vec![pod("web-1", &[("app", "")])];
        let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", "100m")])];

        let err = average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap_err();
        assert_eq!(err.to_string(), "no running pods found with non-zero capacity");
    }

    #[test]
    fn test_utilization_pod_sums_requests() {
        let pods = vec![pod("web-1", &[("app", "300m"), ("proxy", "100m")])];
        let snapshot = vec![pod_metrics(
            "web-1",
            &[("app", "cpu", "150m"), ("proxy", "cpu", "50m")],
        )];

        let percent = percent_of(
            average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap(),
        );
        assert_eq!(percent, 50);
    }

    #[test]
    fn test_utilization_container_scoped_uses_container_request() {
        let pods = vec![pod("web-1", &[("app", "1"), ("proxy", "100m")])];
        let snapshot = vec![pod_metrics(
            "web-1",
            &[("app", "cpu", "100m"), ("proxy", "cpu", "80m")],
        )];

        let percent = percent_of(
            average_utilization(&pods, &snapshot, Some("proxy"), ResourceName::Cpu).unwrap(),
        );
        assert_eq!(percent, 80);
    }

    #[test]
    fn test_utilization_container_missing_metrics_is_skipped() {
        let pods = vec![pod("web-1", &[("app", "100m"), ("proxy", "100m")])];
        let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", "100m")])];

        let err =
            average_utilization(&pods, &snapshot, Some("proxy"), ResourceName::Cpu).unwrap_err();
        assert!(matches!(err, ScalerError::NoActivePods { .. }));
    }

    #[test]
    fn test_utilization_memory_uses_bytes_on_both_sides() {
        let requests: &[(&str, &str)] = &[("memory", "256Mi"), ("cpu", "1")];
        let pods = vec![pod_with_resources("db-0", &[("db", requests)])];
        let snapshot = vec![pod_metrics("db-0", &[("db", "memory", "192Mi")])];

        let percent = percent_of(
            average_utilization(&pods, &snapshot, None, ResourceName::Memory).unwrap(),
        );
        assert_eq!(percent, 75);
    }

    #[test]
    fn test_aggregate_serialization() {
        let utilization = serde_json::to_value(AggregateResult::Utilization {
            percent: 75,
            pod_count: 2,
        })
        .unwrap();
        assert_eq!(
            utilization,
            serde_json::json!({"type": "Utilization", "percent": 75, "podCount": 2})
        );

        let average = serde_json::to_value(AggregateResult::AverageValue {
            value: Quantity::parse("400m").unwrap(),
            pod_count: 1,
        })
        .unwrap();
        assert_eq!(
            average,
            serde_json::json!({"type": "AverageValue", "value": "400m", "podCount": 1})
        );
    }

    #[test]
    fn test_malformed_usage_is_a_metrics_listing_error() {
        let pods = vec![pod("web-1", &[("app", "100m")])];
        for usage in ["lots", "1e2147483647"] {
            let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", usage)])];

            let err = average_value(&pods, &snapshot, None, ResourceName::Cpu).unwrap_err();
            assert!(
                matches!(
                    err,
                    ScalerError::Listing {
                        collaborator: Collaborator::Metrics,
                        ..
                    }
                ),
                "{usage}"
            );
        }
    }

    #[test]
    fn test_malformed_request_is_a_cluster_listing_error() {
        let pods = vec![pod("web-1", &[("app", "1.5e2147483647")])];
        let snapshot = vec![pod_metrics("web-1", &[("app", "cpu", "100m")])];

        let err = average_utilization(&pods, &snapshot, None, ResourceName::Cpu).unwrap_err();
        assert!(matches!(
            err,
            ScalerError::Listing {
                collaborator: Collaborator::Cluster,
                ..
            }
        ));
    }
}
