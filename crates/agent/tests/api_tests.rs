//! Integration tests for the scaler API endpoints

#[path = "../src/api.rs"]
#[allow(dead_code)]
mod api;

use anyhow::{anyhow, Result};
use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use scaler_lib::{
    cluster::{async_trait, ClusterStore, PodMetricsSource},
    health::{components, HealthRegistry},
    models::{ContainerMetrics, PodMetrics, ScaleTargetRef, ScaledObjectRef},
    observability::{ScalerMetrics, StructuredLogger},
    poller::{ActivityRegistry, EvaluationLoopBuilder},
    scaler::{ResourceName, ResourceScaler, ScalerConfig, WorkloadSelector},
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), "web".to_string())])
}

/// Cluster with one Deployment `web` and one running pod requesting 400m
struct StaticCluster;

#[async_trait]
impl ClusterStore for StaticCluster {
    async fn get_scaled_object(&self, namespace: &str, name: &str) -> Result<ScaledObjectRef> {
        Ok(ScaledObjectRef {
            name: name.to_string(),
            namespace: namespace.to_string(),
            scale_target_ref: Some(ScaleTargetRef {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: "web".to_string(),
            }),
        })
    }

    async fn get_deployment(&self, _namespace: &str, _name: &str) -> Result<Deployment> {
        Ok(Deployment {
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(labels()),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn get_stateful_set(&self, _namespace: &str, name: &str) -> Result<StatefulSet> {
        Err(anyhow!("statefulsets {:?} not found", name))
    }

    async fn list_pods(&self, namespace: &str, _selector: &WorkloadSelector) -> Result<Vec<Pod>> {
        Ok(vec![Pod {
            metadata: ObjectMeta {
                name: Some("web-1".to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    resources: Some(ResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "cpu".to_string(),
                            Quantity("400m".to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        }])
    }
}

/// Usage snapshot with web-1 at 300m
struct StaticMetrics;

#[async_trait]
impl PodMetricsSource for StaticMetrics {
    async fn list_pod_metrics(
        &self,
        namespace: &str,
        _selector: &WorkloadSelector,
    ) -> Result<Vec<PodMetrics>> {
        Ok(vec![PodMetrics {
            metadata: ObjectMeta {
                name: Some("web-1".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            containers: vec![ContainerMetrics {
                name: "app".to_string(),
                usage: BTreeMap::from([("cpu".to_string(), Quantity("300m".to_string()))]),
            }],
            ..Default::default()
        }])
    }
}

async fn web_scaler() -> ResourceScaler {
    let config = ScalerConfig {
        trigger_metadata: [
            ("value".to_string(), "50".to_string()),
            ("activationValue".to_string(), "40".to_string()),
        ]
        .into_iter()
        .collect(),
        metric_type: Some(scaler_lib::scaler::MetricTargetType::Utilization),
        scalable_object_type: "ScaledObject".to_string(),
        scalable_object_name: "web-scaler".to_string(),
        scalable_object_namespace: "shop".to_string(),
    };

    ResourceScaler::new(
        ResourceName::Cpu,
        &config,
        Arc::new(StaticCluster),
        Arc::new(StaticMetrics),
    )
    .await
    .unwrap()
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLUSTER_API).await;
    health_registry.register(components::METRICS_API).await;

    let activity = Arc::new(ActivityRegistry::new());
    activity.register("web-cpu", Arc::new(web_scaler().await));

    let metrics = ScalerMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics, activity));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn run_one_cycle(state: &AppState) {
    EvaluationLoopBuilder::new()
        .registry(state.activity.clone())
        .health(state.health_registry.clone())
        .logger(StructuredLogger::new("test-node"))
        .build()
        .unwrap()
        .evaluate_all()
        .await;
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_failure(components::METRICS_API, "metrics server unavailable")
        .await;

    // Degraded still returns 200 (operational)
    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["metrics_api"]["consecutive_failures"], 1);
}

#[tokio::test]
async fn test_healthz_returns_503_after_repeated_failures() {
    let (app, state) = setup_test_app().await;

    for _ in 0..3 {
        state
            .health_registry
            .record_failure(components::CLUSTER_API, "connection refused")
            .await;
    }

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_activity_after_evaluation() {
    let (app, state) = setup_test_app().await;
    run_one_cycle(&state).await;

    let (status, reports) = get_json(app.clone(), "/activity").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports.as_array().unwrap().len(), 1);

    let (status, report) = get_json(app, "/activity/web-cpu").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["scaler"], "web-cpu");
    assert_eq!(report["metricName"], "cpu");
    assert_eq!(report["active"], true);
    assert_eq!(report["contributingPods"], 1);
    assert_eq!(report["aggregate"]["type"], "Utilization");
    assert_eq!(report["aggregate"]["percent"], 75);
}

#[tokio::test]
async fn test_activity_is_empty_before_first_cycle() {
    let (app, _state) = setup_test_app().await;

    let (status, reports) = get_json(app, "/activity").await;
    assert_eq!(status, StatusCode::OK);
    assert!(reports.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_scaler_activity_returns_404() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get_json(app, "/activity/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_metric_specs_endpoint() {
    let (app, _state) = setup_test_app().await;

    let (status, specs) = get_json(app, "/metric-specs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(specs[0]["scaler"], "web-cpu");
    assert_eq!(specs[0]["spec"]["type"], "Resource");
    assert_eq!(specs[0]["spec"]["resource"]["name"], "cpu");
    assert_eq!(specs[0]["spec"]["resource"]["target"]["type"], "Utilization");
    assert_eq!(specs[0]["spec"]["resource"]["target"]["averageUtilization"], 50);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;
    run_one_cycle(&state).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("resource_scaler_evaluation_latency_seconds_bucket"));
    assert!(metrics_text.contains("resource_scaler_evaluations_total"));
    assert!(metrics_text.contains("resource_scaler_active"));
    assert!(metrics_text.contains("resource_scaler_scalers_registered"));
}
