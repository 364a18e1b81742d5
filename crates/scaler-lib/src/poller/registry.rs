//! Registered scalers and their latest activity reports

use crate::error::ScalerError;
use crate::scaler::{AggregateResult, Evaluation, ResourceScaler};
use dashmap::DashMap;
use k8s_openapi::api::autoscaling::v2::MetricSpec;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A scaler together with the name it is registered under
#[derive(Clone)]
pub struct RegisteredScaler {
    pub name: String,
    pub scaler: Arc<ResourceScaler>,
}

impl RegisteredScaler {
    /// Metric name the scaler is evaluated for
    pub fn metric_name(&self) -> &'static str {
        self.scaler.resource().as_str()
    }
}

/// Outcome of the most recent evaluation of one scaler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    pub scaler: String,
    pub metric_name: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateResult>,
    pub contributing_pods: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub timestamp: i64,
}

impl ActivityReport {
    pub fn from_evaluation(scaler: &str, metric_name: &str, evaluation: &Evaluation) -> Self {
        Self {
            scaler: scaler.to_string(),
            metric_name: metric_name.to_string(),
            active: evaluation.active,
            contributing_pods: evaluation
                .aggregate
                .as_ref()
                .map(AggregateResult::pod_count)
                .unwrap_or(0),
            aggregate: evaluation.aggregate.clone(),
            error_kind: None,
            last_error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Failed evaluations report the workload inactive
    pub fn from_error(scaler: &str, metric_name: &str, error: &ScalerError) -> Self {
        Self {
            scaler: scaler.to_string(),
            metric_name: metric_name.to_string(),
            active: false,
            aggregate: None,
            contributing_pods: 0,
            error_kind: Some(error.kind()),
            last_error: Some(error.to_string()),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// HPA metric spec of one registered scaler
#[derive(Debug, Clone, Serialize)]
pub struct NamedMetricSpec {
    pub scaler: String,
    pub spec: MetricSpec,
}

/// Registry of scalers and their latest reports
#[derive(Default)]
pub struct ActivityRegistry {
    scalers: DashMap<String, RegisteredScaler>,
    reports: DashMap<String, ActivityReport>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scaler, replacing any scaler of the same name
    pub fn register(&self, name: impl Into<String>, scaler: Arc<ResourceScaler>) {
        let name = name.into();
        debug!(scaler = %name, "Registering scaler");
        self.reports.remove(&name);
        self.scalers
            .insert(name.clone(), RegisteredScaler { name, scaler });
    }

    /// Unregister a scaler and drop its report
    pub fn unregister(&self, name: &str) -> Option<RegisteredScaler> {
        self.reports.remove(name);
        self.scalers.remove(name).map(|(_, v)| v)
    }

    /// Registered scalers, sorted by name
    pub fn scalers(&self) -> Vec<RegisteredScaler> {
        let mut scalers: Vec<_> = self.scalers.iter().map(|r| r.value().clone()).collect();
        scalers.sort_by(|a, b| a.name.cmp(&b.name));
        scalers
    }

    pub fn len(&self) -> usize {
        self.scalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalers.is_empty()
    }

    /// Store a report; reports for unknown scalers are dropped
    pub fn record(&self, report: ActivityReport) {
        if self.scalers.contains_key(&report.scaler) {
            self.reports.insert(report.scaler.clone(), report);
        }
    }

    /// Latest report of a scaler
    pub fn report(&self, name: &str) -> Option<ActivityReport> {
        self.reports.get(name).map(|r| r.clone())
    }

    /// Latest reports of all scalers, sorted by scaler name
    pub fn reports(&self) -> Vec<ActivityReport> {
        let mut reports: Vec<_> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by(|a, b| a.scaler.cmp(&b.scaler));
        reports
    }

    /// HPA metric specs of all registered scalers
    pub fn metric_specs(&self) -> Vec<NamedMetricSpec> {
        self.scalers()
            .into_iter()
            .map(|registered| NamedMetricSpec {
                spec: registered.scaler.metric_spec(),
                scaler: registered.name,
            })
            .collect()
    }
}
