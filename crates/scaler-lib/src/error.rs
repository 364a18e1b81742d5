//! Error taxonomy for scaler construction and evaluation

use thiserror::Error;

/// Result type alias for scaler operations
pub type Result<T> = std::result::Result<T, ScalerError>;

/// Collaborator whose data a listing failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    /// Pods and workloads from the cluster API
    Cluster,
    /// Usage snapshots from the metrics API
    Metrics,
}

/// Errors surfaced by metadata normalization and evaluation.
///
/// Collaborator failures keep their original cause as `source()`.
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Malformed, contradictory or missing trigger configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A referenced scalable object or workload could not be fetched
    #[error("{kind} {namespace}/{name} not found: {source}")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Scale target kind other than Deployment or StatefulSet
    #[error("unsupported workload kind: {0}, allowed values are 'Deployment' or 'StatefulSet'")]
    UnsupportedWorkload(String),

    /// Pod or metrics listing failed
    #[error("{context}: {source}")]
    Listing {
        context: &'static str,
        collaborator: Collaborator,
        #[source]
        source: anyhow::Error,
    },

    /// Metric name outside of `cpu`/`memory`
    #[error("unsupported metric name: {0}")]
    UnsupportedMetric(String),

    /// No pod qualified for aggregation
    #[error("no running pods found{qualifier}")]
    NoActivePods { qualifier: &'static str },
}

impl ScalerError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        ScalerError::Config(message.into())
    }

    /// Whether the caller may reasonably retry on its next poll
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScalerError::Listing { .. } | ScalerError::NoActivePods { .. }
        )
    }

    /// Stable short label for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScalerError::Config(_) => "config",
            ScalerError::NotFound { .. } => "not_found",
            ScalerError::UnsupportedWorkload(_) => "unsupported_workload",
            ScalerError::Listing { .. } => "listing",
            ScalerError::UnsupportedMetric(_) => "unsupported_metric",
            ScalerError::NoActivePods { .. } => "no_active_pods",
        }
    }
}
