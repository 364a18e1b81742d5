//! Scale target resolution for ScaledObjects

use crate::cluster::ClusterStore;
use crate::error::{Result, ScalerError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Workload a ScaledObject scales, kind kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub kind: String,
    pub name: String,
}

/// Look up the ScaledObject and return its scale target
pub async fn resolve_scale_target(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
) -> Result<WorkloadRef> {
    let scaled_object =
        store
            .get_scaled_object(namespace, name)
            .await
            .map_err(|source| ScalerError::NotFound {
                kind: "scaledobject",
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?;

    let target = scaled_object.scale_target_ref.ok_or_else(|| {
        ScalerError::config(format!("scaled object {} has no scale target ref", name))
    })?;

    debug!(
        namespace = %namespace,
        scaled_object = %name,
        kind = %target.kind,
        workload = %target.name,
        "Resolved scale target"
    );

    Ok(WorkloadRef {
        kind: target.kind,
        name: target.name,
    })
}
