//! Scaler library for CPU and memory based workload activation
//!
//! This crate provides the core functionality for:
//! - Trigger metadata normalization and scale target resolution
//! - Pod discovery and pod/metrics matching
//! - Average value and utilization aggregation
//! - Periodic evaluation with activity reporting
//! - Health checks and observability

pub mod cluster;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod poller;
pub mod quantity;
pub mod scaler;

pub use error::{Collaborator, Result, ScalerError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use quantity::Quantity;
pub use scaler::{Evaluation, ResourceName, ResourceScaler, Scaler, ScalerConfig};
