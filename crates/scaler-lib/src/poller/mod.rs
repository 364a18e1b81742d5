//! Periodic evaluation of registered scalers
//!
//! The agent registers one [`ResourceScaler`](crate::scaler::ResourceScaler)
//! per configured trigger in an [`ActivityRegistry`]. The
//! [`EvaluationLoop`] evaluates them on a fixed cadence and keeps the
//! latest [`ActivityReport`] of each for the HTTP API.

mod r#loop;
mod registry;

pub use r#loop::{CycleResults, EvaluationConfig, EvaluationLoop, EvaluationLoopBuilder};
pub use registry::{ActivityRegistry, ActivityReport, NamedMetricSpec, RegisteredScaler};
