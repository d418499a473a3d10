//! # sw-runtime
//!
//! The Stepwise DAG executor.
//!
//! [`Runtime`] takes a fully specified pipeline, computes a topological
//! execution order, and runs a two-phase fit/produce protocol per step,
//! consulting a shared [`StepCache`] so that any (primitive, configuration,
//! input data) triple is trained at most once per cache lifetime. Step
//! implementations are resolved through a [`StepRegistry`] and seen only via
//! the [`StepPrimitive`] capability trait.

pub mod cache;
pub mod cross_validation;
pub mod fingerprint;
pub mod primitive;
pub mod runtime;

pub use cache::{CacheStats, CachedStep, StepCache};
pub use cross_validation::cross_validate;
pub use fingerprint::step_fingerprint;
pub use primitive::{
    param_bool, param_f64, param_usize, require_column, require_table, PrimitiveInfo,
    StepPrimitive, StepRegistry,
};
pub use runtime::Runtime;
