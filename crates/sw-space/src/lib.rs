//! # sw-space
//!
//! Configuration space definitions for the Stepwise pipeline search.
//!
//! A space is an ordered set of *dimensions* (pipeline positions), each
//! holding a weighted list of candidate step choices. The search samples
//! alternatives per dimension; the [`PipelineTemplate`] turns a complete
//! [`ConfigurationPoint`] into an executable pipeline description.

mod point;
mod space;
mod template;

pub use point::ConfigurationPoint;
pub use space::{weighted_sample_without_replacement, ConfigurationSpace, Dimension, StepChoice};
pub use template::{PipelineTemplate, TemplateNode};
