//! # sw-search
//!
//! The Stepwise optimization driver: coordinate descent over a pipeline
//! configuration space.
//!
//! [`DimensionalSearch`] holds all dimensions fixed except one, samples
//! alternative step choices for that dimension, evaluates each resulting
//! candidate on a [`WorkerPool`] (full fit on training data, produce and
//! score on held-out data), and adopts the best strictly-improving result
//! before moving to the next dimension. Two shared caches make overlapping
//! trials cheap: the step cache inside the executor and the candidate cache
//! over whole configurations, bundled in [`SearchCaches`].

mod candidates;
mod evaluate;
mod pool;
mod search;

pub use candidates::{CandidateCache, CandidateRecord, SearchCaches};
pub use evaluate::{Evaluation, PipelineEvaluator};
pub use pool::WorkerPool;
pub use search::{DimensionalSearch, SearchConfig, SearchReport};
