use thiserror::Error;

/// Main error type for the Stepwise system
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Configuration space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-space errors
#[derive(Error, Debug)]
pub enum SpaceError {
    #[error("Unknown dimension: {name}")]
    UnknownDimension { name: String },

    #[error("Value {value} is not a choice of dimension {dimension}")]
    InvalidDimensionValue { dimension: String, value: String },

    #[error("Dimension {name} has no choices")]
    EmptyDimension { name: String },

    #[error("No value assigned for dimension {dimension}")]
    IncompleteAssignment { dimension: String },
}

/// Pipeline construction and execution errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline has no topological order: dependency cycle detected")]
    CyclicPipeline,

    #[error("Step {by} references unknown step {referenced}")]
    UnknownStep { referenced: String, by: String },

    #[error("Unknown primitive: {name}")]
    UnknownPrimitive { name: String },

    #[error("Missing external input {slot}, required by step {step}")]
    MissingInput { step: String, slot: String },

    #[error("Missing argument {argument} for step {step}")]
    MissingArgument { step: String, argument: String },

    #[error("Step {step} produced no output named {output}")]
    MissingOutput { step: String, output: String },

    #[error("Step {step} failed: {message}")]
    StepExecution { step: String, message: String },

    #[error("Pipeline has not been fitted")]
    NotFitted,
}

/// Cache consistency errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cached value for fingerprint {fingerprint} disagrees with a recomputation: {details}")]
    Inconsistency { fingerprint: String, details: String },
}

/// Metric computation errors
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("Unknown metric: {name}")]
    UnknownMetric { name: String },

    #[error("Metric input shape mismatch: y_true has {y_true} values, y_pred has {y_pred}")]
    ShapeMismatch { y_true: usize, y_pred: usize },

    #[error("Metric inputs are empty")]
    EmptyInput,

    #[error("Metric {metric} computation failed: {message}")]
    Computation { metric: String, message: String },
}

/// Search driver errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("No viable initial candidate after {attempts} attempts")]
    NoViableInitialCandidate { attempts: usize },

    #[error("No candidate ever evaluated successfully")]
    NoViableCandidate,

    #[error("Invalid search configuration: {message}")]
    InvalidConfig { message: String },
}

/// Result type alias for Stepwise operations
pub type SwResult<T> = Result<T, SwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PipelineError::StepExecution {
            step: "impute".to_string(),
            message: "column count mismatch".to_string(),
        };
        assert!(error.to_string().contains("impute"));
        assert!(error.to_string().contains("column count mismatch"));
    }

    #[test]
    fn test_error_conversion() {
        let space_error = SpaceError::UnknownDimension {
            name: "model".to_string(),
        };
        let sw_error: SwError = space_error.into();

        match sw_error {
            SwError::Space(_) => (),
            _ => panic!("Expected Space error"),
        }
    }

    #[test]
    fn test_cache_inconsistency_message() {
        let error = CacheError::Inconsistency {
            fingerprint: "a1b2c3d4e5f6".to_string(),
            details: "0.91 != 0.87".to_string(),
        };
        assert!(error.to_string().contains("a1b2c3d4e5f6"));
        assert!(error.to_string().contains("0.91 != 0.87"));
    }
}
