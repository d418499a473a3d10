//! # sw-primitives
//!
//! Built-in step primitives: a small concrete catalog of transforms and
//! models implementing the executor's [`StepPrimitive`] capability trait.
//! The full primitive ontology is an external collaborator; these built-ins
//! make the search exercisable end to end.
//!
//! [`StepPrimitive`]: sw_runtime::StepPrimitive

mod models;
mod transforms;

pub use models::{KnnRegressor, MeanRegressor, RidgeRegressor};
pub use transforms::{MeanImputer, StandardScaler, VarianceThreshold};

use serde_json::json;
use sw_runtime::{PrimitiveInfo, StepRegistry};

/// Registry holding every built-in primitive, with catalog tags and
/// default hyperparameters.
pub fn builtin_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register(
        PrimitiveInfo::new("impute.mean").tag("transform").tag("imputation"),
        || Box::new(MeanImputer::new()),
    );
    registry.register(
        PrimitiveInfo::new("scale.standard").tag("transform").tag("scaling"),
        || Box::new(StandardScaler::new()),
    );
    registry.register(
        PrimitiveInfo::new("select.variance_threshold")
            .tag("transform")
            .tag("feature_selection")
            .default_param("threshold", json!(0.0)),
        || Box::new(VarianceThreshold::new()),
    );
    registry.register(
        PrimitiveInfo::new("model.mean_regressor").tag("model").tag("regression"),
        || Box::new(MeanRegressor::new()),
    );
    registry.register(
        PrimitiveInfo::new("model.knn_regressor")
            .tag("model")
            .tag("regression")
            .default_param("k", json!(5)),
        || Box::new(KnnRegressor::new()),
    );
    registry.register(
        PrimitiveInfo::new("model.ridge_regressor")
            .tag("model")
            .tag("regression")
            .default_param("alpha", json!(1.0)),
        || Box::new(RidgeRegressor::new()),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_every_builtin() {
        let registry = builtin_registry();
        for name in [
            "impute.mean",
            "scale.standard",
            "select.variance_threshold",
            "model.mean_regressor",
            "model.knn_regressor",
            "model.ridge_regressor",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn model_defaults_are_registered() {
        let registry = builtin_registry();
        let info = registry.info("model.knn_regressor").unwrap();
        assert_eq!(info.defaults["k"], json!(5));
        assert!(info.tags.contains(&"model".to_string()));
    }
}
