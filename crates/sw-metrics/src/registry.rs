//! The injected `name → callable` metric mapping.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use sw_types::{MetricDescriptor, MetricError, ObjectiveDirection};

use crate::functions;

/// A metric callable: `(y_true, y_pred, params) -> score`.
pub type MetricFn =
    Arc<dyn Fn(&[f64], &[f64], &BTreeMap<String, JsonValue>) -> Result<f64, MetricError> + Send + Sync>;

/// Resolves metric descriptors to callables and classifies each metric's
/// optimization direction. Shared read-only across the search and all
/// workers.
pub struct MetricRegistry {
    functions: HashMap<String, MetricFn>,
    minimized: HashSet<String>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
            minimized: HashSet::new(),
        }
    }

    /// Registry preloaded with the built-in regression and classification
    /// metrics.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "mean_squared_error",
            ObjectiveDirection::Minimize,
            Arc::new(|t, p, _| functions::mean_squared_error(t, p)),
        );
        registry.register(
            "root_mean_squared_error",
            ObjectiveDirection::Minimize,
            Arc::new(|t, p, _| functions::root_mean_squared_error(t, p)),
        );
        registry.register(
            "mean_absolute_error",
            ObjectiveDirection::Minimize,
            Arc::new(|t, p, _| functions::mean_absolute_error(t, p)),
        );
        registry.register(
            "r_squared",
            ObjectiveDirection::Maximize,
            Arc::new(|t, p, _| functions::r_squared(t, p)),
        );
        registry.register(
            "accuracy",
            ObjectiveDirection::Maximize,
            Arc::new(|t, p, _| functions::accuracy(t, p)),
        );
        registry.register(
            "f1_macro",
            ObjectiveDirection::Maximize,
            Arc::new(|t, p, _| functions::f1_macro(t, p)),
        );
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        direction: ObjectiveDirection,
        function: MetricFn,
    ) {
        let name = name.into();
        if direction == ObjectiveDirection::Minimize {
            self.minimized.insert(name.clone());
        }
        self.functions.insert(name, function);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Minimize for error-style metrics, maximize otherwise.
    pub fn direction(&self, name: &str) -> Result<ObjectiveDirection, MetricError> {
        if !self.functions.contains_key(name) {
            return Err(MetricError::UnknownMetric {
                name: name.to_string(),
            });
        }
        Ok(if self.minimized.contains(name) {
            ObjectiveDirection::Minimize
        } else {
            ObjectiveDirection::Maximize
        })
    }

    /// Resolve and invoke the metric named by the descriptor.
    pub fn compute(
        &self,
        descriptor: &MetricDescriptor,
        y_true: &[f64],
        y_pred: &[f64],
    ) -> Result<f64, MetricError> {
        let function =
            self.functions
                .get(&descriptor.name)
                .ok_or_else(|| MetricError::UnknownMetric {
                    name: descriptor.name.clone(),
                })?;
        function(y_true, y_pred, &descriptor.params)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_directions() {
        let registry = MetricRegistry::builtin();
        assert_eq!(
            registry.direction("mean_squared_error").unwrap(),
            ObjectiveDirection::Minimize
        );
        assert_eq!(
            registry.direction("accuracy").unwrap(),
            ObjectiveDirection::Maximize
        );
    }

    #[test]
    fn unknown_metric_is_an_error() {
        let registry = MetricRegistry::builtin();
        assert!(registry.direction("log_loss").is_err());
        let descriptor = MetricDescriptor::new("log_loss");
        assert!(registry.compute(&descriptor, &[1.0], &[1.0]).is_err());
    }

    #[test]
    fn compute_resolves_by_name() {
        let registry = MetricRegistry::builtin();
        let descriptor = MetricDescriptor::new("mean_absolute_error");
        let value = registry
            .compute(&descriptor, &[1.0, 3.0], &[2.0, 3.0])
            .unwrap();
        assert!((value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn custom_metric_registration() {
        let mut registry = MetricRegistry::new();
        registry.register(
            "zero_one_loss",
            ObjectiveDirection::Minimize,
            Arc::new(|t, p, _| {
                crate::functions::accuracy(t, p).map(|a| 1.0 - a)
            }),
        );
        let descriptor = MetricDescriptor::new("zero_one_loss");
        let value = registry
            .compute(&descriptor, &[1.0, 0.0], &[1.0, 1.0])
            .unwrap();
        assert!((value - 0.5).abs() < 1e-12);
        assert_eq!(
            registry.direction("zero_one_loss").unwrap(),
            ObjectiveDirection::Minimize
        );
    }
}
