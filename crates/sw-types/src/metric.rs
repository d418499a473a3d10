//! Metric descriptors and score records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Whether the primary metric is maximized or minimized by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

impl ObjectiveDirection {
    /// Strict-improvement comparison used by the acceptance rule.
    pub fn improves(&self, candidate: f64, current: f64) -> bool {
        match self {
            Self::Maximize => candidate > current,
            Self::Minimize => candidate < current,
        }
    }

    /// Always-higher-is-better transform of a metric value.
    pub fn reward(&self, value: f64) -> f64 {
        match self {
            Self::Maximize => value,
            Self::Minimize => -value,
        }
    }
}

/// Names a metric function plus its keyword parameters; resolved to a
/// callable through the metric registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, JsonValue>,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// A single scalar metric result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub metric: String,
    pub value: f64,
}

/// Held-out fold targets kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldTargets {
    pub ground_truth: Vec<f64>,
    pub prediction: Vec<f64>,
}

/// Cross-validation outcome for one metric: the fold mean, the raw
/// per-fold values, and the per-fold targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationScore {
    pub metric: String,
    pub value: f64,
    pub values: Vec<f64>,
    pub targets: Vec<FoldTargets>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improves_is_strict() {
        assert!(ObjectiveDirection::Maximize.improves(2.0, 1.0));
        assert!(!ObjectiveDirection::Maximize.improves(1.0, 1.0));
        assert!(ObjectiveDirection::Minimize.improves(0.5, 1.0));
        assert!(!ObjectiveDirection::Minimize.improves(1.0, 1.0));
    }

    #[test]
    fn reward_negates_when_minimizing() {
        assert_eq!(ObjectiveDirection::Minimize.reward(0.25), -0.25);
        assert_eq!(ObjectiveDirection::Maximize.reward(0.25), 0.25);
    }

    #[test]
    fn descriptor_builder() {
        let d = MetricDescriptor::new("f1_macro").with_param("labels", serde_json::json!([0, 1]));
        assert_eq!(d.name, "f1_macro");
        assert!(d.params.contains_key("labels"));
    }
}
