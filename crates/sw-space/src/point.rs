//! Configuration points: one step choice assigned per dimension.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sw_types::{Fingerprint, FingerprintBuilder};

use crate::space::StepChoice;

/// An assignment of one concrete [`StepChoice`] to each dimension of a
/// configuration space. Candidates proposed by the search are points;
/// evaluation results are kept in a side table keyed by [`Self::fingerprint`],
/// never on the point itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationPoint {
    assignments: BTreeMap<String, StepChoice>,
}

impl ConfigurationPoint {
    pub fn new(assignments: BTreeMap<String, StepChoice>) -> Self {
        Self { assignments }
    }

    pub fn get(&self, dimension: &str) -> Option<&StepChoice> {
        self.assignments.get(dimension)
    }

    pub fn assignments(&self) -> &BTreeMap<String, StepChoice> {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// A copy of this point with one dimension's choice replaced.
    pub fn with_replaced(&self, dimension: &str, choice: StepChoice) -> Self {
        let mut assignments = self.assignments.clone();
        assignments.insert(dimension.to_string(), choice);
        Self { assignments }
    }

    /// Candidate-level cache key: a digest of the full assignment in
    /// dimension order. Equal assignments fingerprint equally; changing
    /// any one dimension changes the digest.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut builder = FingerprintBuilder::new();
        for (dimension, choice) in &self.assignments {
            builder.update_str(dimension);
            builder.update_str(&choice.label());
        }
        builder.finish()
    }

    /// Compact human-readable form for log lines.
    pub fn describe(&self) -> String {
        self.assignments
            .iter()
            .map(|(d, c)| format!("{d}={}", c.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point() -> ConfigurationPoint {
        ConfigurationPoint::new(BTreeMap::from([
            ("impute".to_string(), StepChoice::new("impute.mean")),
            (
                "model".to_string(),
                StepChoice::new("model.knn_regressor").with_hyperparam("k", json!(3)),
            ),
        ]))
    }

    #[test]
    fn equal_assignments_fingerprint_equally() {
        assert_eq!(point().fingerprint(), point().fingerprint());
    }

    #[test]
    fn any_dimension_change_alters_fingerprint() {
        let base = point();
        let other_primitive =
            base.with_replaced("model", StepChoice::new("model.ridge_regressor"));
        let other_hyperparam = base.with_replaced(
            "model",
            StepChoice::new("model.knn_regressor").with_hyperparam("k", json!(5)),
        );
        assert_ne!(base.fingerprint(), other_primitive.fingerprint());
        assert_ne!(base.fingerprint(), other_hyperparam.fingerprint());
    }

    #[test]
    fn with_replaced_leaves_original_untouched() {
        let base = point();
        let replaced = base.with_replaced("impute", StepChoice::new("impute.median"));
        assert_eq!(base.get("impute").unwrap().primitive, "impute.mean");
        assert_eq!(replaced.get("impute").unwrap().primitive, "impute.median");
    }

    #[test]
    fn describe_lists_every_dimension() {
        let text = point().describe();
        assert!(text.contains("impute=impute.mean"));
        assert!(text.contains("model=model.knn_regressor"));
    }
}
