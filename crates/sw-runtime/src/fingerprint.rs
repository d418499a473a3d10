//! Step-level cache keys.

use sw_types::{canonical_params, Fingerprint, FingerprintBuilder, NamedValues, StepNode};

/// Fingerprint of one step execution: primitive identity, canonical
/// hyperparameters, and the content digests of its resolved input values
/// in argument order.
///
/// Upstream computation is captured transitively: a step's inputs are the
/// outputs of its dependencies, so any upstream change alters the digests
/// seen here. A cross-validation request is part of the key because its
/// scores are stored alongside the fitted state.
pub fn step_fingerprint(node: &StepNode, inputs: &NamedValues) -> Fingerprint {
    let mut builder = FingerprintBuilder::new();
    builder.update_str(&node.primitive);
    builder.update_str(&canonical_params(&node.hyperparams));
    if let Some(cv) = &node.cross_validation {
        builder.update_str("cv");
        builder.update(&(cv.folds as u64).to_le_bytes());
        builder.update(&[cv.stratified as u8]);
    }
    for (argument, value) in inputs {
        builder.update_str(argument);
        builder.update_fingerprint(&value.digest());
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use sw_types::{ArgumentSource, Table, Value};

    fn node(hyperparams: BTreeMap<String, serde_json::Value>) -> StepNode {
        StepNode {
            name: "model".into(),
            primitive: "model.knn_regressor".into(),
            hyperparams,
            arguments: BTreeMap::from([("inputs".to_string(), ArgumentSource::input("inputs"))]),
            cross_validation: None,
        }
    }

    fn inputs(rows: usize) -> NamedValues {
        let data: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        let table = Table::new(vec!["x".into()], vec![data]).unwrap();
        NamedValues::from([("inputs".to_string(), Value::table(table))])
    }

    #[test]
    fn identical_triples_fingerprint_equally() {
        let params = BTreeMap::from([("k".to_string(), serde_json::json!(3))]);
        let a = step_fingerprint(&node(params.clone()), &inputs(10));
        let b = step_fingerprint(&node(params), &inputs(10));
        assert_eq!(a, b);
    }

    #[test]
    fn hyperparameter_change_alters_fingerprint() {
        let a = step_fingerprint(
            &node(BTreeMap::from([("k".to_string(), serde_json::json!(3))])),
            &inputs(10),
        );
        let b = step_fingerprint(
            &node(BTreeMap::from([("k".to_string(), serde_json::json!(5))])),
            &inputs(10),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn input_row_count_change_alters_fingerprint() {
        let params = BTreeMap::from([("k".to_string(), serde_json::json!(3))]);
        let a = step_fingerprint(&node(params.clone()), &inputs(10));
        let b = step_fingerprint(&node(params), &inputs(11));
        assert_ne!(a, b);
    }
}
