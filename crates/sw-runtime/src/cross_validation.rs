//! Per-step cross-validation.
//!
//! Invoked at fit time for steps whose pipeline node requests it. Folds are
//! seeded so repeated runs split identically; a failing fold is skipped, and
//! when every fold fails the routine returns an empty result — callers must
//! treat an empty result as "unavailable", never as a score of zero.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use sw_metrics::MetricRegistry;
use sw_types::{
    CrossValidationSpec, CrossValidationScore, FoldTargets, MetricDescriptor, NamedValues,
    PipelineError, StepNode, SwResult, Table, Value, MAIN_OUTPUT,
};

use crate::primitive::StepRegistry;

const FOLD_SEED: u64 = 4767;

/// Split the step's training inputs into folds, train a fresh primitive
/// instance per fold on the complement, score it on the held-out fold, and
/// return per-metric means with the raw per-fold values and targets.
pub fn cross_validate(
    registry: &StepRegistry,
    node: &StepNode,
    training: &NamedValues,
    metrics: &[MetricDescriptor],
    metric_registry: &MetricRegistry,
    spec: &CrossValidationSpec,
) -> Vec<CrossValidationScore> {
    let features = match training.get("inputs").and_then(Value::as_table) {
        Some(table) => table,
        None => {
            warn!(step = %node.name, "cross-validation skipped: no feature table bound");
            return Vec::new();
        }
    };
    let target = match training.get("outputs").and_then(Value::as_column) {
        Some(column) => column,
        None => {
            warn!(step = %node.name, "cross-validation skipped: no target column bound");
            return Vec::new();
        }
    };

    let n = target.len();
    if features.n_rows() != n {
        warn!(
            step = %node.name,
            rows = features.n_rows(),
            targets = n,
            "cross-validation skipped: feature/target row mismatch"
        );
        return Vec::new();
    }
    let folds = spec.folds.min(n);
    if folds < 2 {
        warn!(step = %node.name, folds, "cross-validation skipped: fewer than 2 folds");
        return Vec::new();
    }

    let fold_of = assign_folds(target, folds, spec.stratified);

    let mut values_per_metric: Vec<Vec<f64>> = vec![Vec::new(); metrics.len()];
    let mut targets: Vec<FoldTargets> = Vec::new();

    for fold in 0..folds {
        let test_idx: Vec<usize> = (0..n).filter(|&i| fold_of[i] == fold).collect();
        let train_idx: Vec<usize> = (0..n).filter(|&i| fold_of[i] != fold).collect();
        if test_idx.is_empty() || train_idx.is_empty() {
            continue;
        }

        match run_fold(
            registry,
            node,
            training,
            metrics,
            metric_registry,
            features,
            target,
            &train_idx,
            &test_idx,
        ) {
            Ok((ground_truth, prediction, scores)) => {
                for (slot, score) in values_per_metric.iter_mut().zip(scores) {
                    slot.push(score);
                }
                targets.push(FoldTargets {
                    ground_truth,
                    prediction,
                });
            }
            Err(error) => {
                warn!(step = %node.name, fold, %error, "cross-validation fold failed");
            }
        }
    }

    if targets.is_empty() {
        return Vec::new();
    }

    let results: Vec<CrossValidationScore> = metrics
        .iter()
        .zip(values_per_metric)
        .map(|(descriptor, values)| {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            CrossValidationScore {
                metric: descriptor.name.clone(),
                value: mean,
                values,
                targets: targets.clone(),
            }
        })
        .collect();

    for result in &results {
        debug!(
            step = %node.name,
            metric = %result.metric,
            value = result.value,
            folds = result.values.len(),
            "cross-validation result"
        );
    }

    results
}

/// Shuffled fold assignment; stratified deals each label group round-robin
/// so every fold sees the label distribution.
fn assign_folds(target: &[f64], folds: usize, stratified: bool) -> Vec<usize> {
    let n = target.len();
    let mut rng = ChaCha8Rng::seed_from_u64(FOLD_SEED);
    let mut fold_of = vec![0usize; n];

    if stratified {
        let mut groups: Vec<(u64, Vec<usize>)> = Vec::new();
        for (i, &label) in target.iter().enumerate() {
            let key = label.to_bits();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(i),
                None => groups.push((key, vec![i])),
            }
        }
        let mut counter = 0usize;
        for (_, mut members) in groups {
            members.shuffle(&mut rng);
            for index in members {
                fold_of[index] = counter % folds;
                counter += 1;
            }
        }
    } else {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        for (position, &index) in indices.iter().enumerate() {
            fold_of[index] = position % folds;
        }
    }

    fold_of
}

#[allow(clippy::too_many_arguments)]
fn run_fold(
    registry: &StepRegistry,
    node: &StepNode,
    training: &NamedValues,
    metrics: &[MetricDescriptor],
    metric_registry: &MetricRegistry,
    features: &Table,
    target: &[f64],
    train_idx: &[usize],
    test_idx: &[usize],
) -> SwResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let mut primitive = registry.create(&node.primitive, &node.hyperparams)?;

    let mut fit_inputs = training.clone();
    fit_inputs.insert(
        "inputs".to_string(),
        Value::table(features.take_rows(train_idx)),
    );
    fit_inputs.insert(
        "outputs".to_string(),
        Value::column(train_idx.iter().map(|&i| target[i]).collect()),
    );
    primitive.fit(&fit_inputs)?;

    let mut apply_inputs = training.clone();
    apply_inputs.remove("outputs");
    apply_inputs.insert(
        "inputs".to_string(),
        Value::table(features.take_rows(test_idx)),
    );
    let outputs = primitive.apply(&apply_inputs)?;

    let prediction = outputs
        .get(MAIN_OUTPUT)
        .and_then(Value::as_column)
        .ok_or_else(|| PipelineError::MissingOutput {
            step: node.name.clone(),
            output: MAIN_OUTPUT.to_string(),
        })?
        .to_vec();
    let ground_truth: Vec<f64> = test_idx.iter().map(|&i| target[i]).collect();

    let mut scores = Vec::with_capacity(metrics.len());
    for descriptor in metrics {
        scores.push(
            metric_registry
                .compute(descriptor, &ground_truth, &prediction)
                .map_err(sw_types::SwError::Metric)?,
        );
    }
    Ok((ground_truth, prediction, scores))
}
