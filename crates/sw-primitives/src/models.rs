//! Regression models.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use sw_runtime::{param_f64, param_usize, require_column, require_table, StepPrimitive};
use sw_types::{NamedValues, PipelineError, SwResult, Value, MAIN_OUTPUT};

fn execution_error(step: &str, message: impl Into<String>) -> sw_types::SwError {
    PipelineError::StepExecution {
        step: step.to_string(),
        message: message.into(),
    }
    .into()
}

fn prediction(values: Vec<f64>) -> NamedValues {
    NamedValues::from([(MAIN_OUTPUT.to_string(), Value::column(values))])
}

/// Baseline: predicts the training target mean for every row.
pub struct MeanRegressor {
    mean: f64,
}

impl MeanRegressor {
    pub fn new() -> Self {
        Self { mean: 0.0 }
    }
}

impl Default for MeanRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPrimitive for MeanRegressor {
    fn name(&self) -> &str {
        "model.mean_regressor"
    }

    fn configure(&mut self, _hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
        Ok(())
    }

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()> {
        let target = require_column(inputs, "outputs", self.name())?;
        if target.is_empty() {
            return Err(execution_error(self.name(), "empty training target"));
        }
        self.mean = target.iter().sum::<f64>() / target.len() as f64;
        Ok(())
    }

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
        let features = require_table(inputs, "inputs", self.name())?;
        Ok(prediction(vec![self.mean; features.n_rows()]))
    }
}

/// k-nearest-neighbours regression under euclidean distance.
pub struct KnnRegressor {
    k: usize,
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    pub fn new() -> Self {
        Self {
            k: 5,
            rows: Vec::new(),
            targets: Vec::new(),
        }
    }

    fn distance(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = x - y;
                if d.is_finite() {
                    d * d
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            .sqrt()
    }
}

impl Default for KnnRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPrimitive for KnnRegressor {
    fn name(&self) -> &str {
        "model.knn_regressor"
    }

    fn configure(&mut self, hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
        if let Some(k) = param_usize(hyperparams, "k") {
            if k == 0 {
                return Err(execution_error(self.name(), "k must be at least 1"));
            }
            self.k = k;
        }
        Ok(())
    }

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()> {
        let features = require_table(inputs, "inputs", self.name())?;
        let target = require_column(inputs, "outputs", self.name())?;
        if features.n_rows() != target.len() {
            return Err(execution_error(
                self.name(),
                format!(
                    "{} feature rows for {} targets",
                    features.n_rows(),
                    target.len()
                ),
            ));
        }
        if target.is_empty() {
            return Err(execution_error(self.name(), "empty training set"));
        }
        self.rows = (0..features.n_rows()).map(|i| features.row(i)).collect();
        self.targets = target.to_vec();
        Ok(())
    }

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
        if self.rows.is_empty() {
            return Err(execution_error(self.name(), "model has not been fitted"));
        }
        let features = require_table(inputs, "inputs", self.name())?;
        let k = self.k.min(self.rows.len());

        let mut predictions = Vec::with_capacity(features.n_rows());
        for i in 0..features.n_rows() {
            let query = features.row(i);
            let mut neighbours: Vec<(f64, f64)> = self
                .rows
                .iter()
                .zip(&self.targets)
                .map(|(row, &y)| (Self::distance(&query, row), y))
                .collect();
            neighbours.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            let sum: f64 = neighbours.iter().take(k).map(|&(_, y)| y).sum();
            predictions.push(sum / k as f64);
        }
        Ok(prediction(predictions))
    }
}

/// Linear regression with L2 regularization, solved by normal equations.
pub struct RidgeRegressor {
    alpha: f64,
    weights: Vec<f64>,
    intercept: f64,
}

impl RidgeRegressor {
    pub fn new() -> Self {
        Self {
            alpha: 1.0,
            weights: Vec::new(),
            intercept: 0.0,
        }
    }
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPrimitive for RidgeRegressor {
    fn name(&self) -> &str {
        "model.ridge_regressor"
    }

    fn configure(&mut self, hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
        if let Some(alpha) = param_f64(hyperparams, "alpha") {
            if alpha < 0.0 {
                return Err(execution_error(self.name(), "alpha must be non-negative"));
            }
            self.alpha = alpha;
        }
        Ok(())
    }

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()> {
        let features = require_table(inputs, "inputs", self.name())?;
        let target = require_column(inputs, "outputs", self.name())?;
        let n = features.n_rows();
        let d = features.n_columns();
        if n != target.len() {
            return Err(execution_error(
                self.name(),
                format!("{} feature rows for {} targets", n, target.len()),
            ));
        }
        if n == 0 || d == 0 {
            return Err(execution_error(self.name(), "empty training set"));
        }

        // Augmented design matrix: features plus an unpenalized intercept.
        let dim = d + 1;
        let mut gram = vec![vec![0.0; dim]; dim];
        let mut moment = vec![0.0; dim];
        for i in 0..n {
            let mut row = features.row(i);
            row.push(1.0);
            for a in 0..dim {
                moment[a] += row[a] * target[i];
                for b in 0..dim {
                    gram[a][b] += row[a] * row[b];
                }
            }
        }
        for a in 0..d {
            gram[a][a] += self.alpha;
        }

        let solution = solve_linear_system(gram, moment)
            .ok_or_else(|| execution_error(self.name(), "singular normal equations"))?;
        self.intercept = solution[d];
        self.weights = solution[..d].to_vec();
        Ok(())
    }

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
        if self.weights.is_empty() {
            return Err(execution_error(self.name(), "model has not been fitted"));
        }
        let features = require_table(inputs, "inputs", self.name())?;
        if features.n_columns() != self.weights.len() {
            return Err(execution_error(
                self.name(),
                format!(
                    "expected {} feature columns, got {}",
                    self.weights.len(),
                    features.n_columns()
                ),
            ));
        }
        let predictions = (0..features.n_rows())
            .map(|i| {
                let row = features.row(i);
                self.intercept
                    + row
                        .iter()
                        .zip(&self.weights)
                        .map(|(&x, &w)| x * w)
                        .sum::<f64>()
            })
            .collect();
        Ok(prediction(predictions))
    }
}

/// Gaussian elimination with partial pivoting; `None` when the system is
/// singular.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}
