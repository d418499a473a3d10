//! Feature transforms: imputation, scaling, feature selection.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use sw_runtime::{param_f64, require_table, StepPrimitive};
use sw_types::{NamedValues, PipelineError, SwResult, Table, Value, MAIN_OUTPUT};

fn column_mean_ignoring_nan(column: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in column {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn rebuild(names: &[String], columns: Vec<Vec<f64>>, who: &str) -> SwResult<Value> {
    let table = Table::new(names.to_vec(), columns).map_err(|e| PipelineError::StepExecution {
        step: who.to_string(),
        message: e.to_string(),
    })?;
    Ok(Value::table(table))
}

/// Replaces missing cells (NaN) with the column mean observed at fit time.
pub struct MeanImputer {
    means: Vec<f64>,
}

impl MeanImputer {
    pub fn new() -> Self {
        Self { means: Vec::new() }
    }
}

impl Default for MeanImputer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPrimitive for MeanImputer {
    fn name(&self) -> &str {
        "impute.mean"
    }

    fn configure(&mut self, _hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
        Ok(())
    }

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()> {
        let table = require_table(inputs, "inputs", self.name())?;
        self.means = table.columns().iter().map(|c| column_mean_ignoring_nan(c)).collect();
        Ok(())
    }

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
        let table = require_table(inputs, "inputs", self.name())?;
        if table.n_columns() != self.means.len() {
            return Err(PipelineError::StepExecution {
                step: self.name().to_string(),
                message: format!(
                    "expected {} columns, got {}",
                    self.means.len(),
                    table.n_columns()
                ),
            }
            .into());
        }
        let columns = table
            .columns()
            .iter()
            .zip(&self.means)
            .map(|(column, &mean)| {
                column
                    .iter()
                    .map(|&v| if v.is_nan() { mean } else { v })
                    .collect()
            })
            .collect();
        let value = rebuild(table.column_names(), columns, self.name())?;
        Ok(NamedValues::from([(MAIN_OUTPUT.to_string(), value)]))
    }
}

/// Standardizes each column to zero mean and unit variance, with the
/// statistics learned at fit time.
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self {
            means: Vec::new(),
            stds: Vec::new(),
        }
    }
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPrimitive for StandardScaler {
    fn name(&self) -> &str {
        "scale.standard"
    }

    fn configure(&mut self, _hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
        Ok(())
    }

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()> {
        let table = require_table(inputs, "inputs", self.name())?;
        self.means.clear();
        self.stds.clear();
        for column in table.columns() {
            let mean = column_mean_ignoring_nan(column);
            let mut variance = 0.0;
            let mut count = 0usize;
            for &v in column {
                if !v.is_nan() {
                    variance += (v - mean) * (v - mean);
                    count += 1;
                }
            }
            let std = if count > 0 {
                (variance / count as f64).sqrt()
            } else {
                0.0
            };
            self.means.push(mean);
            // Constant columns pass through unscaled.
            self.stds.push(if std > 0.0 { std } else { 1.0 });
        }
        Ok(())
    }

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
        let table = require_table(inputs, "inputs", self.name())?;
        if table.n_columns() != self.means.len() {
            return Err(PipelineError::StepExecution {
                step: self.name().to_string(),
                message: format!(
                    "expected {} columns, got {}",
                    self.means.len(),
                    table.n_columns()
                ),
            }
            .into());
        }
        let columns = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| {
                column
                    .iter()
                    .map(|&v| (v - self.means[i]) / self.stds[i])
                    .collect()
            })
            .collect();
        let value = rebuild(table.column_names(), columns, self.name())?;
        Ok(NamedValues::from([(MAIN_OUTPUT.to_string(), value)]))
    }
}

/// Keeps columns whose training variance exceeds a threshold.
pub struct VarianceThreshold {
    threshold: f64,
    kept: Vec<usize>,
}

impl VarianceThreshold {
    pub fn new() -> Self {
        Self {
            threshold: 0.0,
            kept: Vec::new(),
        }
    }
}

impl Default for VarianceThreshold {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPrimitive for VarianceThreshold {
    fn name(&self) -> &str {
        "select.variance_threshold"
    }

    fn configure(&mut self, hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
        if let Some(threshold) = param_f64(hyperparams, "threshold") {
            self.threshold = threshold;
        }
        Ok(())
    }

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()> {
        let table = require_table(inputs, "inputs", self.name())?;
        self.kept.clear();
        for (i, column) in table.columns().iter().enumerate() {
            let mean = column_mean_ignoring_nan(column);
            let mut variance = 0.0;
            let mut count = 0usize;
            for &v in column {
                if !v.is_nan() {
                    variance += (v - mean) * (v - mean);
                    count += 1;
                }
            }
            if count > 0 && variance / count as f64 > self.threshold {
                self.kept.push(i);
            }
        }
        if self.kept.is_empty() {
            return Err(PipelineError::StepExecution {
                step: self.name().to_string(),
                message: format!("no column exceeds variance threshold {}", self.threshold),
            }
            .into());
        }
        Ok(())
    }

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
        let table = require_table(inputs, "inputs", self.name())?;
        let out_of_range = self.kept.iter().any(|&i| i >= table.n_columns());
        if out_of_range {
            return Err(PipelineError::StepExecution {
                step: self.name().to_string(),
                message: format!(
                    "selection refers past the {} available columns",
                    table.n_columns()
                ),
            }
            .into());
        }
        let value = Value::table(table.take_columns(&self.kept));
        Ok(NamedValues::from([(MAIN_OUTPUT.to_string(), value)]))
    }
}
