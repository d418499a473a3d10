//! Dimension and sampling machinery of the configuration space.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sw_types::{canonical_params, SpaceError, SwResult};

use crate::point::ConfigurationPoint;

/// One candidate assignment for a dimension: a primitive identity plus a
/// concrete hyperparameter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepChoice {
    pub primitive: String,
    #[serde(default)]
    pub hyperparams: BTreeMap<String, JsonValue>,
}

impl StepChoice {
    pub fn new(primitive: impl Into<String>) -> Self {
        Self {
            primitive: primitive.into(),
            hyperparams: BTreeMap::new(),
        }
    }

    pub fn with_hyperparam(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.hyperparams.insert(key.into(), value);
        self
    }

    /// Canonical label, stable across equal choices. Feeds fingerprints
    /// and log lines.
    pub fn label(&self) -> String {
        if self.hyperparams.is_empty() {
            self.primitive.clone()
        } else {
            format!("{}{}", self.primitive, canonical_params(&self.hyperparams))
        }
    }
}

impl std::fmt::Display for StepChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single pipeline position with its weighted candidate choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub choices: Vec<StepChoice>,
    /// Per-choice sampling weight; larger = more likely to be drawn.
    pub weights: Vec<f64>,
}

/// The full configuration space: an ordered list of dimensions.
///
/// Built once from the step catalog and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSpace {
    dimensions: Vec<Dimension>,
}

impl ConfigurationSpace {
    pub fn new() -> Self {
        Self {
            dimensions: Vec::new(),
        }
    }

    /// Add a dimension with uniform weight 1 per choice.
    pub fn add_dimension(self, name: impl Into<String>, choices: Vec<StepChoice>) -> Self {
        let weights = vec![1.0; choices.len()];
        self.add_weighted(name, choices, weights)
    }

    /// Add a dimension with explicit weights. Negative weights are clamped
    /// to zero; a zero-weight choice is only drawn once every positive-
    /// weight choice has been.
    pub fn add_weighted(
        mut self,
        name: impl Into<String>,
        choices: Vec<StepChoice>,
        weights: Vec<f64>,
    ) -> Self {
        let weights = choices
            .iter()
            .enumerate()
            .map(|(i, _)| weights.get(i).copied().unwrap_or(1.0).max(0.0))
            .collect();
        self.dimensions.push(Dimension {
            name: name.into(),
            choices,
            weights,
        });
        self
    }

    /// Dimension names in search order.
    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    fn dimension(&self, name: &str) -> Result<&Dimension, SpaceError> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| SpaceError::UnknownDimension {
                name: name.to_string(),
            })
    }

    pub fn choices(&self, name: &str) -> SwResult<&[StepChoice]> {
        Ok(self.dimension(name)?.choices.as_slice())
    }

    pub fn num_choices(&self, name: &str) -> SwResult<usize> {
        Ok(self.dimension(name)?.choices.len())
    }

    /// Deterministic first choice of a dimension.
    pub fn first(&self, name: &str) -> SwResult<&StepChoice> {
        let dim = self.dimension(name)?;
        dim.choices.first().ok_or_else(|| {
            SpaceError::EmptyDimension {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Uniformly random choice of a dimension.
    pub fn random(&self, name: &str, rng: &mut impl Rng) -> SwResult<&StepChoice> {
        let dim = self.dimension(name)?;
        if dim.choices.is_empty() {
            return Err(SpaceError::EmptyDimension {
                name: name.to_string(),
            }
            .into());
        }
        Ok(&dim.choices[rng.gen_range(0..dim.choices.len())])
    }

    /// Draw up to `k` distinct choices, weight-proportionally and without
    /// replacement.
    pub fn sample_without_replacement(
        &self,
        name: &str,
        k: usize,
        rng: &mut impl Rng,
    ) -> SwResult<Vec<StepChoice>> {
        let dim = self.dimension(name)?;
        Ok(weighted_sample_without_replacement(
            &dim.choices,
            &dim.weights,
            k,
            rng,
        ))
    }

    /// First-choice assignment across every dimension.
    pub fn first_assignment(&self) -> SwResult<ConfigurationPoint> {
        let mut assignments = BTreeMap::new();
        for dim in &self.dimensions {
            let choice = self.first(&dim.name)?;
            assignments.insert(dim.name.clone(), choice.clone());
        }
        Ok(ConfigurationPoint::new(assignments))
    }

    /// Uniformly random assignment across every dimension.
    pub fn random_assignment(&self, rng: &mut impl Rng) -> SwResult<ConfigurationPoint> {
        let mut assignments = BTreeMap::new();
        for dim in &self.dimensions {
            let choice = self.random(&dim.name, rng)?.clone();
            assignments.insert(dim.name.clone(), choice);
        }
        Ok(ConfigurationPoint::new(assignments))
    }

    /// Complete a partial assignment into a full configuration point.
    ///
    /// Every assigned value must belong to its dimension's choice set;
    /// unassigned dimensions get their first choice.
    pub fn materialize(
        &self,
        partial: &BTreeMap<String, StepChoice>,
    ) -> SwResult<ConfigurationPoint> {
        for name in partial.keys() {
            self.dimension(name)?;
        }
        let mut assignments = BTreeMap::new();
        for dim in &self.dimensions {
            match partial.get(&dim.name) {
                Some(choice) => {
                    if !dim.choices.contains(choice) {
                        return Err(SpaceError::InvalidDimensionValue {
                            dimension: dim.name.clone(),
                            value: choice.label(),
                        }
                        .into());
                    }
                    assignments.insert(dim.name.clone(), choice.clone());
                }
                None => {
                    assignments.insert(dim.name.clone(), self.first(&dim.name)?.clone());
                }
            }
        }
        Ok(ConfigurationPoint::new(assignments))
    }

    /// True when the point assigns a valid choice to every dimension.
    pub fn is_complete(&self, point: &ConfigurationPoint) -> bool {
        self.dimensions
            .iter()
            .all(|d| matches!(point.get(&d.name), Some(c) if d.choices.contains(c)))
    }
}

impl Default for ConfigurationSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Weight-proportional sampling without replacement: repeatedly draw from
/// the cumulative-weight distribution and zero the drawn weight. Once the
/// remaining weight is all zero, the remainder is drawn uniformly so that
/// `min(k, n)` distinct items always come back.
pub fn weighted_sample_without_replacement<T: Clone>(
    population: &[T],
    weights: &[f64],
    k: usize,
    rng: &mut impl Rng,
) -> Vec<T> {
    let k = k.min(population.len());
    let mut weights: Vec<f64> = (0..population.len())
        .map(|i| weights.get(i).copied().unwrap_or(1.0).max(0.0))
        .collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k);

    for _ in 0..k {
        let total: f64 = weights.iter().sum();
        let index = if total > 0.0 {
            let r = rng.gen::<f64>() * total;
            let mut cum = 0.0;
            let mut chosen = None;
            for (i, &w) in weights.iter().enumerate() {
                cum += w;
                if cum > r {
                    chosen = Some(i);
                    break;
                }
            }
            // Floating-point round-off can leave the draw past the last
            // boundary; fall back to the last positive-weight item.
            chosen
                .or_else(|| weights.iter().rposition(|&w| w > 0.0))
                .unwrap_or(weights.len() - 1)
        } else {
            let remaining: Vec<usize> = (0..weights.len())
                .filter(|i| !selected.contains(i))
                .collect();
            remaining[rng.gen_range(0..remaining.len())]
        };
        selected.push(index);
        weights[index] = 0.0;
    }

    selected.into_iter().map(|i| population[i].clone()).collect()
}
