//! Coordinate-descent search over the configuration space.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sw_space::{ConfigurationPoint, ConfigurationSpace};
use sw_types::{ObjectiveDirection, SearchError, SwResult};

use crate::candidates::SearchCaches;
use crate::evaluate::{Evaluation, PipelineEvaluator};
use crate::pool::WorkerPool;

/// Caller-facing search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum alternative choices sampled per dimension and sweep.
    pub max_per_dimension: usize,
    /// Outer iterations; every iteration re-sweeps all dimensions against
    /// the then-current best.
    pub num_iterations: usize,
    /// Worker pool size; 0 means all available parallelism.
    pub num_workers: usize,
    /// Extra random attempts after the first initial candidate fails.
    pub initial_retries: usize,
    /// When set, a summary artifact is persisted per evaluated candidate.
    pub output_directory: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_per_dimension: 10,
            num_iterations: 3,
            num_workers: 0,
            initial_retries: 2,
            output_directory: None,
        }
    }
}

impl SearchConfig {
    pub fn with_max_per_dimension(mut self, n: usize) -> Self {
        self.max_per_dimension = n;
        self
    }

    pub fn with_num_iterations(mut self, n: usize) -> Self {
        self.num_iterations = n;
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn validate(&self) -> SwResult<()> {
        if self.max_per_dimension < 1 {
            return Err(SearchError::InvalidConfig {
                message: "max_per_dimension must be at least 1".to_string(),
            }
            .into());
        }
        if self.num_iterations < 1 {
            return Err(SearchError::InvalidConfig {
                message: "num_iterations must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Final search outcome.
pub struct SearchReport {
    pub best: ConfigurationPoint,
    /// Primary-metric value of the best candidate on held-out data.
    pub best_value: f64,
    /// Always-higher-is-better transform of `best_value`.
    pub reward: f64,
    pub elapsed_seconds: f64,
    /// Candidate evaluations dispatched, cache hits excluded.
    pub candidates_simulated: usize,
    pub evaluation: Evaluation,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct SearchState {
    best: ConfigurationPoint,
    best_value: Option<f64>,
    best_evaluation: Option<Evaluation>,
}

/// Searches the configuration space one dimension at a time: all other
/// dimensions stay at the current best while sampled alternatives for the
/// active dimension are evaluated in parallel, and the best strictly
/// improving candidate is adopted.
pub struct DimensionalSearch {
    evaluator: PipelineEvaluator,
    space: ConfigurationSpace,
    direction: ObjectiveDirection,
    dimension_ordering: Vec<String>,
    pool: WorkerPool,
    config: SearchConfig,
}

impl DimensionalSearch {
    /// The direction comes from the primary metric; every template
    /// position must be a dimension of the space.
    pub fn new(
        evaluator: PipelineEvaluator,
        space: ConfigurationSpace,
        config: SearchConfig,
    ) -> SwResult<Self> {
        config.validate()?;
        let primary = &evaluator.metrics()[0];
        let direction = evaluator.metric_registry().direction(&primary.name)?;
        let dimension_ordering: Vec<String> = evaluator
            .template()
            .node_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        for dimension in &dimension_ordering {
            space.choices(dimension)?;
        }
        let pool = WorkerPool::new(config.num_workers)?;
        let evaluator = match &config.output_directory {
            Some(dir) => evaluator.with_output_directory(dir.clone()),
            None => evaluator,
        };
        Ok(Self {
            evaluator,
            space,
            direction,
            dimension_ordering,
            pool,
            config,
        })
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }

    /// Run the full search: initialize (or adopt the caller-supplied
    /// candidate), then sweep every dimension for the configured number of
    /// iterations.
    pub fn search(
        &self,
        initial: Option<ConfigurationPoint>,
        caches: &SearchCaches,
    ) -> SwResult<SearchReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut simulated = 0usize;

        let (best, evaluation) = self.setup_initial_candidate(initial, caches, &mut simulated)?;
        let best_value = evaluation
            .primary_value()
            .ok_or(SearchError::NoViableCandidate)?;
        info!(
            candidate = %best.describe(),
            value = best_value,
            "initial candidate established"
        );
        let mut state = SearchState {
            best,
            best_value: Some(best_value),
            best_evaluation: Some(evaluation),
        };

        for iteration in 0..self.config.num_iterations {
            debug!(iteration, best_value = ?state.best_value, "starting dimension sweep");
            self.sweep(&mut state, caches, &mut simulated)?;
        }

        let best_value = state.best_value.ok_or(SearchError::NoViableCandidate)?;
        let evaluation = state
            .best_evaluation
            .ok_or(SearchError::NoViableCandidate)?;
        let reward = self.direction.reward(best_value);
        let elapsed_seconds = timer.elapsed().as_secs_f64();
        info!(
            best = %state.best.describe(),
            best_value,
            reward,
            candidates = simulated,
            elapsed = elapsed_seconds,
            "search complete"
        );

        Ok(SearchReport {
            best: state.best,
            best_value,
            reward,
            elapsed_seconds,
            candidates_simulated: simulated,
            evaluation,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// One pass over every dimension, holding the others at the current
    /// best.
    fn sweep(
        &self,
        state: &mut SearchState,
        caches: &SearchCaches,
        simulated: &mut usize,
    ) -> SwResult<()> {
        for dimension in &self.dimension_ordering {
            // Nothing to search with a single possible choice.
            if self.space.num_choices(dimension)? < 2 {
                continue;
            }

            let mut selected = {
                let mut rng = thread_rng();
                self.space.sample_without_replacement(
                    dimension,
                    self.config.max_per_dimension,
                    &mut rng,
                )?
            };
            // The current best's choice is already known.
            if state.best_value.is_some() {
                if let Some(current) = state.best.get(dimension) {
                    let current = current.clone();
                    selected.retain(|choice| *choice != current);
                }
            }

            // Skip configurations whose result is already cached.
            let candidates: Vec<ConfigurationPoint> = selected
                .into_iter()
                .map(|choice| state.best.with_replaced(dimension, choice))
                .filter(|point| !caches.candidate.contains(&point.fingerprint()))
                .collect();
            if candidates.is_empty() {
                debug!(%dimension, "no new candidates to evaluate");
                continue;
            }

            info!(%dimension, batch = candidates.len(), "dispatching candidate batch");
            *simulated += candidates.len();
            let results = self
                .pool
                .run_batch(&candidates, |point| self.evaluator.evaluate(point, caches));

            let mut test_values: Vec<f64> = Vec::new();
            let mut cv_values: Vec<Option<f64>> = Vec::new();
            let mut successes: Vec<(ConfigurationPoint, Evaluation)> = Vec::new();
            for (point, result) in candidates.iter().zip(results) {
                caches.candidate.push(point, result.as_ref())?;
                let Some(evaluation) = result else {
                    warn!(candidate = %point.describe(), "candidate failed");
                    continue;
                };
                let Some(value) = evaluation.primary_value() else {
                    warn!(candidate = %point.describe(), "candidate returned no primary metric");
                    continue;
                };
                test_values.push(value);
                cv_values.push(evaluation.primary_cross_validation().map(|s| s.value));
                successes.push((point.clone(), evaluation));
            }

            if test_values.is_empty() {
                info!(%dimension, "no candidate succeeded for this dimension");
                if state.best_value.is_none() {
                    return Err(SearchError::NoViableCandidate.into());
                }
                continue;
            }

            let best_index = select_best_index(&test_values, self.direction);
            self.report_cross_validation_disagreement(best_index, &test_values, &cv_values);

            let chosen_value = test_values[best_index];
            let adopt = match state.best_value {
                None => true,
                Some(current) => self.direction.improves(chosen_value, current),
            };
            if adopt {
                let (point, evaluation) = &successes[best_index];
                info!(
                    dimension,
                    value = chosen_value,
                    candidate = %point.describe(),
                    "adopting improved candidate"
                );
                state.best = point.clone();
                state.best_value = Some(chosen_value);
                state.best_evaluation = Some(evaluation.clone());
            } else {
                debug!(%dimension, value = chosen_value, "no strict improvement, keeping current best");
            }
        }
        Ok(())
    }

    /// The cross-validation best index is informational only: it never
    /// overrides the primary-metric decision, but a disagreement is worth a
    /// warning.
    fn report_cross_validation_disagreement(
        &self,
        best_index: usize,
        test_values: &[f64],
        cv_values: &[Option<f64>],
    ) {
        let present: Vec<(usize, f64)> = cv_values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();
        if present.is_empty() {
            return;
        }
        let mut best_cv = present[0];
        for &(i, v) in &present[1..] {
            if self.direction.improves(v, best_cv.1) {
                best_cv = (i, v);
            }
        }
        if best_cv.0 == best_index {
            debug!(
                index = best_index,
                value = best_cv.1,
                "cross-validation agrees with the primary metric"
            );
        } else {
            warn!(
                primary_index = best_index,
                primary_value = test_values[best_index],
                cv_index = best_cv.0,
                cv_value = best_cv.1,
                "cross-validation best disagrees with the primary metric best"
            );
        }
    }

    /// Establish the baseline candidate: the caller-supplied point or the
    /// first-choice assignment, then fresh random assignments after
    /// failures, up to the configured retry bound.
    fn setup_initial_candidate(
        &self,
        initial: Option<ConfigurationPoint>,
        caches: &SearchCaches,
        simulated: &mut usize,
    ) -> SwResult<(ConfigurationPoint, Evaluation)> {
        let mut candidate = match initial {
            Some(point) => self.space.materialize(point.assignments())?,
            None => self.space.first_assignment()?,
        };

        let attempts = 1 + self.config.initial_retries;
        for attempt in 0..attempts {
            if let Some(record) = caches.candidate.lookup(&candidate) {
                match (record.value, record.evaluation) {
                    (Some(value), Some(evaluation)) => {
                        debug!(candidate = %candidate.describe(), value, "initial candidate already cached");
                        return Ok((candidate, evaluation));
                    }
                    _ => {
                        // A cached failure means this configuration is known
                        // to be incompatible with the data.
                        warn!(
                            attempt,
                            candidate = %candidate.describe(),
                            "initial candidate previously failed, trying a random assignment"
                        );
                    }
                }
            } else {
                *simulated += 1;
                match self.evaluator.evaluate(&candidate, caches) {
                    Ok(evaluation) => {
                        caches.candidate.push(&candidate, Some(&evaluation))?;
                        return Ok((candidate, evaluation));
                    }
                    Err(error) => {
                        warn!(
                            attempt,
                            %error,
                            candidate = %candidate.describe(),
                            "initial candidate failed, trying a random assignment"
                        );
                        caches.candidate.push(&candidate, None)?;
                    }
                }
            }

            if attempt + 1 < attempts {
                let mut rng = thread_rng();
                candidate = self.space.random_assignment(&mut rng)?;
            }
        }

        Err(SearchError::NoViableInitialCandidate { attempts }.into())
    }
}

/// Index of the best value under the given direction; ties keep the
/// earliest index, preserving the stable order of the sampled list.
fn select_best_index(values: &[f64], direction: ObjectiveDirection) -> usize {
    let mut best = 0;
    for (index, &value) in values.iter().enumerate().skip(1) {
        if direction.improves(value, values[best]) {
            best = index;
        }
    }
    best
}
