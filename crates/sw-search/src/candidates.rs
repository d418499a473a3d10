//! Candidate-level memoization and the shared cache bundle.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use sw_runtime::StepCache;
use sw_space::ConfigurationPoint;
use sw_types::{CacheError, Fingerprint, SwResult};

use crate::evaluate::Evaluation;

/// One remembered candidate: its point, its primary test-metric value
/// (`None` records a known failure), and the full evaluation when it
/// succeeded. This side table is where evaluation results live — never on
/// the configuration point itself.
#[derive(Clone)]
pub struct CandidateRecord {
    pub point: ConfigurationPoint,
    pub pipeline_id: Option<Uuid>,
    pub value: Option<f64>,
    pub evaluation: Option<Evaluation>,
}

/// Fingerprint-keyed map over whole pipeline configurations, shared by the
/// search driver and every worker. A hit means the configuration was
/// already tried this search — including configurations that failed.
pub struct CandidateCache {
    entries: DashMap<Fingerprint, CandidateRecord>,
}

impl CandidateCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    pub fn lookup(&self, point: &ConfigurationPoint) -> Option<CandidateRecord> {
        let fingerprint = point.fingerprint();
        let record = self.entries.get(&fingerprint).map(|r| r.clone());
        if let Some(record) = &record {
            debug!(
                fingerprint = %fingerprint,
                pipeline = ?record.pipeline_id,
                "candidate cache hit"
            );
        }
        record
    }

    /// Record an evaluation outcome (`None` = the candidate failed).
    ///
    /// A fingerprint already present with a *different* value is a broken
    /// fingerprint function, surfaced as a hard error rather than silently
    /// overwritten.
    pub fn push(
        &self,
        point: &ConfigurationPoint,
        evaluation: Option<&Evaluation>,
    ) -> SwResult<()> {
        let fingerprint = point.fingerprint();
        let value = evaluation.and_then(Evaluation::primary_value);
        let pipeline_id = evaluation.map(|e| e.fitted.id());

        if let Some(existing) = self.entries.get(&fingerprint) {
            if !values_agree(existing.value, value) {
                return Err(CacheError::Inconsistency {
                    fingerprint: fingerprint.to_hex(),
                    details: format!("{:?} != {:?}", value, existing.value),
                }
                .into());
            }
            return Ok(());
        }

        debug!(fingerprint = %fingerprint, value = ?value, "candidate cache push");
        self.entries.insert(
            fingerprint,
            CandidateRecord {
                point: point.clone(),
                pipeline_id,
                value,
                evaluation: evaluation.cloned(),
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CandidateCache {
    fn default() -> Self {
        Self::new()
    }
}

fn values_agree(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => false,
    }
}

/// The two shared caches of one search invocation, passed by handle into
/// every evaluation — no process-wide singleton. Lifetime is scoped to the
/// search that the caller ran with them.
#[derive(Clone, Default)]
pub struct SearchCaches {
    pub step: Arc<StepCache>,
    pub candidate: Arc<CandidateCache>,
}

impl SearchCaches {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use sw_runtime::Runtime;
    use sw_space::StepChoice;
    use sw_types::{ArgumentSource, MetricScore, OutputRef, Pipeline, StepNode};

    fn point(primitive: &str) -> ConfigurationPoint {
        ConfigurationPoint::new(BTreeMap::from([(
            "model".to_string(),
            StepChoice::new(primitive),
        )]))
    }

    fn evaluation(value: f64) -> Evaluation {
        let pipeline = Pipeline::new(
            vec![StepNode {
                name: "model".into(),
                primitive: "model.mean_regressor".into(),
                hyperparams: BTreeMap::new(),
                arguments: BTreeMap::from([(
                    "inputs".to_string(),
                    ArgumentSource::input("inputs"),
                )]),
                cross_validation: None,
            }],
            vec![OutputRef::main("model")],
        );
        Evaluation {
            fitted: Arc::new(Runtime::new(pipeline).unwrap()),
            training_metrics: Vec::new(),
            test_metrics: vec![MetricScore {
                metric: "mean_squared_error".into(),
                value,
            }],
            cross_validation: Vec::new(),
            total_runtime: 0.0,
        }
    }

    #[test]
    fn push_then_lookup() {
        let cache = CandidateCache::new();
        let p = point("model.knn_regressor");
        cache.push(&p, Some(&evaluation(0.25))).unwrap();

        let record = cache.lookup(&p).unwrap();
        assert_eq!(record.value, Some(0.25));
        assert!(record.evaluation.is_some());
        assert!(cache.contains(&p.fingerprint()));
    }

    #[test]
    fn failure_records_are_remembered() {
        let cache = CandidateCache::new();
        let p = point("model.broken");
        cache.push(&p, None).unwrap();

        let record = cache.lookup(&p).unwrap();
        assert_eq!(record.value, None);
        assert!(record.evaluation.is_none());
    }

    #[test]
    fn equal_revaluation_is_accepted() {
        let cache = CandidateCache::new();
        let p = point("model.knn_regressor");
        cache.push(&p, Some(&evaluation(0.25))).unwrap();
        cache.push(&p, Some(&evaluation(0.25))).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn differing_revaluation_is_an_inconsistency() {
        let cache = CandidateCache::new();
        let p = point("model.knn_regressor");
        cache.push(&p, Some(&evaluation(0.25))).unwrap();
        let err = cache.push(&p, Some(&evaluation(0.5))).unwrap_err();
        assert!(err.to_string().contains("disagrees"));
    }

    #[test]
    fn distinct_points_do_not_collide() {
        let cache = CandidateCache::new();
        cache.push(&point("model.knn_regressor"), None).unwrap();
        cache.push(&point("model.ridge_regressor"), None).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
