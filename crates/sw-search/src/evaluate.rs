//! One full candidate evaluation: fit on training data, score on held-out
//! data.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, warn};

use sw_metrics::MetricRegistry;
use sw_runtime::{Runtime, StepRegistry};
use sw_space::{ConfigurationPoint, PipelineTemplate};
use sw_types::{
    CrossValidationScore, MetricDescriptor, MetricScore, NamedValues, PipelineError, SearchError,
    SwError, SwResult, Value,
};

use crate::candidates::SearchCaches;

/// Everything one candidate evaluation produced. The fitted pipeline is
/// the artifact handed to downstream consumers.
#[derive(Clone)]
pub struct Evaluation {
    pub fitted: Arc<Runtime>,
    pub training_metrics: Vec<MetricScore>,
    pub test_metrics: Vec<MetricScore>,
    pub cross_validation: Vec<CrossValidationScore>,
    /// Wall-clock seconds for the whole fit-and-score cycle.
    pub total_runtime: f64,
}

impl Evaluation {
    /// Held-out value of the primary metric (the first descriptor).
    pub fn primary_value(&self) -> Option<f64> {
        self.test_metrics.first().map(|m| m.value)
    }

    /// Cross-validation score of the primary metric, when available.
    pub fn primary_cross_validation(&self) -> Option<&CrossValidationScore> {
        self.cross_validation.first()
    }

    /// Serializable record written next to persisted artifacts.
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "pipeline_id": self.fitted.id().to_string(),
            "pipeline": self.fitted.pipeline(),
            "training_metrics": self.training_metrics,
            "test_metrics": self.test_metrics,
            "cross_validation_metrics": self.cross_validation,
            "total_runtime": self.total_runtime,
        })
    }
}

/// Shared, read-only evaluation context: the template, the two registries,
/// the metric descriptors (first is primary), and the data handles. One
/// instance serves every worker in a search.
pub struct PipelineEvaluator {
    template: PipelineTemplate,
    registry: Arc<StepRegistry>,
    metric_registry: Arc<MetricRegistry>,
    metrics: Vec<MetricDescriptor>,
    train: NamedValues,
    test: NamedValues,
    output_directory: Option<PathBuf>,
}

impl PipelineEvaluator {
    pub fn new(
        template: PipelineTemplate,
        registry: Arc<StepRegistry>,
        metric_registry: Arc<MetricRegistry>,
        metrics: Vec<MetricDescriptor>,
        train: NamedValues,
        test: NamedValues,
    ) -> SwResult<Self> {
        let primary = metrics.first().ok_or_else(|| SearchError::InvalidConfig {
            message: "at least one metric descriptor is required".to_string(),
        })?;
        // Fail early on unresolvable primary metrics.
        metric_registry.direction(&primary.name)?;
        if template.output_step().is_none() {
            return Err(SearchError::InvalidConfig {
                message: "pipeline template declares no outputs".to_string(),
            }
            .into());
        }
        Ok(Self {
            template,
            registry,
            metric_registry,
            metrics,
            train,
            test,
            output_directory: None,
        })
    }

    /// Persist an artifact summary per successful evaluation into `dir`.
    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn template(&self) -> &PipelineTemplate {
        &self.template
    }

    pub fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    pub fn metric_registry(&self) -> &MetricRegistry {
        &self.metric_registry
    }

    /// Fit the candidate on the training data, produce on the held-out
    /// data, and compute every configured metric on both.
    ///
    /// A failing non-primary metric is recorded as absent; a failing
    /// primary metric fails the whole candidate.
    pub fn evaluate(
        &self,
        point: &ConfigurationPoint,
        caches: &SearchCaches,
    ) -> SwResult<Evaluation> {
        let start = Instant::now();

        let pipeline = self.template.instantiate(point)?;
        let mut runtime = Runtime::new(pipeline)?;
        runtime.set_metric_descriptions(self.metrics.clone());
        runtime.fit(
            &self.train,
            &caches.step,
            &self.registry,
            &self.metric_registry,
        )?;

        // Training predictions come from the fit phase of the output step.
        let output_ref = self
            .template
            .output_step()
            .ok_or_else(|| SearchError::InvalidConfig {
                message: "pipeline template declares no outputs".to_string(),
            })?;
        let training_prediction = runtime
            .fit_output(&output_ref.step, &output_ref.output)
            .and_then(Value::as_column)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| PipelineError::MissingOutput {
                step: output_ref.step.clone(),
                output: output_ref.output.clone(),
            })?;
        let training_truth = target_column(&self.train, "training")?;

        let produced = runtime.produce(&self.test)?;
        let test_prediction = produced
            .first()
            .and_then(Value::as_column)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| PipelineError::MissingOutput {
                step: output_ref.step.clone(),
                output: output_ref.output.clone(),
            })?;
        let test_truth = target_column(&self.test, "held-out")?;

        let training_metrics =
            self.score(&training_truth, &training_prediction, "training")?;
        let test_metrics = self.score(&test_truth, &test_prediction, "test")?;

        let cross_validation = runtime.cross_validation().to_vec();
        let evaluation = Evaluation {
            fitted: Arc::new(runtime),
            training_metrics,
            test_metrics,
            cross_validation,
            total_runtime: start.elapsed().as_secs_f64(),
        };
        debug!(
            pipeline = %evaluation.fitted.id(),
            value = ?evaluation.primary_value(),
            runtime = evaluation.total_runtime,
            "candidate evaluated"
        );

        if let Some(dir) = &self.output_directory {
            if let Err(error) = persist_summary(&evaluation, dir) {
                warn!(%error, pipeline = %evaluation.fitted.id(), "failed to persist artifact summary");
            }
        }

        Ok(evaluation)
    }

    fn score(&self, truth: &[f64], prediction: &[f64], split: &str) -> SwResult<Vec<MetricScore>> {
        let mut scores = Vec::with_capacity(self.metrics.len());
        for (index, descriptor) in self.metrics.iter().enumerate() {
            match self.metric_registry.compute(descriptor, truth, prediction) {
                Ok(value) => scores.push(MetricScore {
                    metric: descriptor.name.clone(),
                    value,
                }),
                Err(error) if index == 0 => return Err(SwError::Metric(error)),
                Err(error) => {
                    warn!(metric = %descriptor.name, split, %error, "metric computation failed, recording as absent");
                }
            }
        }
        Ok(scores)
    }
}

fn target_column(data: &NamedValues, split: &str) -> SwResult<Vec<f64>> {
    data.get("outputs")
        .and_then(Value::as_column)
        .map(<[f64]>::to_vec)
        .ok_or_else(|| SwError::Validation(format!("{split} data has no outputs column")))
}

fn persist_summary(evaluation: &Evaluation, dir: &Path) -> SwResult<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", evaluation.fitted.id()));
    let body = serde_json::to_string_pretty(&evaluation.summary())?;
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use sw_primitives::builtin_registry;
    use sw_space::{StepChoice, TemplateNode};
    use sw_types::{ArgumentSource, OutputRef, Table};

    fn data(xs: Vec<f64>, ys: Vec<f64>) -> NamedValues {
        NamedValues::from([
            (
                "inputs".to_string(),
                Value::table(Table::new(vec!["x".into()], vec![xs]).unwrap()),
            ),
            ("outputs".to_string(), Value::column(ys)),
        ])
    }

    fn template() -> PipelineTemplate {
        PipelineTemplate::new()
            .node(TemplateNode::new("impute").arg("inputs", ArgumentSource::input("inputs")))
            .node(
                TemplateNode::new("model")
                    .arg("inputs", ArgumentSource::step("impute"))
                    .arg("outputs", ArgumentSource::input("outputs")),
            )
            .output(OutputRef::main("model"))
    }

    fn evaluator() -> PipelineEvaluator {
        PipelineEvaluator::new(
            template(),
            Arc::new(builtin_registry()),
            Arc::new(MetricRegistry::builtin()),
            vec![
                MetricDescriptor::new("mean_squared_error"),
                MetricDescriptor::new("mean_absolute_error"),
            ],
            data(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 2.0, 4.0, 6.0]),
            data(vec![1.0, 3.0], vec![2.0, 6.0]),
        )
        .unwrap()
    }

    fn knn_point() -> ConfigurationPoint {
        ConfigurationPoint::new(BTreeMap::from([
            ("impute".to_string(), StepChoice::new("impute.mean")),
            (
                "model".to_string(),
                StepChoice::new("model.knn_regressor")
                    .with_hyperparam("k", serde_json::json!(1)),
            ),
        ]))
    }

    #[test]
    fn evaluation_scores_train_and_test() {
        let caches = SearchCaches::new();
        let evaluation = evaluator().evaluate(&knn_point(), &caches).unwrap();

        // Test rows coincide with training rows, so 1-nn is exact.
        assert_eq!(evaluation.primary_value(), Some(0.0));
        assert_eq!(evaluation.training_metrics.len(), 2);
        assert_eq!(evaluation.test_metrics.len(), 2);
        assert!(evaluation.total_runtime >= 0.0);
    }

    #[test]
    fn evaluation_populates_the_step_cache() {
        let caches = SearchCaches::new();
        let evaluator = evaluator();
        evaluator.evaluate(&knn_point(), &caches).unwrap();
        let stores_after_first = caches.step.stats().stores;
        assert!(stores_after_first >= 2, "both steps should be cached");

        evaluator.evaluate(&knn_point(), &caches).unwrap();
        let stats = caches.step.stats();
        assert_eq!(stats.stores, stores_after_first, "second run must not re-train");
        assert!(stats.hits >= 2);
    }

    #[test]
    fn unknown_primitive_fails_the_candidate() {
        let caches = SearchCaches::new();
        let point = ConfigurationPoint::new(BTreeMap::from([
            ("impute".to_string(), StepChoice::new("impute.mean")),
            ("model".to_string(), StepChoice::new("model.gradient_boost")),
        ]));
        assert!(evaluator().evaluate(&point, &caches).is_err());
    }

    #[test]
    fn missing_metric_descriptors_are_rejected() {
        let result = PipelineEvaluator::new(
            template(),
            Arc::new(builtin_registry()),
            Arc::new(MetricRegistry::builtin()),
            Vec::new(),
            data(vec![0.0], vec![0.0]),
            data(vec![0.0], vec![0.0]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn artifact_summary_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let caches = SearchCaches::new();
        let evaluator = evaluator().with_output_directory(dir.path());
        let evaluation = evaluator.evaluate(&knn_point(), &caches).unwrap();

        let path = dir.path().join(format!("{}.json", evaluation.fitted.id()));
        let body = std::fs::read_to_string(path).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            summary["pipeline_id"],
            serde_json::json!(evaluation.fitted.id().to_string())
        );
        assert!(summary["test_metrics"].as_array().unwrap().len() == 2);
    }
}
