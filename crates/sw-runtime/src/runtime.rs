//! Two-phase pipeline execution.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use sw_metrics::MetricRegistry;
use sw_types::{
    ArgumentSource, CrossValidationScore, MetricDescriptor, NamedValues, Pipeline, PipelineError,
    SwError, SwResult, Value,
};

use crate::cache::{CachedStep, StepCache};
use crate::cross_validation::cross_validate;
use crate::fingerprint::step_fingerprint;
use crate::primitive::{StepPrimitive, StepRegistry};

/// Executes one pipeline: fit trains every step in dependency order with
/// step-level memoization, produce transforms new inputs through the
/// fitted state. A fitted `Runtime` is the artifact handed to downstream
/// consumers.
pub struct Runtime {
    pipeline: Pipeline,
    execution_order: Vec<usize>,
    produce_order: HashSet<usize>,
    fitted: Vec<Option<Arc<dyn StepPrimitive>>>,
    fit_outputs: Vec<Option<NamedValues>>,
    cross_validation: Vec<CrossValidationScore>,
    metric_descriptions: Vec<MetricDescriptor>,
    is_fitted: bool,
}

impl Runtime {
    /// Validate the pipeline DAG and compute its execution order.
    pub fn new(pipeline: Pipeline) -> SwResult<Self> {
        let n = pipeline.steps.len();

        let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, step) in pipeline.steps.iter().enumerate() {
            if index_of.insert(step.name.as_str(), i).is_some() {
                return Err(SwError::Validation(format!(
                    "duplicate step name: {}",
                    step.name
                )));
            }
        }

        // Dependency edges induced by argument sources.
        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, step) in pipeline.steps.iter().enumerate() {
            for source in step.arguments.values() {
                if let ArgumentSource::Step { step: source_step, .. } = source {
                    let &j = index_of.get(source_step.as_str()).ok_or_else(|| {
                        PipelineError::UnknownStep {
                            referenced: source_step.clone(),
                            by: step.name.clone(),
                        }
                    })?;
                    dependencies[i].push(j);
                }
            }
        }
        for output in &pipeline.outputs {
            if !index_of.contains_key(output.step.as_str()) {
                return Err(PipelineError::UnknownStep {
                    referenced: output.step.clone(),
                    by: "pipeline outputs".to_string(),
                }
                .into());
            }
        }

        let execution_order = topological_order(&dependencies)?;

        // Only steps backward-reachable from a declared output run during
        // produce; everything else is off the output path.
        let mut produce_order: HashSet<usize> = HashSet::new();
        let mut stack: Vec<usize> = pipeline
            .outputs
            .iter()
            .filter_map(|o| index_of.get(o.step.as_str()).copied())
            .collect();
        while let Some(i) = stack.pop() {
            if produce_order.insert(i) {
                stack.extend(dependencies[i].iter().copied());
            }
        }

        Ok(Self {
            pipeline,
            execution_order,
            produce_order,
            fitted: vec![None; n],
            fit_outputs: vec![None; n],
            cross_validation: Vec::new(),
            metric_descriptions: Vec::new(),
            is_fitted: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.pipeline.id
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// Metric descriptors forwarded to the cross-validation subroutine.
    pub fn set_metric_descriptions(&mut self, descriptors: Vec<MetricDescriptor>) {
        self.metric_descriptions = descriptors;
    }

    /// Cross-validation scores gathered during the last fit, empty when no
    /// step requested cross-validation or every fold failed.
    pub fn cross_validation(&self) -> &[CrossValidationScore] {
        &self.cross_validation
    }

    /// Training-phase output of a step, available after `fit`.
    pub fn fit_output(&self, step: &str, output: &str) -> Option<&Value> {
        let index = self.pipeline.step_index(step)?;
        self.fit_outputs[index].as_ref()?.get(output)
    }

    /// Train every step in dependency order.
    ///
    /// Each step's fingerprint is looked up in the shared cache first; a
    /// hit reuses the stored outputs and fitted state without recomputation,
    /// so identical (primitive, configuration, input) triples train at most
    /// once per cache lifetime.
    pub fn fit(
        &mut self,
        inputs: &NamedValues,
        cache: &StepCache,
        registry: &StepRegistry,
        metric_registry: &MetricRegistry,
    ) -> SwResult<()> {
        let n = self.pipeline.steps.len();
        self.fitted = vec![None; n];
        self.fit_outputs = vec![None; n];
        self.cross_validation.clear();
        self.is_fitted = false;

        for position in 0..self.execution_order.len() {
            let index = self.execution_order[position];
            let node = self.pipeline.steps[index].clone();
            let arguments = self.resolve_fit_arguments(index, inputs)?;
            let fingerprint = step_fingerprint(&node, &arguments);

            if let Some(hit) = cache.lookup(&fingerprint) {
                debug!(step = %node.name, fingerprint = %fingerprint, "step cache hit");
                if !hit.cross_validation.is_empty() {
                    self.cross_validation = hit.cross_validation.clone();
                }
                self.fitted[index] = Some(hit.state);
                self.fit_outputs[index] = Some(hit.outputs);
                continue;
            }
            debug!(step = %node.name, fingerprint = %fingerprint, "step cache miss");

            let mut primitive = registry.create(&node.primitive, &node.hyperparams)?;

            let step_cv = match &node.cross_validation {
                Some(spec) => cross_validate(
                    registry,
                    &node,
                    &arguments,
                    &self.metric_descriptions,
                    metric_registry,
                    spec,
                ),
                None => Vec::new(),
            };
            if !step_cv.is_empty() {
                self.cross_validation = step_cv.clone();
            }

            primitive
                .fit(&arguments)
                .map_err(|e| step_execution(&node.name, e))?;
            let outputs = primitive
                .apply(&arguments)
                .map_err(|e| step_execution(&node.name, e))?;

            let state: Arc<dyn StepPrimitive> = Arc::from(primitive);
            if state.cacheable() {
                cache.insert(
                    fingerprint,
                    CachedStep {
                        outputs: outputs.clone(),
                        state: Arc::clone(&state),
                        cross_validation: step_cv,
                    },
                );
                debug!(step = %node.name, fingerprint = %fingerprint, "step cache push");
            } else {
                debug!(
                    step = %node.name,
                    "fitted state not shareable, proceeding uncached"
                );
            }

            self.fitted[index] = Some(state);
            self.fit_outputs[index] = Some(outputs);
        }

        self.is_fitted = true;
        Ok(())
    }

    /// Transform new inputs through the fitted pipeline, executing only
    /// steps on a declared output path, and return the declared outputs in
    /// order.
    pub fn produce(&self, inputs: &NamedValues) -> SwResult<Vec<Value>> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted.into());
        }

        let n = self.pipeline.steps.len();
        let mut step_outputs: Vec<Option<NamedValues>> = vec![None; n];

        for &index in &self.execution_order {
            if !self.produce_order.contains(&index) {
                continue;
            }
            let node = &self.pipeline.steps[index];

            let mut arguments = NamedValues::new();
            for (argument, source) in &node.arguments {
                match source {
                    ArgumentSource::Input { slot } => {
                        // Slots absent at produce time (e.g. the training
                        // target) are simply not bound.
                        if let Some(value) = inputs.get(slot) {
                            arguments.insert(argument.clone(), value.clone());
                        }
                    }
                    ArgumentSource::Step { step, output } => {
                        let value = self
                            .pipeline
                            .step_index(step)
                            .and_then(|i| step_outputs[i].as_ref())
                            .and_then(|outputs| outputs.get(output))
                            .ok_or_else(|| PipelineError::MissingOutput {
                                step: step.clone(),
                                output: output.clone(),
                            })?;
                        arguments.insert(argument.clone(), value.clone());
                    }
                }
            }

            let state = self.fitted[index]
                .as_ref()
                .ok_or(PipelineError::NotFitted)?;
            let outputs = state
                .apply(&arguments)
                .map_err(|e| step_execution(&node.name, e))?;
            step_outputs[index] = Some(outputs);
        }

        let mut result = Vec::with_capacity(self.pipeline.outputs.len());
        for output in &self.pipeline.outputs {
            let value = self
                .pipeline
                .step_index(&output.step)
                .and_then(|i| step_outputs[i].as_ref())
                .and_then(|outputs| outputs.get(&output.output))
                .ok_or_else(|| PipelineError::MissingOutput {
                    step: output.step.clone(),
                    output: output.output.clone(),
                })?;
            result.push(value.clone());
        }
        Ok(result)
    }

    /// Gather a step's fit-phase arguments from external inputs and
    /// upstream outputs. The execution order guarantees upstream steps have
    /// already run.
    fn resolve_fit_arguments(&self, index: usize, inputs: &NamedValues) -> SwResult<NamedValues> {
        let node = &self.pipeline.steps[index];
        let mut arguments = NamedValues::new();
        for (argument, source) in &node.arguments {
            match source {
                ArgumentSource::Input { slot } => {
                    let value = inputs
                        .get(slot)
                        .ok_or_else(|| PipelineError::MissingInput {
                            step: node.name.clone(),
                            slot: slot.clone(),
                        })?;
                    arguments.insert(argument.clone(), value.clone());
                }
                ArgumentSource::Step { step, output } => {
                    let value = self
                        .pipeline
                        .step_index(step)
                        .and_then(|i| self.fit_outputs[i].as_ref())
                        .and_then(|outputs| outputs.get(output))
                        .ok_or_else(|| PipelineError::MissingOutput {
                            step: step.clone(),
                            output: output.clone(),
                        })?;
                    arguments.insert(argument.clone(), value.clone());
                }
            }
        }
        Ok(arguments)
    }
}

fn step_execution(step: &str, error: SwError) -> SwError {
    PipelineError::StepExecution {
        step: step.to_string(),
        message: error.to_string(),
    }
    .into()
}

/// Kahn's algorithm; ready steps are taken in declaration order so the
/// result is deterministic.
fn topological_order(dependencies: &[Vec<usize>]) -> SwResult<Vec<usize>> {
    let n = dependencies.len();
    let mut indegree: Vec<usize> = dependencies.iter().map(|d| d.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, deps) in dependencies.iter().enumerate() {
        for &j in deps {
            dependents[j].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != n {
        return Err(PipelineError::CyclicPipeline.into());
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{require_column, PrimitiveInfo};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::Value as JsonValue;
    use sw_types::{OutputRef, StepNode, MAIN_OUTPUT};

    /// Adds a configured offset to a column; counts fit and apply calls so
    /// tests can observe memoization.
    struct Offset {
        offset: f64,
        fits: Arc<AtomicUsize>,
        applies: Arc<AtomicUsize>,
        shareable: bool,
    }

    impl StepPrimitive for Offset {
        fn name(&self) -> &str {
            "test.offset"
        }
        fn configure(&mut self, hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()> {
            if let Some(offset) = hyperparams.get("offset").and_then(|v| v.as_f64()) {
                self.offset = offset;
            }
            Ok(())
        }
        fn fit(&mut self, _inputs: &NamedValues) -> SwResult<()> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            let column = require_column(inputs, "inputs", self.name())?;
            let shifted: Vec<f64> = column.iter().map(|v| v + self.offset).collect();
            Ok(NamedValues::from([(
                MAIN_OUTPUT.to_string(),
                Value::column(shifted),
            )]))
        }
        fn cacheable(&self) -> bool {
            self.shareable
        }
    }

    struct Counters {
        fits: Arc<AtomicUsize>,
        applies: Arc<AtomicUsize>,
    }

    fn registry_with_counters(shareable: bool) -> (StepRegistry, Counters) {
        let fits = Arc::new(AtomicUsize::new(0));
        let applies = Arc::new(AtomicUsize::new(0));
        let counters = Counters {
            fits: Arc::clone(&fits),
            applies: Arc::clone(&applies),
        };
        let mut registry = StepRegistry::new();
        registry.register(
            PrimitiveInfo::new("test.offset").default_param("offset", serde_json::json!(1.0)),
            move || {
                Box::new(Offset {
                    offset: 1.0,
                    fits: Arc::clone(&fits),
                    applies: Arc::clone(&applies),
                    shareable,
                })
            },
        );
        (registry, counters)
    }

    fn step(name: &str, source: ArgumentSource, offset: f64) -> StepNode {
        StepNode {
            name: name.into(),
            primitive: "test.offset".into(),
            hyperparams: BTreeMap::from([("offset".to_string(), serde_json::json!(offset))]),
            arguments: BTreeMap::from([("inputs".to_string(), source)]),
            cross_validation: None,
        }
    }

    fn column_inputs(values: Vec<f64>) -> NamedValues {
        NamedValues::from([("inputs".to_string(), Value::column(values))])
    }

    #[test]
    fn execution_order_respects_dependencies() {
        // Steps declared in reverse dependency order on purpose.
        let pipeline = Pipeline::new(
            vec![
                step("c", ArgumentSource::step("b"), 1.0),
                step("b", ArgumentSource::step("a"), 1.0),
                step("a", ArgumentSource::input("inputs"), 1.0),
            ],
            vec![OutputRef::main("c")],
        );
        let runtime = Runtime::new(pipeline).unwrap();
        let order = runtime.execution_order();
        let position = |name: &str| {
            let index = runtime.pipeline().step_index(name).unwrap();
            order.iter().position(|&i| i == index).unwrap()
        };
        assert!(position("a") < position("b"));
        assert!(position("b") < position("c"));
    }

    #[test]
    fn cyclic_pipeline_is_rejected() {
        let pipeline = Pipeline::new(
            vec![
                step("a", ArgumentSource::step("b"), 1.0),
                step("b", ArgumentSource::step("a"), 1.0),
            ],
            vec![OutputRef::main("b")],
        );
        match Runtime::new(pipeline) {
            Err(SwError::Pipeline(PipelineError::CyclicPipeline)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("cycle was not detected"),
        }
    }

    #[test]
    fn unknown_step_reference_is_rejected() {
        let pipeline = Pipeline::new(
            vec![step("a", ArgumentSource::step("ghost"), 1.0)],
            vec![OutputRef::main("a")],
        );
        assert!(Runtime::new(pipeline).is_err());
    }

    #[test]
    fn fit_then_produce_transforms_inputs() {
        let (registry, _) = registry_with_counters(true);
        let metric_registry = MetricRegistry::builtin();
        let cache = StepCache::new();
        let pipeline = Pipeline::new(
            vec![
                step("a", ArgumentSource::input("inputs"), 1.0),
                step("b", ArgumentSource::step("a"), 10.0),
            ],
            vec![OutputRef::main("b")],
        );
        let mut runtime = Runtime::new(pipeline).unwrap();
        runtime
            .fit(&column_inputs(vec![0.0, 1.0]), &cache, &registry, &metric_registry)
            .unwrap();

        let outputs = runtime.produce(&column_inputs(vec![5.0])).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].as_column(), Some(&[16.0][..]));

        // Training-phase output of the final step.
        let fit_out = runtime.fit_output("b", MAIN_OUTPUT).unwrap();
        assert_eq!(fit_out.as_column(), Some(&[11.0, 12.0][..]));
    }

    #[test]
    fn second_fit_hits_the_cache() {
        let (registry, counters) = registry_with_counters(true);
        let metric_registry = MetricRegistry::builtin();
        let cache = StepCache::new();
        let make_pipeline = || {
            Pipeline::new(
                vec![step("a", ArgumentSource::input("inputs"), 2.0)],
                vec![OutputRef::main("a")],
            )
        };
        let inputs = column_inputs(vec![1.0, 2.0, 3.0]);

        let mut first = Runtime::new(make_pipeline()).unwrap();
        first.fit(&inputs, &cache, &registry, &metric_registry).unwrap();
        assert_eq!(counters.fits.load(Ordering::SeqCst), 1);

        let mut second = Runtime::new(make_pipeline()).unwrap();
        second.fit(&inputs, &cache, &registry, &metric_registry).unwrap();
        assert_eq!(counters.fits.load(Ordering::SeqCst), 1, "second fit must reuse the cache");
        assert_eq!(cache.stats().hits, 1);

        assert_eq!(
            first.fit_output("a", MAIN_OUTPUT),
            second.fit_output("a", MAIN_OUTPUT)
        );
    }

    #[test]
    fn changed_training_data_forces_refit() {
        let (registry, counters) = registry_with_counters(true);
        let metric_registry = MetricRegistry::builtin();
        let cache = StepCache::new();
        let make_pipeline = || {
            Pipeline::new(
                vec![step("a", ArgumentSource::input("inputs"), 2.0)],
                vec![OutputRef::main("a")],
            )
        };

        let mut first = Runtime::new(make_pipeline()).unwrap();
        first
            .fit(&column_inputs(vec![1.0, 2.0]), &cache, &registry, &metric_registry)
            .unwrap();
        let mut second = Runtime::new(make_pipeline()).unwrap();
        second
            .fit(&column_inputs(vec![1.0, 2.0, 3.0]), &cache, &registry, &metric_registry)
            .unwrap();

        assert_eq!(counters.fits.load(Ordering::SeqCst), 2, "different input digest must miss");
    }

    #[test]
    fn non_cacheable_primitive_is_never_inserted() {
        let (registry, counters) = registry_with_counters(false);
        let metric_registry = MetricRegistry::builtin();
        let cache = StepCache::new();
        let make_pipeline = || {
            Pipeline::new(
                vec![step("a", ArgumentSource::input("inputs"), 2.0)],
                vec![OutputRef::main("a")],
            )
        };
        let inputs = column_inputs(vec![1.0]);

        let mut first = Runtime::new(make_pipeline()).unwrap();
        first.fit(&inputs, &cache, &registry, &metric_registry).unwrap();
        assert!(cache.is_empty());

        let mut second = Runtime::new(make_pipeline()).unwrap();
        second.fit(&inputs, &cache, &registry, &metric_registry).unwrap();
        assert_eq!(counters.fits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn produce_skips_steps_off_the_output_path() {
        let (registry, counters) = registry_with_counters(true);
        let metric_registry = MetricRegistry::builtin();
        let cache = StepCache::new();
        // "side" hangs off the input but feeds no declared output.
        let pipeline = Pipeline::new(
            vec![
                step("main", ArgumentSource::input("inputs"), 1.0),
                step("side", ArgumentSource::input("inputs"), 5.0),
            ],
            vec![OutputRef::main("main")],
        );
        let mut runtime = Runtime::new(pipeline).unwrap();
        runtime
            .fit(&column_inputs(vec![1.0]), &cache, &registry, &metric_registry)
            .unwrap();
        let applies_after_fit = counters.applies.load(Ordering::SeqCst);
        assert_eq!(applies_after_fit, 2, "fit applies every step once");

        runtime.produce(&column_inputs(vec![2.0])).unwrap();
        assert_eq!(
            counters.applies.load(Ordering::SeqCst),
            applies_after_fit + 1,
            "produce must only run the output path"
        );
    }

    #[test]
    fn missing_external_input_fails_fit() {
        let (registry, _) = registry_with_counters(true);
        let metric_registry = MetricRegistry::builtin();
        let cache = StepCache::new();
        let pipeline = Pipeline::new(
            vec![step("a", ArgumentSource::input("inputs"), 1.0)],
            vec![OutputRef::main("a")],
        );
        let mut runtime = Runtime::new(pipeline).unwrap();
        let err = runtime
            .fit(&NamedValues::new(), &cache, &registry, &metric_registry)
            .unwrap_err();
        assert!(err.to_string().contains("inputs"));
    }

    #[test]
    fn produce_before_fit_is_rejected() {
        let pipeline = Pipeline::new(
            vec![step("a", ArgumentSource::input("inputs"), 1.0)],
            vec![OutputRef::main("a")],
        );
        let runtime = Runtime::new(pipeline).unwrap();
        assert!(runtime.produce(&column_inputs(vec![1.0])).is_err());
    }
}
