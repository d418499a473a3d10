//! Pipeline descriptions: a DAG of configured steps with named data bindings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Conventional name of a step's main output.
pub const MAIN_OUTPUT: &str = "produce";

/// Where a step argument's data comes from: an external input slot of the
/// pipeline, or a named output of another step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgumentSource {
    Input { slot: String },
    Step { step: String, output: String },
}

impl ArgumentSource {
    pub fn input(slot: impl Into<String>) -> Self {
        ArgumentSource::Input { slot: slot.into() }
    }

    /// The main output of another step.
    pub fn step(step: impl Into<String>) -> Self {
        ArgumentSource::Step {
            step: step.into(),
            output: MAIN_OUTPUT.to_string(),
        }
    }
}

/// Per-step cross-validation request, attached by the pipeline template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossValidationSpec {
    pub folds: usize,
    pub stratified: bool,
}

impl Default for CrossValidationSpec {
    fn default() -> Self {
        Self {
            folds: 10,
            stratified: false,
        }
    }
}

/// One configured step in a concrete pipeline. Immutable once part of a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    /// Node name, unique within the pipeline.
    pub name: String,
    /// Primitive identity, resolved via the step registry.
    pub primitive: String,
    /// Named hyperparameter values.
    pub hyperparams: BTreeMap<String, JsonValue>,
    /// Argument name → data source bindings.
    pub arguments: BTreeMap<String, ArgumentSource>,
    /// When set, the executor runs the cross-validation subroutine for
    /// this step at fit time.
    pub cross_validation: Option<CrossValidationSpec>,
}

/// Reference to a step output that forms part of the pipeline's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRef {
    pub step: String,
    pub output: String,
}

impl OutputRef {
    pub fn main(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            output: MAIN_OUTPUT.to_string(),
        }
    }
}

/// A fully specified pipeline: a DAG of steps plus declared outputs.
///
/// The dependency graph induced by argument sources must be acyclic; the
/// executor validates this when computing the execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub steps: Vec<StepNode>,
    pub outputs: Vec<OutputRef>,
}

impl Pipeline {
    pub fn new(steps: Vec<StepNode>, outputs: Vec<OutputRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            steps,
            outputs,
        }
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    pub fn step(&self, name: &str) -> Option<&StepNode> {
        self.steps.iter().find(|s| s.name == name)
    }
}
