//! Pipeline templates: the fixed DAG skeleton whose positions the search
//! fills with step choices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sw_types::{
    ArgumentSource, CrossValidationSpec, OutputRef, Pipeline, SpaceError, StepNode, SwResult,
};

use crate::point::ConfigurationPoint;

/// One template position. Its name doubles as the dimension name in the
/// configuration space; its argument bindings are fixed by the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub name: String,
    pub arguments: BTreeMap<String, ArgumentSource>,
    pub cross_validation: Option<CrossValidationSpec>,
}

impl TemplateNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
            cross_validation: None,
        }
    }

    pub fn arg(mut self, name: impl Into<String>, source: ArgumentSource) -> Self {
        self.arguments.insert(name.into(), source);
        self
    }

    pub fn with_cross_validation(mut self, spec: CrossValidationSpec) -> Self {
        self.cross_validation = Some(spec);
        self
    }
}

/// An ordered list of template nodes plus the declared pipeline outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    nodes: Vec<TemplateNode>,
    outputs: Vec<OutputRef>,
}

impl PipelineTemplate {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn node(mut self, node: TemplateNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn output(mut self, output: OutputRef) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// Node names, in order. This is the dimension ordering the search
    /// sweeps.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn outputs(&self) -> &[OutputRef] {
        &self.outputs
    }

    /// The step whose output is the pipeline's primary result (first
    /// declared output); predictions for metric computation come from here.
    pub fn output_step(&self) -> Option<&OutputRef> {
        self.outputs.first()
    }

    /// Substitute the point's choice into every template position,
    /// producing an executable pipeline description.
    pub fn instantiate(&self, point: &ConfigurationPoint) -> SwResult<Pipeline> {
        let mut steps = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let choice = point
                .get(&node.name)
                .ok_or_else(|| SpaceError::IncompleteAssignment {
                    dimension: node.name.clone(),
                })?;
            steps.push(StepNode {
                name: node.name.clone(),
                primitive: choice.primitive.clone(),
                hyperparams: choice.hyperparams.clone(),
                arguments: node.arguments.clone(),
                cross_validation: node.cross_validation,
            });
        }
        Ok(Pipeline::new(steps, self.outputs.clone()))
    }
}

impl Default for PipelineTemplate {
    fn default() -> Self {
        Self::new()
    }
}
