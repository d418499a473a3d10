//! The step capability interface and the primitive registry.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as JsonValue;

use sw_types::{NamedValues, PipelineError, SwResult, Table};

/// The capability interface every step variant implements. The executor
/// depends only on this trait, never on concrete step types.
///
/// `fit` trains the step on its named inputs; `apply` transforms named
/// inputs into named outputs using the fitted state and must not retrain.
pub trait StepPrimitive: Send + Sync {
    /// Primitive identity, as registered in the catalog.
    fn name(&self) -> &str;

    /// Apply a hyperparameter assignment. Called once, before `fit`.
    fn configure(&mut self, hyperparams: &BTreeMap<String, JsonValue>) -> SwResult<()>;

    fn fit(&mut self, inputs: &NamedValues) -> SwResult<()>;

    fn apply(&self, inputs: &NamedValues) -> SwResult<NamedValues>;

    /// Whether fitted state may be shared through the step cache. A
    /// primitive holding non-shareable resources opts out; the executor
    /// then proceeds uncached for it.
    fn cacheable(&self) -> bool {
        true
    }
}

/// Catalog record for one primitive: capability tags plus its default
/// hyperparameter configuration. Consumed read-only when building a
/// configuration space.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub defaults: BTreeMap<String, JsonValue>,
}

impl PrimitiveInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn default_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }
}

type FactoryFn = Box<dyn Fn() -> Box<dyn StepPrimitive> + Send + Sync>;

struct RegistryEntry {
    info: PrimitiveInfo,
    factory: FactoryFn,
}

/// Maps primitive identities to factories and catalog metadata. Shared
/// read-only across the search and all workers.
pub struct StepRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, info: PrimitiveInfo, factory: F)
    where
        F: Fn() -> Box<dyn StepPrimitive> + Send + Sync + 'static,
    {
        self.entries.insert(
            info.name.clone(),
            RegistryEntry {
                info,
                factory: Box::new(factory),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn info(&self, name: &str) -> Option<&PrimitiveInfo> {
        self.entries.get(name).map(|e| &e.info)
    }

    /// Catalog enumeration, for configuration-space construction.
    pub fn infos(&self) -> impl Iterator<Item = &PrimitiveInfo> {
        self.entries.values().map(|e| &e.info)
    }

    /// Instantiate and configure a primitive. Registered defaults are
    /// merged under the given hyperparameters.
    pub fn create(
        &self,
        name: &str,
        hyperparams: &BTreeMap<String, JsonValue>,
    ) -> SwResult<Box<dyn StepPrimitive>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| PipelineError::UnknownPrimitive {
                name: name.to_string(),
            })?;
        let mut merged = entry.info.defaults.clone();
        for (key, value) in hyperparams {
            merged.insert(key.clone(), value.clone());
        }
        let mut primitive = (entry.factory)();
        primitive.configure(&merged)?;
        Ok(primitive)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// --- argument and hyperparameter accessors shared by step implementations ---

pub fn require_table<'a>(inputs: &'a NamedValues, argument: &str, who: &str) -> SwResult<&'a Table> {
    let value = inputs
        .get(argument)
        .ok_or_else(|| PipelineError::MissingArgument {
            step: who.to_string(),
            argument: argument.to_string(),
        })?;
    value.as_table().ok_or_else(|| {
        PipelineError::StepExecution {
            step: who.to_string(),
            message: format!("argument {argument} is not a table"),
        }
        .into()
    })
}

pub fn require_column<'a>(
    inputs: &'a NamedValues,
    argument: &str,
    who: &str,
) -> SwResult<&'a [f64]> {
    let value = inputs
        .get(argument)
        .ok_or_else(|| PipelineError::MissingArgument {
            step: who.to_string(),
            argument: argument.to_string(),
        })?;
    value.as_column().ok_or_else(|| {
        PipelineError::StepExecution {
            step: who.to_string(),
            message: format!("argument {argument} is not a column"),
        }
        .into()
    })
}

pub fn param_f64(params: &BTreeMap<String, JsonValue>, key: &str) -> Option<f64> {
    params.get(key).and_then(|v| v.as_f64())
}

pub fn param_usize(params: &BTreeMap<String, JsonValue>, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}

pub fn param_bool(params: &BTreeMap<String, JsonValue>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}
