//! ComfyUI workflow template and per-request job descriptor rendering.
//!
//! The template is loaded once at startup and never mutated afterwards.
//! Each request calls [`WorkflowTemplate::render`] to obtain its own
//! descriptor with the prompt texts and seed written into the configured
//! nodes, so concurrent requests can never observe each other's overrides.

use std::path::Path;

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Negative prompt used when the caller does not supply one.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "text, watermark";

/// Seed value meaning "pick a random seed for me".
pub const RANDOM_SEED: i64 = -1;

/// Exclusive upper bound for randomly chosen seeds.
pub const RANDOM_SEED_MAX: i64 = 1_000_000;

/// Input field holding prompt text on a text-encoder node.
pub const TEXT_FIELD: &str = "text";

/// Input field holding the seed on a sampler node.
pub const SEED_FIELD: &str = "seed";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Node ids inside the workflow that receive the per-request overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTargets {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: String,
}

impl Default for NodeTargets {
    fn default() -> Self {
        Self {
            positive_prompt: "6".to_string(),
            negative_prompt: "7".to_string(),
            seed: "3".to_string(),
        }
    }
}

/// Values written into a rendered job descriptor.
///
/// `seed` is expected to be resolved already (see [`resolve_seed`]).
#[derive(Debug, Clone)]
pub struct PromptOverrides {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
}

/// A validated, immutable ComfyUI workflow in API format
/// (`{"<node_id>": {"class_type": ..., "inputs": {...}}, ...}`).
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    root: Value,
    targets: NodeTargets,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl WorkflowTemplate {
    /// Read and validate a workflow file.
    ///
    /// Fails when the file is missing, is not valid JSON, or lacks any of
    /// the configured target nodes.
    pub fn load(path: impl AsRef<Path>, targets: &NodeTargets) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CoreError::Template(format!(
                "Workflow file not found: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Template(format!("Cannot read workflow file {}: {e}", path.display()))
        })?;

        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Template(format!(
                "Workflow file is not valid JSON: {}: {e}",
                path.display()
            ))
        })?;

        Self::from_value(value, targets)
    }

    /// Wrap an already parsed workflow, checking that every target node
    /// carries the field it will receive.
    pub fn from_value(root: Value, targets: &NodeTargets) -> Result<Self, CoreError> {
        if !root.is_object() {
            return Err(CoreError::Template(
                "Workflow root must be a JSON object keyed by node id".to_string(),
            ));
        }

        let checks = [
            (&targets.positive_prompt, TEXT_FIELD),
            (&targets.negative_prompt, TEXT_FIELD),
            (&targets.seed, SEED_FIELD),
        ];
        for (node_id, field) in checks {
            let inputs = node_inputs(&root, node_id)?;
            if !inputs.contains_key(field) {
                return Err(CoreError::TemplateFieldMissing {
                    node_id: node_id.clone(),
                    field,
                });
            }
        }

        Ok(Self {
            root,
            targets: targets.clone(),
        })
    }

    /// The untouched template.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Produce a fresh job descriptor with the overrides applied.
    ///
    /// The template itself is left untouched.
    pub fn render(&self, overrides: &PromptOverrides) -> Result<Value, CoreError> {
        let mut descriptor = self.root.clone();

        set_input(
            &mut descriptor,
            &self.targets.positive_prompt,
            TEXT_FIELD,
            Value::from(overrides.positive_prompt.as_str()),
        )?;
        set_input(
            &mut descriptor,
            &self.targets.negative_prompt,
            TEXT_FIELD,
            Value::from(overrides.negative_prompt.as_str()),
        )?;
        set_input(
            &mut descriptor,
            &self.targets.seed,
            SEED_FIELD,
            Value::from(overrides.seed),
        )?;

        Ok(descriptor)
    }
}

// ---------------------------------------------------------------------------
// Seed resolution
// ---------------------------------------------------------------------------

/// Replace [`RANDOM_SEED`] with a random value in `[0, RANDOM_SEED_MAX)`.
///
/// Every other value, negative ones included, is returned unchanged.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed == RANDOM_SEED {
        rand::rng().random_range(0..RANDOM_SEED_MAX)
    } else {
        seed
    }
}

// ---------------------------------------------------------------------------
// Typed accessors
// ---------------------------------------------------------------------------

fn node_inputs<'a>(root: &'a Value, node_id: &str) -> Result<&'a Map<String, Value>, CoreError> {
    let node = root
        .get(node_id)
        .ok_or_else(|| CoreError::TemplateNodeMissing {
            node_id: node_id.to_string(),
        })?;

    node.get("inputs")
        .and_then(Value::as_object)
        .ok_or_else(|| CoreError::Template(format!("Workflow node '{node_id}' has no inputs object")))
}

fn node_inputs_mut<'a>(
    root: &'a mut Value,
    node_id: &str,
) -> Result<&'a mut Map<String, Value>, CoreError> {
    let node = root
        .get_mut(node_id)
        .ok_or_else(|| CoreError::TemplateNodeMissing {
            node_id: node_id.to_string(),
        })?;

    node.get_mut("inputs")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| CoreError::Template(format!("Workflow node '{node_id}' has no inputs object")))
}

fn set_input(
    root: &mut Value,
    node_id: &str,
    field: &'static str,
    value: Value,
) -> Result<(), CoreError> {
    let inputs = node_inputs_mut(root, node_id)?;
    let slot = inputs
        .get_mut(field)
        .ok_or_else(|| CoreError::TemplateFieldMissing {
            node_id: node_id.to_string(),
            field,
        })?;
    *slot = value;
    Ok(())
}
