//! Runtime validation: which template paths did not exist in the final store.
//!
//! Static validation cannot know the shape of a third-party response. After a
//! run, every template in the IR is re-resolved against the store the run
//! actually produced. Each miss is reported with the fields that do exist at
//! the deepest resolvable prefix, so a planner regenerating the workflow can
//! turn `${api.response.username}` into `${api.response.login}`.

use pathflow_types::{NodeSpec, WorkflowIr};
use serde::Serialize;
use serde_json::Value;

use crate::{
    executor::ITEM_INDEX_KEY,
    field_paths::{available_fields, closest_match, nested_scalar_leaf_candidates_from_json},
    resolve::{deepest_resolvable_prefix, resolve_path},
    store::{StoreAccess, is_bookkeeping_key},
    templates::{PathSegment, TemplatePath, collect_templates_from_value, expression_paths},
    workflow::nested::is_child_scoped_param,
};

/// A template path that did not resolve against the final store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTemplatePath {
    /// Template as written, normalized to `${...}`.
    pub template: String,
    /// Node whose params or batch config contain the template; `None` for outputs.
    pub node_id: Option<String>,
    /// Location inside the IR (`nodes[1].params.prompt`, `outputs.result.source`).
    pub param_path: String,
    /// Deepest prefix that resolved; empty when even the root key is absent.
    pub resolved_path: String,
    /// First segment that failed to resolve.
    pub missing_segment: String,
    /// Fields present at `resolved_path` (sorted keys or `[i]` indices).
    pub available_fields: Vec<String>,
    /// Replacement path, when a close match exists.
    pub suggestion: Option<String>,
}

impl MissingTemplatePath {
    /// One-line description suitable for a repair prompt.
    pub fn message(&self) -> String {
        let location = if self.resolved_path.is_empty() {
            format!("'{}' does not exist in the store", self.missing_segment)
        } else {
            format!("'{}' does not exist under '{}'", self.missing_segment, self.resolved_path)
        };
        let available = if self.available_fields.is_empty() {
            "nothing".to_string()
        } else {
            self.available_fields.join(", ")
        };
        let mut message = format!("{} ({}): {location}; available: {available}", self.template, self.param_path);
        if let Some(suggestion) = &self.suggestion {
            message.push_str(&format!("; did you mean '${{{suggestion}}}'?"));
        }
        message
    }
}

/// Re-resolves every template in node params, batch items and output sources
/// against `store` and reports the ones that are missing.
///
/// Params holding a child workflow are skipped, as are templates rooted at a
/// batch node's item alias or `__index__` (those only exist while the item runs).
pub fn find_missing_paths(ir: &WorkflowIr, store: &dyn StoreAccess) -> Vec<MissingTemplatePath> {
    let mut missing = Vec::new();

    for (index, node) in ir.nodes.iter().enumerate() {
        let mut occurrences = Vec::new();
        for (key, value) in &node.params {
            if !is_child_scoped_param(node, key) {
                collect_templates_from_value(value, &format!("nodes[{index}].params.{key}"), &mut occurrences);
            }
        }
        for occurrence in occurrences {
            let Ok(path) = TemplatePath::parse(&occurrence.expression) else {
                continue;
            };
            if is_item_bound(node, &path) {
                continue;
            }
            if let Some(entry) = check_path(&path, store, Some(&node.id), &occurrence.source_path) {
                missing.push(entry);
            }
        }

        if let Some(batch) = &node.batch {
            for path in expression_paths(&batch.items) {
                if let Some(entry) = check_path(&path, store, Some(&node.id), &format!("nodes[{index}].batch.items")) {
                    missing.push(entry);
                }
            }
        }
    }

    for (name, output) in &ir.outputs {
        let Some(source) = output.source.as_deref() else {
            continue;
        };
        for path in expression_paths(source) {
            if let Some(entry) = check_path(&path, store, None, &format!("outputs.{name}.source")) {
                missing.push(entry);
            }
        }
    }

    missing
}

fn is_item_bound(node: &NodeSpec, path: &TemplatePath) -> bool {
    node.batch
        .as_ref()
        .is_some_and(|batch| path.root == batch.alias || path.root == ITEM_INDEX_KEY)
}

fn check_path(path: &TemplatePath, store: &dyn StoreAccess, node_id: Option<&str>, param_path: &str) -> Option<MissingTemplatePath> {
    if resolve_path(path, store).is_some() {
        return None;
    }

    let (resolved_path, missing_segment, available, deepest) = match deepest_resolvable_prefix(path, store) {
        None => {
            let mut root_keys: Vec<String> = store.keys().into_iter().filter(|key| !is_bookkeeping_key(key)).collect();
            root_keys.sort();
            (String::new(), path.root.clone(), root_keys, None)
        }
        Some((segment_count, value)) => {
            let value = decode_string_value(value);
            let missing_segment = match path.segments.get(segment_count) {
                Some(PathSegment::Field(name)) => name.clone(),
                Some(PathSegment::Index(position)) => format!("[{position}]"),
                None => path.to_string(),
            };
            (path.prefix(segment_count).to_string(), missing_segment, available_fields(&value), Some(value))
        }
    };

    let suggestion = suggest(&resolved_path, &missing_segment, &available, deepest.as_ref());
    Some(MissingTemplatePath {
        template: format!("${{{path}}}"),
        node_id: node_id.map(str::to_string),
        param_path: param_path.to_string(),
        resolved_path,
        missing_segment,
        available_fields: available,
        suggestion,
    })
}

/// Strings holding JSON are listed by their decoded fields.
fn decode_string_value(value: Value) -> Value {
    if let Value::String(text) = &value
        && let Ok(decoded) = serde_json::from_str::<Value>(text)
        && (decoded.is_object() || decoded.is_array())
    {
        return decoded;
    }
    value
}

fn suggest(resolved_path: &str, missing_segment: &str, available: &[String], deepest: Option<&Value>) -> Option<String> {
    let join = |field: &str| {
        if resolved_path.is_empty() {
            field.to_string()
        } else {
            format!("{resolved_path}.{field}")
        }
    };
    if let Some(close) = closest_match(missing_segment, available.iter().map(String::as_str)) {
        return Some(join(close));
    }
    let deepest = deepest?;
    nested_scalar_leaf_candidates_from_json(deepest, missing_segment)
        .into_iter()
        .next()
        .map(|(candidate_path, _)| join(&candidate_path))
}
