//! Execution tracking: checkpoint, cache hits, repaired nodes, warnings.
//!
//! All state lives under bookkeeping keys in the shared store, so it stays at
//! the root no matter which store view records it and survives being handed
//! back to a later run for resumption.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use crate::{
    error::WorkflowExecutionError,
    runtime_validation::MissingTemplatePath,
    store::{CACHE_HITS_KEY, EXECUTION_KEY, MODIFIED_NODES_KEY, StoreAccess, WARNINGS_KEY},
};
use pathflow_types::DEFAULT_ACTION;

/// Record of which nodes completed or failed during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Node ids in completion order.
    #[serde(default)]
    pub completed_nodes: Vec<String>,
    /// Action each completed node returned.
    #[serde(default)]
    pub node_actions: IndexMap<String, String>,
    /// Configuration hash of each completed node.
    #[serde(default)]
    pub node_hashes: IndexMap<String, String>,
    #[serde(default)]
    pub failed_node: Option<String>,
}

impl Checkpoint {
    pub fn is_completed(&self, node_id: &str) -> bool {
        self.completed_nodes.iter().any(|completed| completed == node_id)
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every node ran fresh and nothing was cached, repaired, or warned about.
    Success,
    /// Completed, but with warnings, repaired nodes, or cache hits.
    Degraded,
    /// A node failed and no fallback applied.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Success => "success",
            RunStatus::Degraded => "degraded",
            RunStatus::Failed => "failed",
        };
        formatter.write_str(label)
    }
}

/// Writes tracking facts into a store view.
pub struct ExecutionTracker<'a> {
    store: &'a mut dyn StoreAccess,
}

impl<'a> ExecutionTracker<'a> {
    pub fn new(store: &'a mut dyn StoreAccess) -> Self {
        Self { store }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        load_checkpoint(self.store)
    }

    fn save(&mut self, checkpoint: &Checkpoint) {
        self.store.set(EXECUTION_KEY, serde_json::to_value(checkpoint).unwrap_or_default());
    }

    /// Returns the recorded action when `node_id` completed earlier with the same configuration.
    pub fn cached_action(&self, node_id: &str, config_hash: &str) -> Option<String> {
        let checkpoint = self.checkpoint();
        if !checkpoint.is_completed(node_id) || checkpoint.node_hashes.get(node_id).map(String::as_str) != Some(config_hash) {
            return None;
        }
        Some(
            checkpoint
                .node_actions
                .get(node_id)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ACTION.to_string()),
        )
    }

    pub fn record_completed(&mut self, node_id: &str, action: &str, config_hash: &str) {
        let mut checkpoint = self.checkpoint();
        if !checkpoint.is_completed(node_id) {
            checkpoint.completed_nodes.push(node_id.to_string());
        }
        checkpoint.node_actions.insert(node_id.to_string(), action.to_string());
        checkpoint.node_hashes.insert(node_id.to_string(), config_hash.to_string());
        if checkpoint.failed_node.as_deref() == Some(node_id) {
            checkpoint.failed_node = None;
        }
        self.save(&checkpoint);
    }

    pub fn record_failed(&mut self, node_id: &str) {
        let mut checkpoint = self.checkpoint();
        checkpoint.completed_nodes.retain(|completed| completed != node_id);
        checkpoint.node_actions.shift_remove(node_id);
        checkpoint.node_hashes.shift_remove(node_id);
        checkpoint.failed_node = Some(node_id.to_string());
        self.save(&checkpoint);
    }

    /// Clears a failure that an `error` edge handled and keeps it as a warning.
    pub fn recover_failure(&mut self, node_id: &str, message: &str) {
        let mut checkpoint = self.checkpoint();
        if checkpoint.failed_node.as_deref() == Some(node_id) {
            checkpoint.failed_node = None;
            self.save(&checkpoint);
        }
        self.record_warning(node_id, message);
    }

    pub fn record_cache_hit(&mut self, node_id: &str) {
        self.append_unique(CACHE_HITS_KEY, node_id);
    }

    /// Marks nodes an external repair pass changed before this run.
    pub fn mark_modified<'n>(&mut self, node_ids: impl IntoIterator<Item = &'n str>) {
        for node_id in node_ids {
            self.append_unique(MODIFIED_NODES_KEY, node_id);
        }
    }

    /// Records a non-fatal issue under `key` (a node id or `output:<name>`).
    pub fn record_warning(&mut self, key: &str, message: &str) {
        debug!(key, message, "recording warning");
        let mut warnings = warnings(self.store);
        warnings.insert(key.to_string(), Value::String(message.to_string()));
        self.store.set(WARNINGS_KEY, Value::Object(warnings));
    }

    fn append_unique(&mut self, key: &str, entry: &str) {
        let mut entries = string_list(self.store, key);
        if !entries.iter().any(|existing| existing == entry) {
            entries.push(entry.to_string());
        }
        self.store.set(key, Value::Array(entries.into_iter().map(Value::String).collect()));
    }
}

/// Reads the checkpoint, falling back to an empty one when absent or malformed.
pub fn load_checkpoint(store: &dyn StoreAccess) -> Checkpoint {
    store
        .get(EXECUTION_KEY)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

pub fn cache_hits(store: &dyn StoreAccess) -> Vec<String> {
    string_list(store, CACHE_HITS_KEY)
}

pub fn modified_nodes(store: &dyn StoreAccess) -> Vec<String> {
    string_list(store, MODIFIED_NODES_KEY)
}

pub fn warnings(store: &dyn StoreAccess) -> JsonMap<String, Value> {
    store.get(WARNINGS_KEY).and_then(Value::as_object).cloned().unwrap_or_default()
}

fn string_list(store: &dyn StoreAccess, key: &str) -> Vec<String> {
    store
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(|entry| entry.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Derives the tri-state outcome from the tracking keys in `store`.
pub fn derive_status(store: &dyn StoreAccess, failed: bool) -> RunStatus {
    if failed {
        return RunStatus::Failed;
    }
    if warnings(store).is_empty() && modified_nodes(store).is_empty() && cache_hits(store).is_empty() {
        RunStatus::Success
    } else {
        RunStatus::Degraded
    }
}

/// Renders one report for a failed run.
pub fn format_execution_error(error: &WorkflowExecutionError, missing_paths: &[MissingTemplatePath]) -> String {
    let mut lines = vec![format!(
        "Workflow failed at node '{}' ({}): {}",
        error.node_id, error.node_type, error.message
    )];

    if error.checkpoint.completed_nodes.is_empty() {
        lines.push("Completed nodes: none".to_string());
    } else {
        lines.push(format!("Completed nodes: {}", error.checkpoint.completed_nodes.join(", ")));
    }

    if error.non_retriable {
        lines.push("This failure is not retriable without changing the workflow.".to_string());
    }

    if !error.upstream.is_empty() {
        lines.push("Upstream diagnostics:".to_string());
        for diagnostic in &error.upstream {
            lines.push(format!("  {}.{}: {}", diagnostic.node_id, diagnostic.field, diagnostic.text));
        }
    }

    if !missing_paths.is_empty() {
        lines.push("Missing template paths:".to_string());
        for missing in missing_paths {
            lines.push(format!("  {}", missing.message()));
        }
    }

    lines.join("\n")
}
