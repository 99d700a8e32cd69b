//! Shared store: the single key/value space nodes communicate through.
//!
//! Nodes never touch the store directly; they receive a `&mut dyn StoreAccess`
//! view. The root [`SharedStore`] is one implementation, the per-node
//! [`NamespacedStore`](crate::executor::namespace::NamespacedStore) and the
//! per-item [`ItemScope`](crate::executor::batch::ItemScope) are others. Keys
//! starting with [`BOOKKEEPING_PREFIX`] always live at the root regardless of
//! which view writes them.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Prefix marking cross-cutting bookkeeping keys that bypass namespacing.
pub const BOOKKEEPING_PREFIX: &str = "__";
/// Execution checkpoint (`completed_nodes`, `failed_node`, ...).
pub const EXECUTION_KEY: &str = "__execution__";
/// Node ids whose execution was skipped because a checkpoint already covered them.
pub const CACHE_HITS_KEY: &str = "__cache_hits__";
/// Node ids an external repair pass modified before this run.
pub const MODIFIED_NODES_KEY: &str = "__modified_nodes__";
/// Ledger of LLM calls appended by node implementations.
pub const LLM_CALLS_KEY: &str = "__llm_calls__";
/// Non-fatal issues keyed by node id (or `output:<name>`).
pub const WARNINGS_KEY: &str = "__warnings__";
/// Current nested workflow depth.
pub const WORKFLOW_DEPTH_KEY: &str = "__workflow_depth__";
/// Identities of the workflows currently executing, outermost first.
pub const WORKFLOW_STACK_KEY: &str = "__workflow_stack__";

/// Returns true for keys that always read and write at the store root.
pub fn is_bookkeeping_key(key: &str) -> bool {
    key.starts_with(BOOKKEEPING_PREFIX)
}

/// Read/write access to a shared-store view.
pub trait StoreAccess: Send + Sync {
    /// Returns the value visible under `key` from this view.
    fn get(&self, key: &str) -> Option<&Value>;

    /// Returns a mutable handle to a value this view owns.
    fn get_mut(&mut self, key: &str) -> Option<&mut Value>;

    /// Writes `value` under `key` as seen from this view.
    fn set(&mut self, key: &str, value: Value);

    /// Removes `key` from this view, returning the previous value.
    fn remove(&mut self, key: &str) -> Option<Value>;

    /// Every key visible from this view.
    fn keys(&self) -> Vec<String>;

    /// Returns the root store when this view is backed by a live one.
    ///
    /// Private snapshots (parallel batch items) return `None`.
    fn root_store_mut(&mut self) -> Option<&mut SharedStore>;

    /// Returns true when `key` is visible from this view.
    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Root shared store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedStore {
    entries: JsonMap<String, Value>,
}

impl SharedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `entries`.
    pub fn from_map(entries: JsonMap<String, Value>) -> Self {
        Self { entries }
    }

    /// Read-only view of every root entry.
    pub fn as_map(&self) -> &JsonMap<String, Value> {
        &self.entries
    }

    /// Consumes the store, returning the root entries.
    pub fn into_map(self) -> JsonMap<String, Value> {
        self.entries
    }

    /// Returns the namespace mapping a node wrote into, if any.
    pub fn namespace(&self, node_id: &str) -> Option<&JsonMap<String, Value>> {
        self.entries.get(node_id).and_then(Value::as_object)
    }

    /// Root keys that are not bookkeeping entries.
    pub fn data_keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys().filter(|key| !is_bookkeeping_key(key))
    }
}

impl StoreAccess for SharedStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn root_store_mut(&mut self) -> Option<&mut SharedStore> {
        Some(self)
    }
}

impl From<JsonMap<String, Value>> for SharedStore {
    fn from(entries: JsonMap<String, Value>) -> Self {
        Self::from_map(entries)
    }
}
