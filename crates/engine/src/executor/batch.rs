//! Batch execution: run a node once per element of a resolved collection.
//!
//! `items` is resolved once against the node's store view and must be an
//! array. Every element runs the full bound-node cycle inside its own
//! [`ItemScope`], which exposes the element under the configured alias (and
//! its position under `__index__`) and captures writes privately. Items never
//! see each other's writes.
//!
//! Once every item is done the aggregate
//! `{count, success_count, error_count, results, errors}` is written into the
//! node's namespace, and bookkeeping writes made by items (LLM ledger entries,
//! warnings) are replayed into the store in input order.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use pathflow_types::{BatchErrorHandling, BatchSpec, DEFAULT_ACTION, json_type_name};
use serde_json::{Map as JsonMap, Value, json};
use tracing::{info, warn};

use crate::{
    node::{NodeError, Runnable},
    resolve::resolve,
    store::{SharedStore, StoreAccess, is_bookkeeping_key},
};

/// Key under which an item's zero-based position is visible.
pub const ITEM_INDEX_KEY: &str = "__index__";

/// Keys of the aggregate a batch node writes into its namespace.
pub const BATCH_OUTPUT_KEYS: &[&str] = &["count", "success_count", "error_count", "results", "errors"];

/// Builds a fresh bound node for one batch item.
pub type RunnableFactory = Arc<dyn Fn() -> Box<dyn Runnable> + Send + Sync>;

/// Store view for one batch item.
///
/// Reads fall through to a read-only base; writes never reach it.
pub struct ItemScope<'a> {
    base: &'a dyn StoreAccess,
    bindings: JsonMap<String, Value>,
    writes: JsonMap<String, Value>,
    bookkeeping: JsonMap<String, Value>,
}

impl<'a> ItemScope<'a> {
    pub fn new(base: &'a dyn StoreAccess, alias: &str, item: Value, index: usize) -> Self {
        let mut bindings = JsonMap::new();
        bindings.insert(alias.to_string(), item);
        bindings.insert(ITEM_INDEX_KEY.to_string(), json!(index));
        Self {
            base,
            bindings,
            writes: JsonMap::new(),
            bookkeeping: JsonMap::new(),
        }
    }

    /// Consumes the scope, returning `(writes, bookkeeping_writes)`.
    pub fn into_parts(self) -> (JsonMap<String, Value>, JsonMap<String, Value>) {
        (self.writes, self.bookkeeping)
    }
}

impl StoreAccess for ItemScope<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        if let Some(bound) = self.bindings.get(key) {
            return Some(bound);
        }
        let captured = if is_bookkeeping_key(key) { &self.bookkeeping } else { &self.writes };
        captured.get(key).or_else(|| self.base.get(key))
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        let captured = if is_bookkeeping_key(key) { &mut self.bookkeeping } else { &mut self.writes };
        if !captured.contains_key(key) {
            let inherited = self.bindings.get(key).or_else(|| self.base.get(key))?.clone();
            captured.insert(key.to_string(), inherited);
        }
        captured.get_mut(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        let captured = if is_bookkeeping_key(key) { &mut self.bookkeeping } else { &mut self.writes };
        captured.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        let captured = if is_bookkeeping_key(key) { &mut self.bookkeeping } else { &mut self.writes };
        captured.remove(key)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.bindings.keys().chain(self.writes.keys()).chain(self.bookkeeping.keys()).cloned().collect();
        for key in self.base.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn root_store_mut(&mut self) -> Option<&mut SharedStore> {
        None
    }
}

struct ItemOutcome {
    index: usize,
    result: Result<JsonMap<String, Value>, NodeError>,
    bookkeeping: JsonMap<String, Value>,
}

/// Runs a bound node once per item.
pub struct BatchNode {
    node_id: String,
    spec: BatchSpec,
    factory: RunnableFactory,
    default_concurrency: usize,
}

impl BatchNode {
    pub fn new(node_id: impl Into<String>, spec: BatchSpec, factory: RunnableFactory, default_concurrency: usize) -> Self {
        Self {
            node_id: node_id.into(),
            spec,
            factory,
            default_concurrency,
        }
    }

    fn fail_fast(&self) -> bool {
        self.spec.error_handling == BatchErrorHandling::FailFast
    }

    fn run_item(&self, base: &dyn StoreAccess, item: &Value, index: usize) -> ItemOutcome {
        let mut scope = ItemScope::new(base, &self.spec.alias, item.clone(), index);
        let mut node = (self.factory)();
        let result = node.run(&mut scope);
        let (writes, bookkeeping) = scope.into_parts();
        if let Err(error) = &result {
            warn!(node_id = %self.node_id, index, %error, "batch item failed");
        }
        ItemOutcome {
            index,
            result: result.map(|_| writes),
            bookkeeping,
        }
    }

    fn run_sequential(&self, base: &dyn StoreAccess, items: &[Value]) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let outcome = self.run_item(base, item, index);
            let halt = self.fail_fast() && outcome.result.is_err();
            outcomes.push(outcome);
            if halt {
                break;
            }
        }
        outcomes
    }

    fn drain_queue(&self, base: &dyn StoreAccess, items: &[Value], next_index: &AtomicUsize, halted: &AtomicBool) -> Vec<ItemOutcome> {
        let mut local = Vec::new();
        while !halted.load(Ordering::Acquire) {
            let index = next_index.fetch_add(1, Ordering::AcqRel);
            let Some(item) = items.get(index) else {
                break;
            };
            let outcome = self.run_item(base, item, index);
            if self.fail_fast() && outcome.result.is_err() {
                halted.store(true, Ordering::Release);
            }
            local.push(outcome);
        }
        local
    }

    /// Bounded worker pool over a shared read-only view of the store.
    fn run_parallel(&self, base: &dyn StoreAccess, items: &[Value]) -> Vec<ItemOutcome> {
        let workers = self.spec.max_concurrency.unwrap_or(self.default_concurrency).clamp(1, items.len().max(1));
        let next_index = AtomicUsize::new(0);
        let halted = AtomicBool::new(false);

        let collected: Vec<Option<Vec<ItemOutcome>>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| self.drain_queue(base, items, &next_index, &halted)));
            }
            handles.into_iter().map(|handle| handle.join().ok()).collect()
        });

        let mut slots: Vec<Option<ItemOutcome>> = (0..items.len()).map(|_| None).collect();
        for outcome in collected.into_iter().flatten().flatten() {
            let index = outcome.index;
            slots[index] = Some(outcome);
        }

        let was_halted = halted.load(Ordering::Acquire);
        slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Some(outcome) => Some(outcome),
                None if was_halted => None,
                None => Some(ItemOutcome {
                    index,
                    result: Err(NodeError::failed("batch worker terminated before reporting this item")),
                    bookkeeping: JsonMap::new(),
                }),
            })
            .collect()
    }
}

impl Runnable for BatchNode {
    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        let items_value = resolve(&self.spec.items, store)
            .ok_or_else(|| NodeError::failed(format!("batch items '{}' did not resolve", self.spec.items)))?;
        let items = match decode_json_array(items_value) {
            Value::Array(items) => items,
            other => {
                return Err(NodeError::failed(format!(
                    "batch items '{}' resolved to {}, expected an array",
                    self.spec.items,
                    json_type_name(&other)
                )));
            }
        };

        info!(node_id = %self.node_id, count = items.len(), parallel = self.spec.parallel, "batch started");

        let outcomes = {
            let base: &dyn StoreAccess = &*store;
            if self.spec.parallel {
                self.run_parallel(base, &items)
            } else {
                self.run_sequential(base, &items)
            }
        };

        replay_bookkeeping(store, &outcomes);

        if self.fail_fast()
            && let Some((index, error)) = outcomes.iter().find_map(|outcome| outcome.result.as_ref().err().map(|error| (outcome.index, error)))
        {
            return Err(NodeError::failed(format!("batch item {index} failed: {error}")));
        }

        let mut results = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(writes) => results.push(Value::Object(writes)),
                Err(error) => {
                    results.push(Value::Null);
                    errors.push(json!({
                        "index": outcome.index,
                        "item": items[outcome.index].clone(),
                        "error": error.to_string(),
                    }));
                }
            }
        }

        let count = items.len();
        let error_count = errors.len();
        let success_count = count - error_count;
        info!(node_id = %self.node_id, count, success_count, error_count, "batch finished");

        let first_error = errors.first().and_then(|entry| entry.get("error")).and_then(Value::as_str).map(str::to_string);
        store.set("count", json!(count));
        store.set("success_count", json!(success_count));
        store.set("error_count", json!(error_count));
        store.set("results", Value::Array(results));
        store.set("errors", Value::Array(errors));

        if count > 0 && success_count == 0 {
            return Err(NodeError::failed(format!(
                "all {count} batch items failed; first error: {}",
                first_error.unwrap_or_default()
            )));
        }

        Ok(DEFAULT_ACTION.to_string())
    }
}

/// Decodes a string holding a JSON array, one level deep, leaving anything else untouched.
fn decode_json_array(value: Value) -> Value {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(decoded @ Value::Array(_)) => decoded,
            _ => Value::String(text),
        },
        other => other,
    }
}

/// Applies item bookkeeping writes in input order.
///
/// Arrays are extended with whatever each item appended to the pre-batch
/// contents and objects are merged key by key; anything else is overwritten
/// by the last item that wrote it.
fn replay_bookkeeping(store: &mut dyn StoreAccess, outcomes: &[ItemOutcome]) {
    let baseline: HashMap<&str, usize> = outcomes
        .iter()
        .flat_map(|outcome| outcome.bookkeeping.keys())
        .filter_map(|key| match store.get(key) {
            None => Some((key.as_str(), 0)),
            Some(Value::Array(entries)) => Some((key.as_str(), entries.len())),
            Some(_) => None,
        })
        .collect();

    for outcome in outcomes {
        for (key, value) in &outcome.bookkeeping {
            if let (Value::Array(entries), Some(&baseline_len)) = (value, baseline.get(key.as_str()))
                && let Some(Value::Array(current)) = store.get_mut(key)
            {
                current.extend(entries.iter().skip(baseline_len).cloned());
                continue;
            }
            if let Value::Object(entries) = value
                && let Some(Value::Object(current)) = store.get_mut(key)
            {
                current.extend(entries.clone());
                continue;
            }
            store.set(key, value.clone());
        }
    }
}
