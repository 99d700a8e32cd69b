//! Per-node store namespacing.
//!
//! A node sees the store through a [`NamespacedStore`]: its writes land under
//! `store[node_id][key]`, its reads check that mapping first and then fall back
//! to the root. Bookkeeping keys bypass the namespace in both directions, so a
//! wrapper outside the namespace and a node inside it always agree on where
//! those keys live.

use pathflow_types::json_type_name;
use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use crate::{
    node::{NodeError, Runnable},
    store::{SharedStore, StoreAccess, is_bookkeeping_key},
};

/// Store view scoped to one node's namespace.
pub struct NamespacedStore<'a> {
    inner: &'a mut dyn StoreAccess,
    namespace: String,
}

impl<'a> NamespacedStore<'a> {
    pub fn new(inner: &'a mut dyn StoreAccess, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn own_entries(&self) -> Option<&JsonMap<String, Value>> {
        self.inner.get(&self.namespace).and_then(Value::as_object)
    }
}

impl StoreAccess for NamespacedStore<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        if is_bookkeeping_key(key) {
            return self.inner.get(key);
        }
        self.own_entries().and_then(|entries| entries.get(key)).or_else(|| self.inner.get(key))
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        if is_bookkeeping_key(key) {
            return self.inner.get_mut(key);
        }
        if !self.own_entries().is_some_and(|entries| entries.contains_key(key)) {
            return None;
        }
        self.inner
            .get_mut(&self.namespace)
            .and_then(Value::as_object_mut)
            .and_then(|entries| entries.get_mut(key))
    }

    fn set(&mut self, key: &str, value: Value) {
        if is_bookkeeping_key(key) {
            self.inner.set(key, value);
            return;
        }
        let mut entries = match self.inner.remove(&self.namespace) {
            Some(Value::Object(entries)) => entries,
            Some(replaced) => {
                warn!(
                    namespace = %self.namespace,
                    replaced_type = json_type_name(&replaced),
                    "root value shadowed by node namespace was replaced"
                );
                JsonMap::new()
            }
            None => JsonMap::new(),
        };
        entries.insert(key.to_string(), value);
        self.inner.set(&self.namespace, Value::Object(entries));
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        if is_bookkeeping_key(key) {
            return self.inner.remove(key);
        }
        self.inner
            .get_mut(&self.namespace)
            .and_then(Value::as_object_mut)
            .and_then(|entries| entries.remove(key))
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.own_entries().map(|entries| entries.keys().cloned().collect()).unwrap_or_default();
        for key in self.inner.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn root_store_mut(&mut self) -> Option<&mut SharedStore> {
        self.inner.root_store_mut()
    }
}

/// Runs the wrapped step against a view namespaced under `node_id`.
pub struct NamespacedNode {
    node_id: String,
    inner: Box<dyn Runnable>,
}

impl NamespacedNode {
    pub fn new(node_id: impl Into<String>, inner: Box<dyn Runnable>) -> Self {
        Self {
            node_id: node_id.into(),
            inner,
        }
    }
}

impl Runnable for NamespacedNode {
    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        let mut view = NamespacedStore::new(store, self.node_id.as_str());
        self.inner.run(&mut view)
    }
}
