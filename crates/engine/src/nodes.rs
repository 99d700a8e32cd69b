//! Closure-backed node implementation.
//!
//! Embedders that do not need a dedicated type can register a handler
//! closure. The node's `prep` hands the bound parameters to the handler, and
//! `post` writes the handler's output into the store: each key of an object
//! output becomes its own entry, any other value is written under `result`.

use std::sync::Arc;

use pathflow_types::DEFAULT_ACTION;
use serde_json::{Map as JsonMap, Value};

use crate::{
    node::{Node, NodeError},
    registry::NodeFactory,
    store::StoreAccess,
};

type Handler = Arc<dyn Fn(&JsonMap<String, Value>) -> Result<Value, NodeError> + Send + Sync>;
type Router = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Node whose `exec` phase is a closure over its parameters.
#[derive(Clone)]
pub struct FnNode {
    params: JsonMap<String, Value>,
    handler: Handler,
    router: Option<Router>,
}

impl FnNode {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&JsonMap<String, Value>) -> Result<Value, NodeError> + Send + Sync + 'static,
    {
        Self {
            params: JsonMap::new(),
            handler: Arc::new(handler),
            router: None,
        }
    }

    /// Chooses the returned action from the handler's output instead of `default`.
    pub fn with_router<R>(mut self, router: R) -> Self
    where
        R: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.router = Some(Arc::new(router));
        self
    }

    /// Turns this node into a registry factory; each call yields a fresh clone.
    pub fn into_factory(self) -> NodeFactory {
        Arc::new(move || Box::new(self.clone()) as Box<dyn Node>)
    }
}

impl Node for FnNode {
    fn set_params(&mut self, params: JsonMap<String, Value>) {
        self.params = params;
    }

    fn prep(&self, _store: &dyn StoreAccess) -> Result<Value, NodeError> {
        Ok(Value::Object(self.params.clone()))
    }

    fn exec(&self, prep: &Value) -> Result<Value, NodeError> {
        let empty = JsonMap::new();
        let params = prep.as_object().unwrap_or(&empty);
        (self.handler)(params)
    }

    fn post(&self, store: &mut dyn StoreAccess, _prep: &Value, exec: Value) -> Result<String, NodeError> {
        let action = self
            .router
            .as_ref()
            .map(|router| router(&exec))
            .unwrap_or_else(|| DEFAULT_ACTION.to_string());
        match exec {
            Value::Object(map) => {
                for (key, value) in map {
                    store.set(&key, value);
                }
            }
            Value::Null => {}
            other => store.set("result", other),
        }
        Ok(action)
    }
}
