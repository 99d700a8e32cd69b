//! Node contracts.
//!
//! [`Node`] is what an implementation provides: a settable parameter bag and
//! the three phases `prep -> exec -> post`. [`Runnable`] is what the compiled
//! graph drives: an implementation together with the wrappers the compiler put
//! around it (binding, batching, namespacing, instrumentation). Wrappers only
//! ever see the three phases through [`Node::run`], so implementations stay
//! unaware of how they are wrapped.

use std::collections::BTreeSet;

use pathflow_types::DEFAULT_ACTION;
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

use crate::store::StoreAccess;

/// Failure returned by a node phase. The graph decides whether to halt or
/// follow an `error` edge based on this value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("{message}")]
    Failed { message: String },

    #[error("non-retriable failure: {message}")]
    NonRetriable { message: String },

    #[error("unresolved template(s): {}", templates.join(", "))]
    UnresolvedTemplate {
        templates: Vec<String>,
        referenced_nodes: BTreeSet<String>,
    },

    #[error("invalid node configuration: {message}")]
    Configuration { message: String },

    #[error("nested workflow '{workflow}' failed at node '{node_id}': {message}")]
    NestedWorkflow { workflow: String, node_id: String, message: String },
}

impl NodeError {
    /// Ordinary failure that a later re-run may recover from.
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed { message: message.into() }
    }

    /// Failure caused by a structurally invalid request; re-running unchanged will fail again.
    pub fn non_retriable(message: impl Into<String>) -> Self {
        NodeError::NonRetriable { message: message.into() }
    }

    /// Invalid or contradictory node parameters.
    pub fn configuration(message: impl Into<String>) -> Self {
        NodeError::Configuration { message: message.into() }
    }

    /// Returns true when retrying the node unchanged cannot succeed.
    pub fn is_non_retriable(&self) -> bool {
        matches!(self, NodeError::NonRetriable { .. } | NodeError::Configuration { .. })
    }
}

/// Three-phase node implementation.
///
/// - `prep` reads from the store and must not write to it.
/// - `exec` does the work and never sees the store.
/// - `post` writes results and returns the action naming the outgoing edge.
pub trait Node: Send {
    /// Receives the node's parameters after template binding.
    fn set_params(&mut self, params: JsonMap<String, Value>);

    fn prep(&self, _store: &dyn StoreAccess) -> Result<Value, NodeError> {
        Ok(Value::Null)
    }

    fn exec(&self, prep: &Value) -> Result<Value, NodeError>;

    fn post(&self, _store: &mut dyn StoreAccess, _prep: &Value, _exec: Value) -> Result<String, NodeError> {
        Ok(DEFAULT_ACTION.to_string())
    }

    /// Runs the three phases in order and returns the action.
    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        let prep = self.prep(store)?;
        let exec = self.exec(&prep)?;
        self.post(store, &prep, exec)
    }
}

/// A compiled graph step.
pub trait Runnable: Send {
    /// Runs the step against `store` and returns the action it produced.
    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError>;
}
