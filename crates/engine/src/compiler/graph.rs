//! Compiled graph and its run loop.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use pathflow_types::{DEFAULT_ACTION, ERROR_ACTION};
use tracing::{debug, error, info, warn};

use crate::{error::WorkflowExecutionError, node::Runnable, store::StoreAccess, workflow::tracker::ExecutionTracker};

/// Wrapped nodes plus action-labelled successor edges.
pub struct ExecutableGraph {
    nodes: IndexMap<String, Box<dyn Runnable>>,
    node_types: HashMap<String, String>,
    successors: HashMap<String, IndexMap<String, String>>,
    start_node: String,
}

impl ExecutableGraph {
    pub(super) fn new(
        nodes: IndexMap<String, Box<dyn Runnable>>,
        node_types: HashMap<String, String>,
        successors: HashMap<String, IndexMap<String, String>>,
        start_node: String,
    ) -> Self {
        Self {
            nodes,
            node_types,
            successors,
            start_node,
        }
    }

    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    /// Node ids in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Next node after `node_id` returned `action`: the edge for that action,
    /// else the `default` edge, else none.
    pub fn successor(&self, node_id: &str, action: &str) -> Option<&str> {
        let outgoing = self.successors.get(node_id)?;
        outgoing.get(action).or_else(|| outgoing.get(DEFAULT_ACTION)).map(String::as_str)
    }

    fn has_error_edge(&self, node_id: &str) -> bool {
        self.successors.get(node_id).is_some_and(|outgoing| outgoing.contains_key(ERROR_ACTION))
    }

    /// Runs from the start node until a node has no successor for its action.
    ///
    /// A failing node with an outgoing `error` edge does not halt the run; the
    /// failure is kept as a warning and the `error` edge is followed.
    pub fn run(&mut self, store: &mut dyn StoreAccess) -> Result<(), WorkflowExecutionError> {
        let mut visited = HashSet::new();
        let mut current = Some(self.start_node.clone());
        info!(start_node = %self.start_node, nodes = self.nodes.len(), "workflow run started");

        while let Some(node_id) = current {
            let node_type = self.node_types.get(&node_id).cloned().unwrap_or_default();
            if !visited.insert(node_id.clone()) {
                return Err(WorkflowExecutionError::graph(
                    &node_id,
                    &node_type,
                    "node reached a second time; the edge graph contains a cycle",
                    store,
                ));
            }
            let Some(step) = self.nodes.get_mut(&node_id) else {
                return Err(WorkflowExecutionError::graph(&node_id, &node_type, "node was not compiled", store));
            };

            let action = match step.run(store) {
                Ok(action) => action,
                Err(node_error) if self.has_error_edge(&node_id) => {
                    warn!(node_id = %node_id, error = %node_error, "node failed; following error edge");
                    ExecutionTracker::new(store).recover_failure(&node_id, &node_error.to_string());
                    ERROR_ACTION.to_string()
                }
                Err(node_error) => {
                    error!(node_id = %node_id, node_type = %node_type, error = %node_error, "workflow run halted");
                    return Err(WorkflowExecutionError::from_node_error(&node_id, &node_type, &node_error, store));
                }
            };

            current = self.successor(&node_id, &action).map(str::to_string);
            debug!(node_id = %node_id, action = %action, next = ?current, "transition");
        }

        info!("workflow run finished");
        Ok(())
    }
}
