//! Flow compiler: turns validated workflow IR into an [`ExecutableGraph`].
//!
//! Every node is instantiated from its registry factory and wrapped, outer to
//! inner, as instrumentation, namespace, batch (when declared), template
//! binding, implementation. The reserved type `workflow` compiles to a
//! [`NestedWorkflowNode`] that shares this compiler's registry, workflow store
//! and configuration.

mod graph;

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use pathflow_types::{NESTED_WORKFLOW_TYPE, NodeSpec, WorkflowIr};
use tracing::debug;

pub use graph::ExecutableGraph;

use crate::{
    config::EngineConfig,
    error::{CompilationError, EngineError},
    executor::{BatchNode, ExecutionObserver, InstrumentedNode, NamespacedNode, RunnableFactory, TemplateBoundNode},
    node::Runnable,
    registry::{NodeRegistry, THREE_PHASE_PROTOCOL},
    workflow::{
        nested::{NESTED_SKIPPED_PARAMS, NestedWorkflowNode},
        store::WorkflowStore,
    },
};

/// Builds executable graphs from IR against a node registry.
#[derive(Clone)]
pub struct FlowCompiler {
    registry: Arc<NodeRegistry>,
    workflow_store: Option<Arc<dyn WorkflowStore>>,
    config: EngineConfig,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl FlowCompiler {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            workflow_store: None,
            config: EngineConfig::default(),
            observer: None,
        }
    }

    /// Source for `workflow_ref` lookups made by nested workflow nodes.
    pub fn with_workflow_store(mut self, workflow_store: Arc<dyn WorkflowStore>) -> Self {
        self.workflow_store = Some(workflow_store);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Observer notified of every node start and finish in compiled graphs.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Copy without an observer, used for child workflows.
    pub fn without_observer(&self) -> Self {
        Self {
            observer: None,
            ..self.clone()
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn workflow_store(&self) -> Option<&Arc<dyn WorkflowStore>> {
        self.workflow_store.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiles `ir`. Nodes are not run and no store is touched.
    pub fn compile(&self, ir: &WorkflowIr) -> Result<ExecutableGraph, EngineError> {
        let start_node = match ir.resolved_start_node() {
            None => return Err(CompilationError::NoStartNode.into()),
            Some(start_node) if ir.node(start_node).is_none() => {
                return Err(CompilationError::UnknownStartNode {
                    start_node: start_node.to_string(),
                }
                .into());
            }
            Some(start_node) => start_node.to_string(),
        };

        let node_ids: Arc<[String]> = ir.nodes.iter().map(|node| node.id.clone()).collect();
        let mut nodes: IndexMap<String, Box<dyn Runnable>> = IndexMap::with_capacity(ir.nodes.len());
        let mut node_types = HashMap::with_capacity(ir.nodes.len());
        for node in &ir.nodes {
            let factory = self.bound_factory(node, node_ids.clone())?;
            let step: Box<dyn Runnable> = match &node.batch {
                Some(batch) => Box::new(BatchNode::new(
                    node.id.as_str(),
                    batch.clone(),
                    factory,
                    self.config.default_batch_concurrency,
                )),
                None => factory(),
            };
            let step = Box::new(NamespacedNode::new(node.id.as_str(), step));
            let step = Box::new(InstrumentedNode::new(node, step, self.observer.clone()));
            debug!(node_id = %node.id, node_type = %node.r#type, batched = node.batch.is_some(), "compiled node");
            nodes.insert(node.id.clone(), step);
            node_types.insert(node.id.clone(), node.r#type.clone());
        }

        let mut successors: HashMap<String, IndexMap<String, String>> = HashMap::new();
        for edge in &ir.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(CompilationError::UnknownEdgeEndpoint {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: endpoint.clone(),
                    }
                    .into());
                }
            }
            let outgoing = successors.entry(edge.from.clone()).or_default();
            if outgoing.contains_key(&edge.action) {
                return Err(CompilationError::AmbiguousEdge {
                    node_id: edge.from.clone(),
                    node_type: node_types.get(&edge.from).cloned().unwrap_or_default(),
                    action: edge.action.clone(),
                }
                .into());
            }
            outgoing.insert(edge.action.clone(), edge.to.clone());
        }

        Ok(ExecutableGraph::new(nodes, node_types, successors, start_node))
    }

    /// Factory producing a fresh template-bound implementation for `node`.
    fn bound_factory(&self, node: &NodeSpec, node_ids: Arc<[String]>) -> Result<RunnableFactory, CompilationError> {
        let node_id = node.id.clone();
        let raw_params = node.params.clone();
        let mode = self.config.template_mode;

        if node.r#type == NESTED_WORKFLOW_TYPE {
            let compiler = self.clone();
            return Ok(Arc::new(move || {
                let nested = NestedWorkflowNode::new(compiler.clone(), node_id.as_str(), node_ids.clone());
                Box::new(TemplateBoundNode::new(node_id.as_str(), Box::new(nested), raw_params.clone(), mode, node_ids.clone()).skipping(NESTED_SKIPPED_PARAMS))
                    as Box<dyn Runnable>
            }));
        }

        let Some(metadata) = self.registry.get(&node.r#type) else {
            return Err(CompilationError::UnknownNodeType {
                node_id,
                node_type: node.r#type.clone(),
            });
        };
        let Some(implementation) = metadata.factory.clone() else {
            return Err(CompilationError::MissingFactory {
                node_id,
                node_type: node.r#type.clone(),
            });
        };
        if metadata.protocol != THREE_PHASE_PROTOCOL {
            return Err(CompilationError::UnsupportedProtocol {
                node_id,
                node_type: node.r#type.clone(),
                protocol: metadata.protocol.clone(),
                expected: THREE_PHASE_PROTOCOL.to_string(),
            });
        }

        Ok(Arc::new(move || {
            Box::new(TemplateBoundNode::new(node_id.as_str(), implementation(), raw_params.clone(), mode, node_ids.clone())) as Box<dyn Runnable>
        }))
    }
}
