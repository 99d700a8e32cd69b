//! Node registry: the table mapping a node `type` to its implementation.
//!
//! Entries carry a factory, the protocol marker the compiler checks before
//! instantiating, and an optional declared interface the validator uses to
//! check output references.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Constructs a fresh, unconfigured node instance.
pub type NodeFactory = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Protocol marker for implementations of the three-phase [`Node`] contract.
pub const THREE_PHASE_PROTOCOL: &str = "prep-exec-post";

/// Declared field of a node interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceField {
    pub key: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InterfaceField {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }
}

/// What a node type reads, writes, and accepts as parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeInterface {
    #[serde(default)]
    pub inputs: Vec<InterfaceField>,
    /// Keys the node writes into its namespace.
    #[serde(default)]
    pub outputs: Vec<InterfaceField>,
    #[serde(default)]
    pub params: Vec<InterfaceField>,
}

impl NodeInterface {
    /// Interface that only declares output keys.
    pub fn with_outputs<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: keys.into_iter().map(InterfaceField::new).collect(),
            ..Default::default()
        }
    }
}

/// Registry entry for one node type.
#[derive(Clone)]
pub struct NodeMetadata {
    /// `None` marks an entry that cannot be instantiated.
    pub factory: Option<NodeFactory>,
    pub protocol: String,
    pub interface: NodeInterface,
}

impl NodeMetadata {
    pub fn new(factory: NodeFactory) -> Self {
        Self {
            factory: Some(factory),
            protocol: THREE_PHASE_PROTOCOL.to_string(),
            interface: NodeInterface::default(),
        }
    }
}

impl fmt::Debug for NodeMetadata {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NodeMetadata")
            .field("factory", &self.factory.as_ref().map(|_| "<factory>"))
            .field("protocol", &self.protocol)
            .field("interface", &self.interface)
            .finish()
    }
}

/// Type name to metadata lookup table.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    entries: IndexMap<String, NodeMetadata>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a three-phase implementation with no declared interface.
    pub fn register(&mut self, node_type: impl Into<String>, factory: NodeFactory) -> &mut Self {
        self.insert_metadata(node_type, NodeMetadata::new(factory))
    }

    /// Registers a three-phase implementation with a declared interface.
    pub fn register_with_interface(&mut self, node_type: impl Into<String>, factory: NodeFactory, interface: NodeInterface) -> &mut Self {
        let mut metadata = NodeMetadata::new(factory);
        metadata.interface = interface;
        self.insert_metadata(node_type, metadata)
    }

    /// Inserts raw metadata, replacing any previous entry for the type.
    pub fn insert_metadata(&mut self, node_type: impl Into<String>, metadata: NodeMetadata) -> &mut Self {
        self.entries.insert(node_type.into(), metadata);
        self
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeMetadata> {
        self.entries.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// Registered type names in registration order.
    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Declared output keys for a type; `None` when the type declares none.
    pub fn output_keys(&self, node_type: &str) -> Option<Vec<&str>> {
        let outputs = &self.entries.get(node_type)?.interface.outputs;
        if outputs.is_empty() {
            return None;
        }
        Some(outputs.iter().map(|field| field.key.as_str()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::FnNode;
    use serde_json::json;

    #[test]
    fn registered_types_keep_order_and_protocol() {
        let mut registry = NodeRegistry::new();
        registry
            .register("echo", FnNode::new(|_| Ok(json!({}))).into_factory())
            .register_with_interface(
                "http",
                FnNode::new(|_| Ok(json!({}))).into_factory(),
                NodeInterface::with_outputs(["response", "status_code"]),
            );

        assert_eq!(registry.node_types().collect::<Vec<_>>(), vec!["echo", "http"]);
        assert_eq!(registry.get("echo").map(|meta| meta.protocol.as_str()), Some(THREE_PHASE_PROTOCOL));
        assert_eq!(registry.output_keys("http"), Some(vec!["response", "status_code"]));
        assert_eq!(registry.output_keys("echo"), None);
        assert!(!registry.contains("llm"));
    }
}
