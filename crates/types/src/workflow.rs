//! Strongly typed workflow IR shared by the validator, compiler, and runtime.
//!
//! The IR is the declarative JSON document an author (or an external planner)
//! produces: ordered nodes, action-labelled edges, declared inputs and
//! outputs. Maps preserve authoring order (via `IndexMap`) so validation
//! reports and promotion run in a predictable sequence.

pub mod validation;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Action name used when an edge omits `action` and as the fallback successor.
pub const DEFAULT_ACTION: &str = "default";

/// Action name a failing node may route through instead of halting the run.
pub const ERROR_ACTION: &str = "error";

/// Reserved node type compiled into the nested workflow executor.
pub const NESTED_WORKFLOW_TYPE: &str = "workflow";

/// Complete workflow IR document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowIr {
    /// IR schema version (`MAJOR.MINOR.PATCH`).
    #[serde(default)]
    pub ir_version: String,
    /// Ordered node declarations.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Directed, action-labelled edges between node ids.
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Explicit entry node; the first declared node is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    /// Declared workflow-level parameters keyed by name.
    #[serde(default)]
    pub inputs: IndexMap<String, InputSpec>,
    /// Declared workflow outputs keyed by the root key they are promoted to.
    #[serde(default)]
    pub outputs: IndexMap<String, OutputSpec>,
}

impl WorkflowIr {
    /// Looks up a node declaration by id.
    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    /// Returns node ids in declaration order.
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.id.as_str()).collect()
    }

    /// Returns the entry node id: `start_node` when present, else the first node.
    pub fn resolved_start_node(&self) -> Option<&str> {
        self.start_node
            .as_deref()
            .or_else(|| self.nodes.first().map(|node| node.id.as_str()))
    }
}

/// Declares a single node of the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeSpec {
    /// Unique, shell/URL-safe identifier; also the node's store namespace.
    pub id: String,
    /// Registry type name of the implementation.
    #[serde(rename = "type")]
    pub r#type: String,
    /// Literal or templated parameters.
    #[serde(default)]
    pub params: JsonMap<String, JsonValue>,
    /// Optional batch configuration; when present the node runs once per item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchSpec>,
    /// Free-form description of what the node is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// Directed edge connecting two nodes under an action label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeSpec {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Action the source node must return for this edge to be followed.
    #[serde(default = "default_action")]
    pub action: String,
}

impl EdgeSpec {
    /// Builds a `default`-action edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            action: DEFAULT_ACTION.to_string(),
        }
    }

    /// Builds an edge that is followed only for `action`.
    pub fn with_action(from: impl Into<String>, to: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            action: action.into(),
        }
    }
}

/// Declared workflow input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSpec {
    /// Descriptive text explaining the purpose of the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared primitive type (string, number, integer, boolean, object, array, any).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    /// Whether a value must be supplied when no default exists.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Value applied when the caller omits the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            description: None,
            r#type: None,
            required: true,
            default: None,
        }
    }
}

/// Declared workflow output promoted to the store root after execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputSpec {
    /// Template expression resolved against the final store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Documentation only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Documentation only.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// Batch configuration attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSpec {
    /// Template expression resolving to the array to iterate.
    pub items: String,
    /// Name the current element is bound under inside each iteration.
    #[serde(rename = "as", default = "default_item_alias")]
    pub alias: String,
    /// Run iterations on a bounded worker pool instead of sequentially.
    #[serde(default)]
    pub parallel: bool,
    /// Worker bound for parallel execution; engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Whether a failed item stops the remaining iterations.
    #[serde(default)]
    pub error_handling: BatchErrorHandling,
}

impl BatchSpec {
    /// Builds a sequential batch over `items` bound as `alias`.
    pub fn new(items: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            items: items.into(),
            alias: alias.into(),
            parallel: false,
            max_concurrency: None,
            error_handling: BatchErrorHandling::default(),
        }
    }
}

/// Per-item failure policy for batch nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorHandling {
    /// Record the failure for that item and keep iterating.
    #[default]
    Continue,
    /// Stop at the first failed item and fail the node.
    FailFast,
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

fn default_item_alias() -> String {
    "item".to_string()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_basic_workflow() {
        let yaml_text = r#"
ir_version: "0.1.0"
inputs:
  username:
    type: string
nodes:
  - id: fetch
    type: http
    params:
      url: "https://api.example.com/users/${username}"
  - id: summarize
    type: llm
    params:
      prompt: "Summarize ${fetch.response.bio}"
edges:
  - from: fetch
    to: summarize
outputs:
  summary:
    source: "${summarize.response}"
"#;

        let ir: WorkflowIr = serde_yaml::from_str(yaml_text).expect("deserialize workflow");

        assert_eq!(ir.ir_version, "0.1.0");
        assert_eq!(ir.nodes.len(), 2);
        assert_eq!(ir.edges[0].action, DEFAULT_ACTION);
        assert!(ir.inputs["username"].required);
        assert_eq!(ir.outputs["summary"].source.as_deref(), Some("${summarize.response}"));
        assert_eq!(ir.resolved_start_node(), Some("fetch"));
    }

    #[test]
    fn batch_defaults_apply() {
        let json_text = r#"{
            "id": "each",
            "type": "llm",
            "batch": {"items": "${list.files}"}
        }"#;
        let node: NodeSpec = serde_json::from_str(json_text).expect("node");
        let batch = node.batch.expect("batch spec");
        assert_eq!(batch.alias, "item");
        assert!(!batch.parallel);
        assert_eq!(batch.error_handling, BatchErrorHandling::Continue);
    }

    #[test]
    fn explicit_start_node_wins() {
        let ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![
                NodeSpec {
                    id: "a".into(),
                    r#type: "noop".into(),
                    ..Default::default()
                },
                NodeSpec {
                    id: "b".into(),
                    r#type: "noop".into(),
                    ..Default::default()
                },
            ],
            start_node: Some("b".into()),
            ..Default::default()
        };
        assert_eq!(ir.resolved_start_node(), Some("b"));
    }
}
