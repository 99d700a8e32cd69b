//! Engine error taxonomy.

use serde::Serialize;
use thiserror::Error;

use crate::{
    node::NodeError,
    store::StoreAccess,
    validation::ValidationIssue,
    workflow::tracker::{Checkpoint, load_checkpoint},
};

/// Upstream fields captured as diagnostics when a consumer's template fails.
const DIAGNOSTIC_FIELDS: &[&str] = &["stderr", "error"];

/// Main error type for engine entry points.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    #[error("Validation failed with {} issue(s): {}", .0.len(), summarize_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("Invalid workflow inputs: {}", .0.join("; "))]
    InvalidInputs(Vec<String>),

    #[error(transparent)]
    WorkflowExecution(#[from] WorkflowExecutionError),
}

fn summarize_issues(issues: &[ValidationIssue]) -> String {
    issues.iter().map(|issue| issue.message.as_str()).collect::<Vec<_>>().join("; ")
}

/// Failures turning IR into an executable graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("node '{node_id}': unknown node type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("node '{node_id}': registry entry for type '{node_type}' has no implementation factory")]
    MissingFactory { node_id: String, node_type: String },

    #[error("node '{node_id}': type '{node_type}' implements protocol '{protocol}', expected '{expected}'")]
    UnsupportedProtocol {
        node_id: String,
        node_type: String,
        protocol: String,
        expected: String,
    },

    #[error("node '{node_id}' ({node_type}) has more than one outgoing '{action}' edge")]
    AmbiguousEdge { node_id: String, node_type: String, action: String },

    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    UnknownEdgeEndpoint { from: String, to: String, missing: String },

    #[error("start node '{start_node}' is not declared")]
    UnknownStartNode { start_node: String },

    #[error("workflow declares no nodes; cannot determine a start node")]
    NoStartNode,
}

/// Diagnostic text captured from an upstream node a failing node referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamDiagnostic {
    pub node_id: String,
    pub field: String,
    pub text: String,
}

/// A node failed during a run and no `error` edge handled it.
#[derive(Debug, Clone, Error, Serialize)]
#[error("node '{node_id}' ({node_type}) failed: {message}")]
pub struct WorkflowExecutionError {
    pub node_id: String,
    pub node_type: String,
    pub message: String,
    /// True when re-running unchanged cannot succeed.
    pub non_retriable: bool,
    /// Checkpoint as recorded when the run halted.
    pub checkpoint: Checkpoint,
    /// Raw text of templates that failed to bind, if that was the cause.
    pub unresolved_templates: Vec<String>,
    pub upstream: Vec<UpstreamDiagnostic>,
}

impl WorkflowExecutionError {
    /// Builds the report for a failed node, reading the checkpoint and any
    /// upstream diagnostics from `store`.
    pub fn from_node_error(node_id: &str, node_type: &str, error: &NodeError, store: &dyn StoreAccess) -> Self {
        let (unresolved_templates, upstream) = match error {
            NodeError::UnresolvedTemplate {
                templates,
                referenced_nodes,
            } => (
                templates.clone(),
                referenced_nodes.iter().flat_map(|upstream_id| upstream_diagnostics(upstream_id, store)).collect(),
            ),
            _ => (Vec::new(), Vec::new()),
        };

        Self {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            message: error.to_string(),
            non_retriable: error.is_non_retriable(),
            checkpoint: load_checkpoint(store),
            unresolved_templates,
            upstream,
        }
    }

    /// Graph-level failure that is not attributable to a node phase.
    pub fn graph(node_id: &str, node_type: &str, message: impl Into<String>, store: &dyn StoreAccess) -> Self {
        Self {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            message: message.into(),
            non_retriable: true,
            checkpoint: load_checkpoint(store),
            unresolved_templates: Vec::new(),
            upstream: Vec::new(),
        }
    }
}

fn upstream_diagnostics(upstream_id: &str, store: &dyn StoreAccess) -> Vec<UpstreamDiagnostic> {
    let Some(namespace) = store.get(upstream_id).and_then(|value| value.as_object()) else {
        return Vec::new();
    };
    DIAGNOSTIC_FIELDS
        .iter()
        .filter_map(|field| {
            let text = namespace.get(*field)?.as_str()?.trim();
            (!text.is_empty()).then(|| UpstreamDiagnostic {
                node_id: upstream_id.to_string(),
                field: field.to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SharedStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn unresolved_template_failures_capture_upstream_stderr() {
        let mut store = SharedStore::new();
        store.set("shell", json!({"stdout": "", "stderr": "permission denied\n", "exit_code": 1}));
        let error = NodeError::UnresolvedTemplate {
            templates: vec!["${shell.stdout.items}".into()],
            referenced_nodes: BTreeSet::from(["shell".to_string()]),
        };

        let report = WorkflowExecutionError::from_node_error("parse", "llm", &error, &store);

        assert_eq!(report.unresolved_templates, vec!["${shell.stdout.items}"]);
        assert_eq!(
            report.upstream,
            vec![UpstreamDiagnostic {
                node_id: "shell".into(),
                field: "stderr".into(),
                text: "permission denied".into(),
            }]
        );
        assert!(!report.non_retriable);
        assert!(report.to_string().contains("node 'parse' (llm) failed"));
    }

    #[test]
    fn configuration_failures_are_non_retriable() {
        let store = SharedStore::new();
        let report = WorkflowExecutionError::from_node_error("n", "workflow", &NodeError::configuration("bad"), &store);
        assert!(report.non_retriable);
        assert!(report.upstream.is_empty());
    }
}
