//! Static IR validation.
//!
//! [`validate_workflow`] never stops at the first problem: every check runs and
//! every issue is returned, so a repair loop sees the whole picture after one
//! round trip. Checks are grouped by concern:
//!
//! - [`schema`]: required fields, identifier patterns, edge endpoints, batch and nested-workflow shape
//! - [`templates`]: template syntax in params, batch items and output sources
//! - [`data_flow`]: cycles, output references, and param references to unknown or later nodes

mod data_flow;
mod schema;
mod templates;

use std::fmt;

use pathflow_types::WorkflowIr;
use serde::{Deserialize, Serialize};

use crate::registry::NodeRegistry;

/// Kind of validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    MissingIrVersion,
    InvalidIrVersion,
    NoNodes,
    InvalidNodeId,
    DuplicateNodeId,
    MissingNodeType,
    UnknownNodeType,
    UnknownEdgeEndpoint,
    DuplicateEdgeAction,
    NamespaceCollision,
    UnknownStartNode,
    InvalidBatch,
    InvalidNestedWorkflow,
    Cycle,
    MissingOutputSource,
    UnknownOutputNode,
    UnknownOutputKey,
    UnknownReference,
    ReferenceNotUpstream,
    UnclosedTemplate,
    MalformedTemplate,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = serde_json::to_value(self)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        formatter.write_str(&label)
    }
}

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
    /// Location inside the IR (`nodes[2].params.url`, `outputs.result.source`).
    pub path: String,
    /// Nearest valid alternative, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(code: ValidationCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        if let Some(suggestion) = &suggestion {
            self.message = format!("{}; did you mean '{}'?", self.message, suggestion);
        }
        self.suggestion = suggestion;
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[{}] {}: {}", self.code, self.path, self.message)
    }
}

/// Runs every static check and returns all issues found.
///
/// Registry-dependent checks (unknown node types, declared output keys) only
/// run when `registry` is given.
pub fn validate_workflow(ir: &WorkflowIr, registry: Option<&NodeRegistry>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    schema::check(ir, registry, &mut issues);
    templates::check(ir, &mut issues);
    data_flow::check(ir, registry, &mut issues);
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_in_snake_case() {
        assert_eq!(ValidationCode::UnknownOutputNode.to_string(), "unknown_output_node");
    }

    #[test]
    fn suggestions_extend_the_message() {
        let issue = ValidationIssue::new(ValidationCode::UnknownOutputNode, "outputs.x.source", "unknown node 'fetc'")
            .with_suggestion(Some("fetch".into()));
        assert_eq!(issue.message, "unknown node 'fetc'; did you mean 'fetch'?");
        assert_eq!(issue.to_string(), "[unknown_output_node] outputs.x.source: unknown node 'fetc'; did you mean 'fetch'?");
    }
}
