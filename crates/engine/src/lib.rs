//! # Pathflow Engine
//!
//! The Pathflow Engine compiles declarative workflow IR into an executable
//! graph of nodes and runs it against a shared key/value store. Nodes talk to
//! each other only through `${node.field}` templates resolved against that
//! store, which lets one workflow be validated statically before it runs and
//! diagnosed precisely after it fails.
//!
//! ## Key Features
//!
//! - **Static validation**: structure, template syntax, and data flow (cycles,
//!   upstream-only references, declared outputs) with "did you mean" hints
//! - **Namespaced outputs**: every node writes under its own id, so two nodes
//!   of the same type never clobber each other
//! - **Batch processing**: fan a node out over an array, sequentially or in
//!   parallel, with per-item isolation and aggregate results
//! - **Nested workflows**: a `workflow` node runs a child workflow with mapped,
//!   isolated, scoped, or shared storage and recursion guards
//! - **Checkpoints**: completed nodes are recorded so a repaired workflow can
//!   resume, and every run reports `success`, `degraded`, or `failed`
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pathflow_engine::{ExecutionRequest, FnNode, NodeRegistry, RunStatus, execute_workflow, load_workflow_file};
//! use serde_json::{Value, json};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let workflow_path = temp_dir.path().join("greet.json");
//! std::fs::write(&workflow_path, r#"{
//!     "ir_version": "0.1.0",
//!     "inputs": {"name": {"type": "string"}},
//!     "nodes": [{"id": "greet", "type": "echo", "params": {"text": "Hello ${name}"}}],
//!     "outputs": {"greeting": {"source": "${greet.text}"}}
//! }"#)?;
//!
//! let mut registry = NodeRegistry::new();
//! registry.register("echo", FnNode::new(|params| Ok(Value::Object(params.clone()))).into_factory());
//!
//! let ir = load_workflow_file(&workflow_path)?;
//! let params = json!({"name": "Ada"}).as_object().cloned().unwrap_or_default();
//! let outcome = execute_workflow(&ir, Arc::new(registry), ExecutionRequest::new(params))?;
//!
//! assert_eq!(outcome.status, RunStatus::Success);
//! assert_eq!(outcome.outputs["greeting"], json!("Hello Ada"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`templates`** / **`resolve`**: `${...}` parsing and resolution against a store view
//! - **`validation`**: static IR checks returning every issue at once
//! - **`compiler`**: IR to [`ExecutableGraph`], wrapping each node in the executor layers
//! - **`executor`**: instrumentation, namespacing, batching, and parameter binding wrappers
//! - **`workflow`**: inputs, outputs, tracking, nested workflows, and the async driver
//! - **`runtime_validation`**: post-run report of template paths that did not exist

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod compiler;
pub mod config;
pub mod error;
pub mod execution;
pub mod executor;
pub mod field_paths;
pub mod node;
pub mod nodes;
pub mod registry;
pub mod resolve;
pub mod runtime_validation;
pub mod store;
pub mod templates;
pub mod validation;
pub mod workflow;

pub use pathflow_types::WorkflowIr;

// Re-export commonly used types for convenience
pub use compiler::{ExecutableGraph, FlowCompiler};
pub use config::EngineConfig;
pub use error::{CompilationError, EngineError, WorkflowExecutionError};
pub use execution::{ExecutionOutcome, ExecutionRequest, execute_workflow};
pub use executor::{ExecutionObserver, NodeReport, NodeRunStatus};
pub use node::{Node, NodeError, Runnable};
pub use nodes::FnNode;
pub use registry::{NodeFactory, NodeInterface, NodeRegistry};
pub use resolve::TemplateMode;
pub use runtime_validation::{MissingTemplatePath, find_missing_paths};
pub use store::{SharedStore, StoreAccess};
pub use validation::{ValidationCode, ValidationIssue, validate_workflow};
pub use workflow::{
    nested::StorageMode,
    runner::{WorkflowRunEvent, drive_workflow_run},
    store::{InMemoryWorkflowStore, WorkflowStore},
    tracker::{Checkpoint, RunStatus},
};

/// Loads workflow IR from the filesystem with automatic format detection.
///
/// Files ending in `.json` are parsed as JSON. Everything else, including
/// files without an extension, is parsed as YAML.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not deserialize into
/// [`WorkflowIr`]. Structural problems beyond the serde shape are left to
/// [`validate_workflow`].
pub fn load_workflow_file(file_path: impl AsRef<Path>) -> Result<WorkflowIr> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse workflow JSON: {}", file_path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow YAML: {}", file_path.display()))
    }
}
