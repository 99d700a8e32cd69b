//! End-to-end execution of one workflow.
//!
//! [`execute_workflow`] is the entry point embedders call: validate, prepare
//! inputs, compile, run, promote outputs, then report the outcome with its
//! tri-state status and the runtime validator's missing-path report.

use std::sync::Arc;

use indexmap::IndexMap;
use pathflow_types::WorkflowIr;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};
use tracing::{info, warn};

use crate::{
    compiler::FlowCompiler,
    config::EngineConfig,
    error::{EngineError, WorkflowExecutionError},
    executor::ExecutionObserver,
    registry::NodeRegistry,
    runtime_validation::{MissingTemplatePath, find_missing_paths},
    store::{SharedStore, StoreAccess, WORKFLOW_STACK_KEY},
    validation::validate_workflow,
    workflow::{
        inputs::prepare_inputs,
        outputs::promote_outputs,
        store::WorkflowStore,
        tracker::{Checkpoint, ExecutionTracker, RunStatus, derive_status, format_execution_error, load_checkpoint},
    },
};

/// Everything a run needs besides the IR and the registry.
#[derive(Clone, Default)]
pub struct ExecutionRequest {
    /// Caller-supplied workflow inputs.
    pub params: JsonMap<String, Value>,
    pub config: EngineConfig,
    pub workflow_store: Option<Arc<dyn WorkflowStore>>,
    pub observer: Option<Arc<dyn ExecutionObserver>>,
    /// Store from an earlier run; its checkpoint lets unchanged completed nodes be skipped.
    pub initial_store: Option<SharedStore>,
    /// Nodes an external repair pass changed since the earlier run.
    pub repaired_nodes: Vec<String>,
    /// Identity of this workflow for circular-invocation checks in nested runs.
    pub workflow_name: Option<String>,
}

impl ExecutionRequest {
    pub fn new(params: JsonMap<String, Value>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_workflow_store(mut self, workflow_store: Arc<dyn WorkflowStore>) -> Self {
        self.workflow_store = Some(workflow_store);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Resumes from `store`, marking `repaired_nodes` as modified.
    pub fn resuming<I, S>(mut self, store: SharedStore, repaired_nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_store = Some(store);
        self.repaired_nodes = repaired_nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn named(mut self, workflow_name: impl Into<String>) -> Self {
        self.workflow_name = Some(workflow_name.into());
        self
    }
}

/// Result of a run that got past validation, input preparation and compilation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    /// Final shared store, including bookkeeping keys.
    pub store: SharedStore,
    /// Promoted outputs (empty when the run failed).
    pub outputs: IndexMap<String, Value>,
    pub checkpoint: Checkpoint,
    pub error: Option<WorkflowExecutionError>,
    /// Templates that did not resolve against the final store.
    pub missing_paths: Vec<MissingTemplatePath>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Failure report combining the execution error and the missing paths.
    pub fn error_report(&self) -> Option<String> {
        self.error.as_ref().map(|error| format_execution_error(error, &self.missing_paths))
    }
}

/// Validates, compiles and runs `ir`.
///
/// Validation issues, invalid inputs and compilation errors are returned as
/// `Err` before anything runs. A node failure is not an `Err`: it yields an
/// outcome with status `failed` carrying the error and the checkpoint.
pub fn execute_workflow(ir: &WorkflowIr, registry: Arc<NodeRegistry>, request: ExecutionRequest) -> Result<ExecutionOutcome, EngineError> {
    let issues = validate_workflow(ir, Some(registry.as_ref()));
    if !issues.is_empty() {
        warn!(issues = issues.len(), "workflow failed validation");
        return Err(EngineError::Validation(issues));
    }

    let prepared = prepare_inputs(ir, &request.params).map_err(EngineError::InvalidInputs)?;
    let mut store = request.initial_store.unwrap_or_default();
    for (key, value) in prepared {
        store.set(&key, value);
    }
    if let Some(workflow_name) = &request.workflow_name {
        let mut stack = store.get(WORKFLOW_STACK_KEY).and_then(Value::as_array).cloned().unwrap_or_default();
        if !stack.iter().any(|entry| entry.as_str() == Some(workflow_name.as_str())) {
            stack.push(Value::String(workflow_name.clone()));
        }
        store.set(WORKFLOW_STACK_KEY, Value::Array(stack));
    }
    ExecutionTracker::new(&mut store).mark_modified(request.repaired_nodes.iter().map(String::as_str));

    let mut compiler = FlowCompiler::new(registry).with_config(request.config);
    if let Some(workflow_store) = request.workflow_store {
        compiler = compiler.with_workflow_store(workflow_store);
    }
    if let Some(observer) = request.observer {
        compiler = compiler.with_observer(observer);
    }
    let mut graph = compiler.compile(ir)?;

    let (outputs, error) = match graph.run(&mut store) {
        Ok(()) => (promote_outputs(ir, &mut store), None),
        Err(error) => (IndexMap::new(), Some(error)),
    };
    let missing_paths = find_missing_paths(ir, &store);
    let status = derive_status(&store, error.is_some());
    let checkpoint = load_checkpoint(&store);
    info!(
        status = %status,
        completed = checkpoint.completed_nodes.len(),
        missing_paths = missing_paths.len(),
        "workflow execution finished"
    );

    Ok(ExecutionOutcome {
        status,
        store,
        outputs,
        checkpoint,
        error,
        missing_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::NodeError, nodes::FnNode, validation::ValidationCode};
    use pathflow_types::{EdgeSpec, InputSpec, NodeSpec, OutputSpec};
    use serde_json::json;

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry.register("echo", FnNode::new(|params| Ok(Value::Object(params.clone()))).into_factory());
        registry.register("fail", FnNode::new(|_| Err(NodeError::failed("boom"))).into_factory());
        Arc::new(registry)
    }

    fn node(id: &str, node_type: &str, params: Value) -> NodeSpec {
        NodeSpec {
            id: id.into(),
            r#type: node_type.into(),
            params: params.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    #[test]
    fn validation_issues_abort_before_running() {
        let ir = WorkflowIr {
            ir_version: "1".into(),
            nodes: vec![node("a", "missing_type", json!({}))],
            ..Default::default()
        };
        match execute_workflow(&ir, registry(), ExecutionRequest::default()) {
            Err(EngineError::Validation(issues)) => {
                let codes: Vec<ValidationCode> = issues.iter().map(|issue| issue.code).collect();
                assert_eq!(codes, vec![ValidationCode::InvalidIrVersion, ValidationCode::UnknownNodeType]);
            }
            other => panic!("expected validation failure, got {:?}", other.map(|outcome| outcome.status)),
        }
    }

    #[test]
    fn missing_inputs_are_reported_together() {
        let mut ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("a", "echo", json!({"x": "${first}", "y": "${second}"}))],
            ..Default::default()
        };
        ir.inputs.insert("first".into(), InputSpec::default());
        ir.inputs.insert("second".into(), InputSpec::default());
        match execute_workflow(&ir, registry(), ExecutionRequest::default()) {
            Err(EngineError::InvalidInputs(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected input failure, got {:?}", other.map(|outcome| outcome.status)),
        }
    }

    #[test]
    fn failed_runs_carry_checkpoint_and_report() {
        let mut ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("first", "echo", json!({"value": 1})), node("second", "fail", json!({}))],
            edges: vec![EdgeSpec::new("first", "second")],
            ..Default::default()
        };
        ir.outputs.insert(
            "result".into(),
            OutputSpec {
                source: Some("${second.value}".into()),
                ..Default::default()
            },
        );

        let outcome = execute_workflow(&ir, registry(), ExecutionRequest::default()).expect("outcome");

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.checkpoint.completed_nodes, vec!["first"]);
        assert!(outcome.outputs.is_empty());
        assert_eq!(outcome.missing_paths.len(), 1);
        let report = outcome.error_report().expect("report");
        assert!(report.starts_with("Workflow failed at node 'second' (fail): boom"));
        assert!(report.contains("Missing template paths:"));
    }

    #[test]
    fn named_runs_seed_the_workflow_stack() {
        let ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("a", "echo", json!({}))],
            ..Default::default()
        };
        let outcome = execute_workflow(&ir, registry(), ExecutionRequest::default().named("main")).expect("outcome");
        assert!(outcome.is_success());
        assert_eq!(outcome.store.get(WORKFLOW_STACK_KEY), Some(&json!(["main"])));
    }
}
