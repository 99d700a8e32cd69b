//! Nested workflow execution: a node of type `workflow` runs another workflow
//! through the same compiler.
//!
//! The child is named by `workflow_ref` (looked up in the compiler's
//! [`WorkflowStore`](crate::workflow::store::WorkflowStore)) or embedded as
//! `workflow_ir`. How the child's store relates to the parent's is chosen by
//! `storage_mode`:
//!
//! | mode | child store |
//! | --- | --- |
//! | `mapped` (default) | only the `param_mapping` values |
//! | `isolated` | empty |
//! | `scoped` | parent root keys starting with `scope_prefix`, prefix stripped, plus the mapping |
//! | `shared` | the parent's root store itself; the parent checkpoint is restored afterwards |
//!
//! Results come back through `output_mapping` (child store path to key in the
//! node's namespace) or, without one, as the child's declared outputs.
//! Depth and circular-invocation guards run before anything is compiled.

use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use indexmap::IndexMap;
use pathflow_types::{DEFAULT_ACTION, NESTED_WORKFLOW_TYPE, NodeSpec, WorkflowIr};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use tracing::{info, warn};

use crate::{
    compiler::FlowCompiler,
    error::WorkflowExecutionError,
    node::{Node, NodeError},
    resolve::{resolve, resolve_value},
    store::{EXECUTION_KEY, LLM_CALLS_KEY, SharedStore, StoreAccess, WARNINGS_KEY, WORKFLOW_DEPTH_KEY, WORKFLOW_STACK_KEY, is_bookkeeping_key},
    templates::extract_references,
    validation::validate_workflow,
    workflow::{inputs::prepare_inputs, outputs::promote_outputs, tracker::ExecutionTracker},
};

/// Params the nested executor interprets itself instead of having them bound.
pub const NESTED_SKIPPED_PARAMS: &[&str] = &["workflow_ir", "param_mapping", "output_mapping"];

/// True for params of a `workflow` node whose strings belong to the child
/// workflow (inline IR, child store paths) rather than the parent store.
pub fn is_child_scoped_param(node: &NodeSpec, key: &str) -> bool {
    node.r#type == NESTED_WORKFLOW_TYPE && matches!(key, "workflow_ir" | "output_mapping")
}

/// How a child workflow's store relates to its parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Mapped,
    Isolated,
    Scoped,
    Shared,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StorageMode::Mapped => "mapped",
            StorageMode::Isolated => "isolated",
            StorageMode::Scoped => "scoped",
            StorageMode::Shared => "shared",
        };
        formatter.write_str(label)
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "mapped" => Ok(StorageMode::Mapped),
            "isolated" => Ok(StorageMode::Isolated),
            "scoped" => Ok(StorageMode::Scoped),
            "shared" => Ok(StorageMode::Shared),
            other => Err(format!("unknown storage mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
enum WorkflowSource {
    Reference(String),
    Inline(Box<WorkflowIr>),
}

#[derive(Debug, Deserialize)]
struct RawNestedParams {
    #[serde(default)]
    workflow_ref: Option<String>,
    #[serde(default)]
    workflow_ir: Option<WorkflowIr>,
    #[serde(default)]
    param_mapping: Option<JsonMap<String, Value>>,
    #[serde(default)]
    output_mapping: Option<IndexMap<String, String>>,
    #[serde(default)]
    storage_mode: Option<StorageMode>,
    #[serde(default)]
    scope_prefix: Option<String>,
}

#[derive(Debug, Clone)]
struct NestedConfig {
    source: WorkflowSource,
    param_mapping: JsonMap<String, Value>,
    output_mapping: IndexMap<String, String>,
    storage_mode: StorageMode,
    scope_prefix: String,
}

impl NestedConfig {
    fn from_params(params: JsonMap<String, Value>) -> Result<Self, NodeError> {
        let raw: RawNestedParams =
            serde_json::from_value(Value::Object(params)).map_err(|error| NodeError::configuration(format!("invalid workflow node params: {error}")))?;
        let source = match (raw.workflow_ref, raw.workflow_ir) {
            (Some(name), None) => WorkflowSource::Reference(name),
            (None, Some(ir)) => WorkflowSource::Inline(Box::new(ir)),
            _ => return Err(NodeError::configuration("exactly one of workflow_ref or workflow_ir must be set")),
        };
        let storage_mode = raw.storage_mode.unwrap_or_default();
        let scope_prefix = match (storage_mode, raw.scope_prefix) {
            (StorageMode::Scoped, None) => return Err(NodeError::configuration("scoped storage mode requires scope_prefix")),
            (_, prefix) => prefix.unwrap_or_default(),
        };
        Ok(Self {
            source,
            param_mapping: raw.param_mapping.unwrap_or_default(),
            output_mapping: raw.output_mapping.unwrap_or_default(),
            storage_mode,
            scope_prefix,
        })
    }
}

/// Position of an invocation in the nesting chain.
struct Invocation {
    identity: String,
    depth: usize,
    stack: Vec<String>,
}

impl Invocation {
    fn child_depth(&self) -> Value {
        Value::from(self.depth + 1)
    }

    fn child_stack(&self) -> Value {
        self.stack.iter().chain([&self.identity]).cloned().map(Value::String).collect()
    }
}

/// Three-phase node that runs a child workflow.
pub struct NestedWorkflowNode {
    compiler: FlowCompiler,
    node_id: String,
    node_ids: Arc<[String]>,
    config: Result<NestedConfig, NodeError>,
}

impl NestedWorkflowNode {
    pub fn new(compiler: FlowCompiler, node_id: impl Into<String>, node_ids: Arc<[String]>) -> Self {
        Self {
            compiler,
            node_id: node_id.into(),
            node_ids,
            config: Err(NodeError::configuration("workflow node params were never set")),
        }
    }

    fn config(&self) -> Result<&NestedConfig, NodeError> {
        self.config.as_ref().map_err(Clone::clone)
    }

    fn identity(&self, config: &NestedConfig) -> String {
        match &config.source {
            WorkflowSource::Reference(name) => name.clone(),
            WorkflowSource::Inline(_) => format!("inline:{}", self.node_id),
        }
    }

    /// Applies the depth and circular-invocation guards.
    fn invocation(&self, config: &NestedConfig, store: &dyn StoreAccess) -> Result<Invocation, NodeError> {
        let identity = self.identity(config);
        let depth = store.get(WORKFLOW_DEPTH_KEY).and_then(Value::as_u64).unwrap_or(0) as usize;
        let max_depth = self.compiler.config().max_nesting_depth;
        if depth + 1 > max_depth {
            return Err(NodeError::non_retriable(format!(
                "maximum workflow nesting depth {max_depth} exceeded invoking '{identity}'"
            )));
        }

        let stack: Vec<String> = store
            .get(WORKFLOW_STACK_KEY)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(|entry| entry.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if stack.contains(&identity) {
            let chain = stack.iter().chain([&identity]).cloned().collect::<Vec<_>>().join(" -> ");
            return Err(NodeError::non_retriable(format!("circular workflow invocation: {chain}")));
        }

        Ok(Invocation { identity, depth, stack })
    }

    fn resolve_mapping(&self, config: &NestedConfig, store: &dyn StoreAccess) -> Result<JsonMap<String, Value>, NodeError> {
        let resolved = resolve_value(&Value::Object(config.param_mapping.clone()), store);
        if !resolved.is_complete() {
            let referenced_nodes: BTreeSet<String> = resolved
                .unresolved
                .iter()
                .flat_map(|template| extract_references(template, self.node_ids.iter().map(String::as_str)))
                .collect();
            return Err(NodeError::UnresolvedTemplate {
                templates: resolved.unresolved,
                referenced_nodes,
            });
        }
        match resolved.value {
            Value::Object(mapped) => Ok(mapped),
            _ => Ok(JsonMap::new()),
        }
    }

    /// Loads, validates and compiles the child workflow.
    fn load_child(&self, config: &NestedConfig, identity: &str) -> Result<WorkflowIr, NodeError> {
        let ir = match &config.source {
            WorkflowSource::Inline(ir) => ir.as_ref().clone(),
            WorkflowSource::Reference(name) => {
                let Some(workflow_store) = self.compiler.workflow_store() else {
                    return Err(NodeError::configuration(format!("no workflow store configured to load '{name}'")));
                };
                workflow_store
                    .load(name)
                    .map_err(|error| NodeError::failed(format!("failed to load workflow '{name}': {error:#}")))?
            }
        };

        let issues = validate_workflow(&ir, Some(self.compiler.registry()));
        if !issues.is_empty() {
            let summary = issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            return Err(NodeError::configuration(format!("child workflow '{identity}' is invalid: {summary}")));
        }
        Ok(ir)
    }

    fn child_failure(identity: &str, error: WorkflowExecutionError) -> NodeError {
        NodeError::NestedWorkflow {
            workflow: identity.to_string(),
            node_id: error.node_id,
            message: error.message,
        }
    }

    /// Writes child results into the node's store view.
    fn write_results(&self, config: &NestedConfig, store: &mut dyn StoreAccess, child: &dyn StoreAccess, outputs: IndexMap<String, Value>) {
        if config.output_mapping.is_empty() {
            for (name, value) in outputs {
                store.set(&name, value);
            }
            return;
        }
        for (child_path, target) in &config.output_mapping {
            match resolve(child_path, child) {
                Some(value) => store.set(target, value),
                None => {
                    warn!(node_id = %self.node_id, child_path = %child_path, target = %target, "output mapping did not resolve");
                    ExecutionTracker::new(store)
                        .record_warning(&format!("{}.{target}", self.node_id), &format!("child path '{child_path}' did not resolve"));
                }
            }
        }
    }

    /// Runs the child directly on the parent's root store.
    fn run_shared(&self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        let config = self.config()?.clone();
        let invocation = self.invocation(&config, store)?;
        let mapped = self.resolve_mapping(&config, store)?;
        let ir = self.load_child(&config, &invocation.identity)?;
        let mut graph = self
            .compiler
            .without_observer()
            .compile(&ir)
            .map_err(|error| NodeError::configuration(error.to_string()))?;

        let mut child_params = mapped.clone();
        for name in ir.inputs.keys() {
            if !child_params.contains_key(name)
                && let Some(value) = store.get(name)
            {
                child_params.insert(name.clone(), value.clone());
            }
        }
        let prepared = prepare_inputs(&ir, &child_params)
            .map_err(|errors| NodeError::configuration(format!("invalid inputs for '{}': {}", invocation.identity, errors.join("; "))))?;

        let (result, outputs, child_view) = {
            let Some(root) = store.root_store_mut() else {
                return Err(NodeError::configuration("shared storage mode needs the live root store; it is not available inside batch items"));
            };
            let saved: Vec<(&str, Option<Value>)> = [EXECUTION_KEY, WORKFLOW_DEPTH_KEY, WORKFLOW_STACK_KEY]
                .into_iter()
                .map(|key| (key, root.remove(key)))
                .collect();
            root.set(WORKFLOW_DEPTH_KEY, invocation.child_depth());
            root.set(WORKFLOW_STACK_KEY, invocation.child_stack());
            for (key, value) in prepared {
                root.set(&key, value);
            }

            info!(node_id = %self.node_id, workflow = %invocation.identity, mode = %config.storage_mode, "running nested workflow");
            let result = graph.run(root);
            let outputs = if result.is_ok() { promote_outputs(&ir, root) } else { IndexMap::new() };
            let child_view = SharedStore::from_map(root.as_map().clone());

            for (key, value) in saved {
                root.remove(key);
                if let Some(value) = value {
                    root.set(key, value);
                }
            }
            (result, outputs, child_view)
        };

        result.map_err(|error| Self::child_failure(&invocation.identity, error))?;
        self.write_results(&config, store, &child_view, outputs);
        Ok(DEFAULT_ACTION.to_string())
    }
}

impl Node for NestedWorkflowNode {
    fn set_params(&mut self, params: JsonMap<String, Value>) {
        self.config = NestedConfig::from_params(params);
    }

    fn prep(&self, store: &dyn StoreAccess) -> Result<Value, NodeError> {
        let config = self.config()?;
        let invocation = self.invocation(config, store)?;
        let mapped = self.resolve_mapping(config, store)?;

        let mut child_store = match config.storage_mode {
            StorageMode::Isolated => {
                if !mapped.is_empty() {
                    warn!(node_id = %self.node_id, "isolated storage mode ignores param_mapping");
                }
                JsonMap::new()
            }
            StorageMode::Scoped => {
                let mut scoped = JsonMap::new();
                for key in store.keys() {
                    if is_bookkeeping_key(&key) {
                        continue;
                    }
                    if let Some(stripped) = key.strip_prefix(config.scope_prefix.as_str())
                        && !stripped.is_empty()
                        && let Some(value) = store.get(&key)
                    {
                        scoped.insert(stripped.to_string(), value.clone());
                    }
                }
                scoped.extend(mapped);
                scoped
            }
            StorageMode::Mapped | StorageMode::Shared => mapped,
        };
        child_store.insert(WORKFLOW_DEPTH_KEY.to_string(), invocation.child_depth());
        child_store.insert(WORKFLOW_STACK_KEY.to_string(), invocation.child_stack());

        let mut prep = JsonMap::new();
        prep.insert("workflow".to_string(), Value::String(invocation.identity));
        prep.insert("store".to_string(), Value::Object(child_store));
        Ok(Value::Object(prep))
    }

    fn exec(&self, prep: &Value) -> Result<Value, NodeError> {
        let config = self.config()?;
        let identity = prep.get("workflow").and_then(Value::as_str).unwrap_or_default().to_string();
        let mut child_store = prep.get("store").and_then(Value::as_object).cloned().unwrap_or_default();
        let ir = self.load_child(config, &identity)?;

        let params: JsonMap<String, Value> = child_store
            .iter()
            .filter(|(key, _)| !is_bookkeeping_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let prepared = prepare_inputs(&ir, &params)
            .map_err(|errors| NodeError::configuration(format!("invalid inputs for '{identity}': {}", errors.join("; "))))?;
        child_store.extend(prepared);

        let mut graph = self
            .compiler
            .without_observer()
            .compile(&ir)
            .map_err(|error| NodeError::configuration(error.to_string()))?;
        let mut child = SharedStore::from_map(child_store);
        info!(node_id = %self.node_id, workflow = %identity, mode = %config.storage_mode, "running nested workflow");
        graph.run(&mut child).map_err(|error| Self::child_failure(&identity, error))?;
        let outputs = promote_outputs(&ir, &mut child);

        let mut result = JsonMap::new();
        result.insert("outputs".to_string(), Value::Object(outputs.into_iter().collect()));
        result.insert("store".to_string(), Value::Object(child.into_map()));
        Ok(Value::Object(result))
    }

    fn post(&self, store: &mut dyn StoreAccess, _prep: &Value, exec: Value) -> Result<String, NodeError> {
        let config = self.config()?;
        let Value::Object(mut result) = exec else {
            return Err(NodeError::failed("nested workflow produced no result"));
        };
        let child = match result.remove("store") {
            Some(Value::Object(entries)) => SharedStore::from_map(entries),
            _ => SharedStore::new(),
        };
        let outputs: IndexMap<String, Value> = match result.remove("outputs") {
            Some(Value::Object(entries)) => entries.into_iter().collect(),
            _ => IndexMap::new(),
        };
        self.write_results(config, store, &child, outputs);

        if let Some(Value::Array(child_calls)) = child.get(LLM_CALLS_KEY) {
            let mut calls = store.get(LLM_CALLS_KEY).and_then(Value::as_array).cloned().unwrap_or_default();
            calls.extend(child_calls.iter().cloned());
            store.set(LLM_CALLS_KEY, Value::Array(calls));
        }
        if let Some(Value::Object(child_warnings)) = child.get(WARNINGS_KEY)
            && !child_warnings.is_empty()
        {
            ExecutionTracker::new(store).record_warning(
                &self.node_id,
                &format!("child workflow completed with {} warning(s)", child_warnings.len()),
            );
        }
        Ok(DEFAULT_ACTION.to_string())
    }

    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        if matches!(&self.config, Ok(config) if config.storage_mode == StorageMode::Shared) {
            return self.run_shared(store);
        }
        let prep = self.prep(store)?;
        let exec = self.exec(&prep)?;
        self.post(store, &prep, exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EngineConfig,
        nodes::FnNode,
        registry::NodeRegistry,
        workflow::{
            store::InMemoryWorkflowStore,
            tracker::{load_checkpoint, warnings},
        },
    };
    use pathflow_types::{EdgeSpec, InputSpec, OutputSpec};
    use serde_json::json;

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry.register("echo", FnNode::new(|params| Ok(Value::Object(params.clone()))).into_factory());
        registry.register("fail", FnNode::new(|_| Err(NodeError::failed("child exploded"))).into_factory());
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

    /// Child that echoes its `text` input and exposes it as output `echoed`.
    fn echo_child() -> WorkflowIr {
        let mut ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("say", "echo", json!({"value": "${text}"}))],
            ..Default::default()
        };
        ir.inputs.insert("text".into(), InputSpec::default());
        ir.outputs.insert(
            "echoed".into(),
            OutputSpec {
                source: Some("${say.value}".into()),
                ..Default::default()
            },
        );
        ir
    }

    fn parent(nested_params: Value) -> WorkflowIr {
        WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("source", "echo", json!({"value": "hello"})), node("call", "workflow", nested_params)],
            edges: vec![EdgeSpec::new("source", "call")],
            ..Default::default()
        }
    }

    fn compiler_with(workflows: &[(&str, WorkflowIr)], config: EngineConfig) -> FlowCompiler {
        let mut store = InMemoryWorkflowStore::new();
        for (name, ir) in workflows {
            store.insert(*name, ir.clone());
        }
        FlowCompiler::new(registry()).with_workflow_store(Arc::new(store)).with_config(config)
    }

    fn run(compiler: &FlowCompiler, ir: &WorkflowIr, store: &mut SharedStore) -> Result<(), WorkflowExecutionError> {
        compiler.compile(ir).expect("compile").run(store)
    }

    #[test]
    fn mapped_mode_promotes_child_outputs_into_namespace() {
        let compiler = compiler_with(&[("echo_child", echo_child())], EngineConfig::default());
        let ir = parent(json!({"workflow_ref": "echo_child", "param_mapping": {"text": "${source.value}"}}));
        let mut store = SharedStore::new();

        run(&compiler, &ir, &mut store).expect("run");

        assert_eq!(store.get("call"), Some(&json!({"echoed": "hello"})));
        assert_eq!(store.get(WORKFLOW_DEPTH_KEY), None);
    }

    #[test]
    fn output_mapping_picks_child_store_paths() {
        let compiler = compiler_with(&[], EngineConfig::default());
        let ir = parent(json!({
            "workflow_ir": serde_json::to_value(echo_child()).expect("child json"),
            "param_mapping": {"text": "${source.value}"},
            "output_mapping": {"say.value": "greeting", "say.missing": "other"}
        }));
        let mut store = SharedStore::new();

        run(&compiler, &ir, &mut store).expect("run");

        assert_eq!(store.get("call"), Some(&json!({"greeting": "hello"})));
        assert!(warnings(&store).contains_key("call.other"));
    }

    #[test]
    fn scoped_mode_exposes_prefixed_root_keys() {
        let mut child = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("peek", "echo", json!({"seen": "${data}"}))],
            ..Default::default()
        };
        child.outputs.insert(
            "seen".into(),
            OutputSpec {
                source: Some("peek.seen".into()),
                ..Default::default()
            },
        );
        let compiler = compiler_with(&[("scoped", child)], EngineConfig::default());
        let ir = parent(json!({"workflow_ref": "scoped", "storage_mode": "scoped", "scope_prefix": "cfg_"}));
        let mut store = SharedStore::from_map(json!({"cfg_data": "v", "other": 1}).as_object().cloned().unwrap_or_default());

        run(&compiler, &ir, &mut store).expect("run");

        assert_eq!(store.get("call"), Some(&json!({"seen": "v"})));
    }

    #[test]
    fn isolated_mode_hides_parent_values() {
        let compiler = compiler_with(&[("echo_child", echo_child())], EngineConfig::default());
        let ir = parent(json!({"workflow_ref": "echo_child", "storage_mode": "isolated", "param_mapping": {"text": "x"}}));
        let mut store = SharedStore::new();

        let error = run(&compiler, &ir, &mut store).expect_err("child input missing");
        assert_eq!(error.node_id, "call");
        assert!(error.message.contains("missing required input 'text'"));
    }

    #[test]
    fn circular_invocation_is_rejected_before_running() {
        let looping = parent(json!({"workflow_ref": "looping"}));
        let compiler = compiler_with(&[("looping", looping.clone())], EngineConfig::default());
        let mut store = SharedStore::from_map(json!({WORKFLOW_STACK_KEY: ["looping"]}).as_object().cloned().unwrap_or_default());

        let error = run(&compiler, &looping, &mut store).expect_err("circular");
        assert!(error.non_retriable);
        assert!(error.message.contains("circular workflow invocation: looping -> looping"));
    }

    #[test]
    fn depth_limit_stops_runaway_nesting() {
        let middle = parent(json!({"workflow_ref": "leaf"}));
        let config = EngineConfig {
            max_nesting_depth: 1,
            ..EngineConfig::default()
        };
        let compiler = compiler_with(&[("middle", middle), ("leaf", echo_child())], config);
        let top = parent(json!({"workflow_ref": "middle"}));
        let mut store = SharedStore::new();

        let error = run(&compiler, &top, &mut store).expect_err("too deep");
        assert!(error.message.contains("nested workflow 'middle' failed at node 'call'"));
        assert!(error.message.contains("maximum workflow nesting depth 1"));
    }

    #[test]
    fn child_failures_name_the_failing_child_node() {
        let child = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("boom", "fail", json!({}))],
            ..Default::default()
        };
        let compiler = compiler_with(&[("failing", child)], EngineConfig::default());
        let ir = parent(json!({"workflow_ref": "failing"}));
        let mut store = SharedStore::new();

        let error = run(&compiler, &ir, &mut store).expect_err("child failure");
        assert_eq!(error.node_id, "call");
        assert_eq!(error.message, "nested workflow 'failing' failed at node 'boom': child exploded");
    }

    #[test]
    fn shared_mode_restores_parent_checkpoint() {
        let compiler = compiler_with(&[("echo_child", echo_child())], EngineConfig::default());
        let ir = parent(json!({"workflow_ref": "echo_child", "storage_mode": "shared", "param_mapping": {"text": "${source.value}"}}));
        let mut store = SharedStore::new();

        run(&compiler, &ir, &mut store).expect("run");

        assert_eq!(load_checkpoint(&store).completed_nodes, vec!["source", "call"]);
        assert_eq!(store.get("say"), Some(&json!({"value": "hello"})));
        assert_eq!(store.get("call"), Some(&json!({"echoed": "hello"})));
        assert!(store.get(EXECUTION_KEY).is_some());
        assert_eq!(store.get(WORKFLOW_DEPTH_KEY), None);
    }

    #[test]
    fn storage_mode_parses_known_names() {
        assert_eq!("scoped".parse::<StorageMode>(), Ok(StorageMode::Scoped));
        assert!("global".parse::<StorageMode>().is_err());
    }
}
