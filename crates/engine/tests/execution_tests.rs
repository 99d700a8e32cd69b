mod common;

use std::sync::Arc;

use common::{fixture, init_tracing, node, object, registry, shared_registry};
use pathflow_engine::{
    EngineConfig, EngineError, ExecutionRequest, FlowCompiler, FnNode, NodeError, RunStatus, SharedStore, StoreAccess, TemplateMode,
    execute_workflow, find_missing_paths,
    registry::{NodeMetadata, THREE_PHASE_PROTOCOL},
    resolve::resolve,
    workflow::tracker::{cache_hits, warnings},
};
use pathflow_types::{EdgeSpec, OutputSpec, WorkflowIr};
use serde_json::{Value, json};

fn single_node(node_type: &str, params: Value) -> WorkflowIr {
    WorkflowIr {
        ir_version: "0.1.0".into(),
        nodes: vec![node("only", node_type, params)],
        ..Default::default()
    }
}

#[test]
fn single_node_without_edges_runs_once_and_succeeds() {
    init_tracing();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    let mut registry = registry();
    registry.register(
        "count",
        FnNode::new(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(json!({"ok": true}))
        })
        .into_factory(),
    );

    let outcome = execute_workflow(&single_node("count", json!({})), Arc::new(registry), ExecutionRequest::default()).expect("outcome");

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(outcome.checkpoint.completed_nodes, vec!["only"]);
    assert_eq!(outcome.store.get("only"), Some(&json!({"ok": true})));
}

#[test]
fn namespaced_paths_resolve_and_missing_segments_do_not() {
    let store = SharedStore::from_map(object(json!({"n": {"a": {"b": 5}}})));

    assert_eq!(resolve("${n.a.b}", &store), Some(json!(5)));
    assert_eq!(resolve("${n.a.c}", &store), None);
    assert_eq!(resolve("${n.x.b}", &store), None);
    assert_eq!(resolve("${missing.a.b}", &store), None);
}

#[test]
fn node_writes_land_in_their_namespace_except_bookkeeping() {
    init_tracing();
    let mut registry = registry();
    registry.register(
        "llm",
        FnNode::new(|_| Ok(json!({"k": "v", "__llm_calls__": [{"model": "small", "tokens": 12}]}))).into_factory(),
    );

    let outcome = execute_workflow(&single_node("llm", json!({})), Arc::new(registry), ExecutionRequest::default()).expect("outcome");

    assert_eq!(outcome.store.get("only").and_then(|entry| entry.get("k")), Some(&json!("v")));
    assert_eq!(outcome.store.get("k"), None);
    let calls = outcome.store.get("__llm_calls__").and_then(Value::as_array).cloned().unwrap_or_default();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["node_id"], json!("only"));
}

#[test]
fn declared_outputs_are_promoted_to_the_root() {
    let mut ir = single_node("echo", json!({"x": 5}));
    ir.nodes[0].id = "n1".into();
    ir.outputs.insert(
        "result".into(),
        OutputSpec {
            source: Some("${n1.x}".into()),
            ..Default::default()
        },
    );

    let outcome = execute_workflow(&ir, shared_registry(), ExecutionRequest::default()).expect("outcome");

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.store.get("result"), Some(&json!(5)));
    assert_eq!(outcome.outputs.get("result"), Some(&json!(5)));
}

#[test]
fn wrong_response_field_is_reported_with_available_fields() {
    init_tracing();
    let ir = fixture(include_str!("data/github_greeting.json"));
    let params = object(json!({"username": "torvalds"}));

    let outcome = execute_workflow(&ir, shared_registry(), ExecutionRequest::new(params)).expect("outcome");

    assert_eq!(outcome.status, RunStatus::Failed);
    let error = outcome.error.as_ref().expect("greet failed");
    assert_eq!(error.node_id, "greet");
    assert_eq!(outcome.checkpoint.completed_nodes, vec!["api"]);

    let missing = outcome
        .missing_paths
        .iter()
        .find(|entry| entry.template == "${api.response.username}")
        .expect("username reported missing");
    assert_eq!(missing.resolved_path, "api.response");
    assert!(missing.available_fields.contains(&"login".to_string()));
    assert_eq!(missing.available_fields, vec!["bio", "login", "name"]);

    let report = outcome.error_report().expect("failure report");
    assert!(report.contains("'username' does not exist under 'api.response'; available: bio, login, name"));
}

#[test]
fn missing_paths_can_be_recomputed_from_the_final_store() {
    let ir = fixture(include_str!("data/github_greeting.json"));
    let store = SharedStore::from_map(object(json!({"api": {"response": {"login": "torvalds"}}})));

    let missing = find_missing_paths(&ir, &store);

    let templates: Vec<&str> = missing.iter().map(|entry| entry.template.as_str()).collect();
    assert_eq!(templates, vec!["${username}", "${api.response.username}", "${greet.text}"]);
    assert_eq!(missing[1].available_fields, vec!["login"]);
    assert_eq!(missing[2].param_path, "outputs.greeting.source");
    assert_eq!(missing[2].node_id, None);
}

#[test]
fn permissive_mode_keeps_unresolved_template_text() {
    init_tracing();
    let ir = WorkflowIr {
        ir_version: "0.1.0".into(),
        nodes: vec![
            node("fetch", "echo", json!({"body": {"title": "hi"}})),
            node("use", "echo", json!({"text": "title=${fetch.body.subtitle}"})),
        ],
        edges: vec![EdgeSpec::new("fetch", "use")],
        ..Default::default()
    };

    let strict = execute_workflow(&ir, shared_registry(), ExecutionRequest::default()).expect("strict outcome");
    assert_eq!(strict.status, RunStatus::Failed);
    assert!(strict.error.as_ref().is_some_and(|error| error.message.contains("fetch.body.subtitle")));

    let config = EngineConfig {
        template_mode: TemplateMode::Permissive,
        ..EngineConfig::default()
    };
    let permissive = execute_workflow(&ir, shared_registry(), ExecutionRequest::default().with_config(config)).expect("permissive outcome");
    assert_eq!(permissive.status, RunStatus::Success);
    assert_eq!(
        permissive.store.get("use").and_then(|entry| entry.get("text")),
        Some(&json!("title=${fetch.body.subtitle}"))
    );
    assert_eq!(permissive.missing_paths.len(), 1);
}

#[test]
fn error_edges_recover_and_degrade_the_run() {
    init_tracing();
    let ir = WorkflowIr {
        ir_version: "0.1.0".into(),
        nodes: vec![
            node("risky", "fail", json!({})),
            node("happy", "echo", json!({"path": "main"})),
            node("fallback", "echo", json!({"path": "fallback"})),
        ],
        edges: vec![EdgeSpec::new("risky", "happy"), EdgeSpec::with_action("risky", "fallback", "error")],
        ..Default::default()
    };

    let outcome = execute_workflow(&ir, shared_registry(), ExecutionRequest::default()).expect("outcome");

    assert_eq!(outcome.status, RunStatus::Degraded);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.checkpoint.completed_nodes, vec!["fallback"]);
    assert_eq!(outcome.checkpoint.failed_node, None);
    assert!(warnings(&outcome.store).contains_key("risky"));
    assert_eq!(outcome.store.get("happy"), None);
}

#[test]
fn resumed_runs_skip_completed_nodes_and_report_degraded() {
    init_tracing();
    let ir = WorkflowIr {
        ir_version: "0.1.0".into(),
        nodes: vec![node("first", "echo", json!({"value": 1})), node("second", "flaky", json!({"input": "${first.value}"}))],
        edges: vec![EdgeSpec::new("first", "second")],
        ..Default::default()
    };

    let mut broken = registry();
    broken.register("flaky", FnNode::new(|_| Err(NodeError::failed("timeout"))).into_factory());
    let failed = execute_workflow(&ir, Arc::new(broken), ExecutionRequest::default()).expect("first outcome");
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.checkpoint.failed_node.as_deref(), Some("second"));

    let mut repaired = registry();
    repaired.register("flaky", FnNode::new(|params| Ok(Value::Object(params.clone()))).into_factory());
    let request = ExecutionRequest::default().resuming(failed.store, ["second"]);
    let resumed = execute_workflow(&ir, Arc::new(repaired), request).expect("resumed outcome");

    assert_eq!(resumed.status, RunStatus::Degraded);
    assert_eq!(cache_hits(&resumed.store), vec!["first"]);
    assert_eq!(resumed.checkpoint.completed_nodes, vec!["first", "second"]);
    assert_eq!(resumed.store.get("second").and_then(|entry| entry.get("input")), Some(&json!(1)));
}

#[test]
fn compilation_errors_surface_before_running() {
    let ir = single_node("echo", json!({}));
    let mut broken = registry();
    broken.insert_metadata(
        "echo",
        NodeMetadata {
            factory: None,
            protocol: THREE_PHASE_PROTOCOL.to_string(),
            interface: Default::default(),
        },
    );

    let compiled = FlowCompiler::new(Arc::new(broken)).compile(&ir);

    assert!(matches!(compiled, Err(EngineError::Compilation(_))));
}
