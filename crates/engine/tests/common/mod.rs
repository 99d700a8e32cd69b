#![allow(dead_code)]

use std::sync::{Arc, Once};

use pathflow_engine::{FnNode, NodeError, NodeInterface, NodeRegistry};
use pathflow_types::{NodeSpec, WorkflowIr};
use serde_json::{Map as JsonMap, Value, json};

static TRACING: Once = Once::new();

/// Routes engine logs through the test harness so `--nocapture` shows them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
            .with_test_writer()
            .try_init();
    });
}

/// Registry with the node types the integration tests share.
///
/// - `echo` writes its params back out
/// - `fail` always fails
/// - `profile` returns a fixed GitHub-like API response
pub fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register("echo", FnNode::new(|params| Ok(Value::Object(params.clone()))).into_factory());
    registry.register("fail", FnNode::new(|_| Err(NodeError::failed("upstream service unavailable"))).into_factory());
    registry.register_with_interface(
        "profile",
        FnNode::new(|_| Ok(json!({"response": {"login": "torvalds", "bio": "kernel hacker", "name": "Linus"}}))).into_factory(),
        NodeInterface::with_outputs(["response"]),
    );
    registry
}

pub fn shared_registry() -> Arc<NodeRegistry> {
    Arc::new(registry())
}

pub fn node(id: &str, node_type: &str, params: Value) -> NodeSpec {
    NodeSpec {
        id: id.into(),
        r#type: node_type.into(),
        params: object(params),
        ..Default::default()
    }
}

pub fn object(value: Value) -> JsonMap<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub fn fixture(json: &str) -> WorkflowIr {
    serde_json::from_str(json).expect("fixture parses as workflow IR")
}
