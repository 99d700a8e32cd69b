//! Outermost wrapper: checkpointing, timing, and observer notifications.
//!
//! The wrapper sits outside the namespace, so everything it reads and writes
//! goes through bookkeeping keys. Those stay at the root whichever view
//! touches them, which is what lets it see LLM ledger entries appended by the
//! node inside its namespace.

use std::{sync::Arc, time::Instant};

use pathflow_types::NodeSpec;
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{
    node::{NodeError, Runnable},
    store::{LLM_CALLS_KEY, StoreAccess},
    workflow::tracker::ExecutionTracker,
};

/// How a node run ended, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    Succeeded,
    Failed,
    /// Skipped because the checkpoint already covered an identical configuration.
    Cached,
}

/// Summary of one node run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub node_id: String,
    pub node_type: String,
    pub status: NodeRunStatus,
    pub action: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Receives node lifecycle notifications.
pub trait ExecutionObserver: Send + Sync {
    fn node_started(&self, _node_id: &str, _node_type: &str) {}

    fn node_finished(&self, _report: &NodeReport) {}
}

/// SHA-256 over the parts of a node declaration that affect its behavior.
pub fn node_config_hash(node: &NodeSpec) -> String {
    let fingerprint = json!({
        "type": node.r#type,
        "params": node.params,
        "batch": node.batch,
    });
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct InstrumentedNode {
    node_id: String,
    node_type: String,
    config_hash: String,
    inner: Box<dyn Runnable>,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl InstrumentedNode {
    pub fn new(node: &NodeSpec, inner: Box<dyn Runnable>, observer: Option<Arc<dyn ExecutionObserver>>) -> Self {
        Self {
            node_id: node.id.clone(),
            node_type: node.r#type.clone(),
            config_hash: node_config_hash(node),
            inner,
            observer,
        }
    }

    fn report(&self, status: NodeRunStatus, action: Option<String>, duration_ms: u64, error: Option<String>) {
        let Some(observer) = &self.observer else {
            return;
        };
        observer.node_finished(&NodeReport {
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
            status,
            action,
            duration_ms,
            error,
        });
    }
}

impl Runnable for InstrumentedNode {
    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        let cached = ExecutionTracker::new(store).cached_action(&self.node_id, &self.config_hash);
        if let Some(action) = cached {
            ExecutionTracker::new(store).record_cache_hit(&self.node_id);
            info!(node_id = %self.node_id, action = %action, "node skipped; checkpoint covers unchanged configuration");
            self.report(NodeRunStatus::Cached, Some(action.clone()), 0, None);
            return Ok(action);
        }

        if let Some(observer) = &self.observer {
            observer.node_started(&self.node_id, &self.node_type);
        }
        info!(node_id = %self.node_id, node_type = %self.node_type, "node started");

        let ledger_len = llm_call_count(store);
        let started_at = Instant::now();
        let result = self.inner.run(store);
        let duration_ms = started_at.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tag_llm_calls(store, ledger_len, &self.node_id);

        match &result {
            Ok(action) => {
                ExecutionTracker::new(store).record_completed(&self.node_id, action, &self.config_hash);
                info!(node_id = %self.node_id, action = %action, duration_ms, "node finished");
                self.report(NodeRunStatus::Succeeded, Some(action.clone()), duration_ms, None);
            }
            Err(error) => {
                ExecutionTracker::new(store).record_failed(&self.node_id);
                warn!(node_id = %self.node_id, %error, duration_ms, "node failed");
                self.report(NodeRunStatus::Failed, None, duration_ms, Some(error.to_string()));
            }
        }

        result
    }
}

fn llm_call_count(store: &dyn StoreAccess) -> usize {
    store.get(LLM_CALLS_KEY).and_then(Value::as_array).map_or(0, Vec::len)
}

/// Stamps `node_id` onto ledger entries appended since `from` that lack one.
fn tag_llm_calls(store: &mut dyn StoreAccess, from: usize, node_id: &str) {
    let Some(Value::Array(calls)) = store.get_mut(LLM_CALLS_KEY) else {
        return;
    };
    for call in calls.iter_mut().skip(from) {
        if let Value::Object(entry) = call
            && !entry.contains_key("node_id")
        {
            entry.insert("node_id".to_string(), Value::String(node_id.to_string()));
        }
    }
}
