//! Asynchronous workflow driver that streams lifecycle events.
//!
//! The executor itself is synchronous. This module runs it on Tokio's blocking
//! pool and forwards node notifications over an unbounded channel so a UI or
//! service can follow a run as it happens. The caller owns the receiver; a
//! dropped receiver never aborts the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pathflow_types::WorkflowIr;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    execution::{ExecutionOutcome, ExecutionRequest, execute_workflow},
    executor::{ExecutionObserver, NodeReport},
    registry::NodeRegistry,
    workflow::tracker::RunStatus,
};

/// Lifecycle notification emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowRunEvent {
    RunStarted { at: DateTime<Utc> },
    NodeStarted { node_id: String, node_type: String, at: DateTime<Utc> },
    NodeFinished { report: NodeReport, at: DateTime<Utc> },
    RunCompleted {
        status: RunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    },
}

/// Observer that forwards node notifications onto an event channel.
pub struct ChannelObserver {
    event_tx: UnboundedSender<WorkflowRunEvent>,
}

impl ChannelObserver {
    pub fn new(event_tx: UnboundedSender<WorkflowRunEvent>) -> Self {
        Self { event_tx }
    }
}

impl ExecutionObserver for ChannelObserver {
    fn node_started(&self, node_id: &str, node_type: &str) {
        let _ = self.event_tx.send(WorkflowRunEvent::NodeStarted {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            at: Utc::now(),
        });
    }

    fn node_finished(&self, report: &NodeReport) {
        let _ = self.event_tx.send(WorkflowRunEvent::NodeFinished {
            report: report.clone(),
            at: Utc::now(),
        });
    }
}

/// Drives a workflow run to completion while emitting lifecycle events.
///
/// Errors that stop the run before any node executes (validation, inputs,
/// compilation) are emitted as a failed `RunCompleted` and returned. A node
/// failure is not an error here: the outcome carries it.
pub async fn drive_workflow_run(
    ir: WorkflowIr,
    registry: Arc<NodeRegistry>,
    request: ExecutionRequest,
    event_tx: UnboundedSender<WorkflowRunEvent>,
) -> Result<ExecutionOutcome> {
    let _ = event_tx.send(WorkflowRunEvent::RunStarted { at: Utc::now() });

    let observer = Arc::new(ChannelObserver::new(event_tx.clone()));
    let request = request.with_observer(observer);
    let result = tokio::task::spawn_blocking(move || execute_workflow(&ir, registry, request))
        .await
        .context("workflow execution task panicked")?;

    match result {
        Ok(outcome) => {
            let _ = event_tx.send(WorkflowRunEvent::RunCompleted {
                status: outcome.status,
                error: outcome.error_report(),
                finished_at: Utc::now(),
            });
            Ok(outcome)
        }
        Err(error) => {
            let _ = event_tx.send(WorkflowRunEvent::RunCompleted {
                status: RunStatus::Failed,
                error: Some(error.to_string()),
                finished_at: Utc::now(),
            });
            Err(error).context("workflow could not be started")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::FnNode;
    use pathflow_types::{EdgeSpec, NodeSpec};
    use serde_json::{Value, json};
    use tokio::sync::mpsc::unbounded_channel;

    fn node(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.into(),
            r#type: "echo".into(),
            params: json!({"from": id}).as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn streams_node_events_in_order() {
        let mut registry = NodeRegistry::new();
        registry.register("echo", FnNode::new(|params| Ok(Value::Object(params.clone()))).into_factory());
        let ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("a"), node("b")],
            edges: vec![EdgeSpec::new("a", "b")],
            ..Default::default()
        };
        let (event_tx, mut event_rx) = unbounded_channel();

        let outcome = drive_workflow_run(ir, Arc::new(registry), ExecutionRequest::default(), event_tx)
            .await
            .expect("run completes");
        assert_eq!(outcome.status, RunStatus::Success);

        let mut kinds = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            kinds.push(match event {
                WorkflowRunEvent::RunStarted { .. } => "run_started".to_string(),
                WorkflowRunEvent::NodeStarted { node_id, .. } => format!("started:{node_id}"),
                WorkflowRunEvent::NodeFinished { report, .. } => format!("finished:{}", report.node_id),
                WorkflowRunEvent::RunCompleted { status, .. } => format!("completed:{status}"),
            });
        }
        assert_eq!(
            kinds,
            vec!["run_started", "started:a", "finished:a", "started:b", "finished:b", "completed:success"]
        );
    }

    #[tokio::test]
    async fn startup_failures_close_the_stream() {
        let ir = WorkflowIr {
            ir_version: "0.1.0".into(),
            nodes: vec![node("a")],
            ..Default::default()
        };
        let (event_tx, mut event_rx) = unbounded_channel();

        let result = drive_workflow_run(ir, Arc::new(NodeRegistry::new()), ExecutionRequest::default(), event_tx).await;
        assert!(result.is_err());

        let mut last = None;
        while let Ok(event) = event_rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(WorkflowRunEvent::RunCompleted { status: RunStatus::Failed, .. })));
    }
}
