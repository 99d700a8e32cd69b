mod common;

use common::{fixture, init_tracing, object, shared_registry};
use pathflow_engine::{ExecutionRequest, NodeRunStatus, RunStatus, WorkflowRunEvent, drive_workflow_run};
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;

#[tokio::test]
async fn failed_runs_stream_the_failure_report() {
    init_tracing();
    let ir = fixture(include_str!("data/github_greeting.json"));
    let (event_tx, mut event_rx) = unbounded_channel();
    let request = ExecutionRequest::new(object(json!({"username": "torvalds"})));

    let outcome = drive_workflow_run(ir, shared_registry(), request, event_tx).await.expect("run finishes");
    assert_eq!(outcome.status, RunStatus::Failed);

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }

    let failed_nodes: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            WorkflowRunEvent::NodeFinished { report, .. } if report.status == NodeRunStatus::Failed => Some(report.node_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failed_nodes, vec!["greet"]);

    match events.last() {
        Some(WorkflowRunEvent::RunCompleted { status, error, .. }) => {
            assert_eq!(*status, RunStatus::Failed);
            let report = error.as_deref().unwrap_or_default();
            assert!(report.contains("Workflow failed at node 'greet' (echo)"));
            assert!(report.contains("${api.response.username}"));
        }
        other => panic!("expected RunCompleted last, got {other:?}"),
    }
}

#[tokio::test]
async fn events_serialize_with_a_tag() {
    let event = WorkflowRunEvent::RunCompleted {
        status: RunStatus::Degraded,
        error: None,
        finished_at: chrono::Utc::now(),
    };
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["event"], json!("run_completed"));
    assert_eq!(value["status"], json!("degraded"));
}
