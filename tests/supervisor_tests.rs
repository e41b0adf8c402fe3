//! Integration tests for the tool supervisor and its workers.

mod common;

use common::ProbeTool;
use relay::tools::{worker, ToolSupervisor};
use relay::types::{AgentError, Kwargs};
use relay::{Tool, ToolCall};
use serde_json::json;
use std::sync::Arc;

fn calc() -> Box<dyn Tool> {
    Box::new(relay::tools::calc::CalcTool::new(&Default::default()))
}

fn file() -> Box<dyn Tool> {
    Box::new(relay::tools::file::FileTool::new(&Default::default()))
}

async fn start(supervisor: &ToolSupervisor, name: &str, tool: Box<dyn Tool>) {
    supervisor
        .start(name, worker::spawn_local(tool))
        .await
        .unwrap();
}

#[tokio::test]
async fn call_round_trips_values_and_errors() {
    let supervisor = ToolSupervisor::new();
    start(&supervisor, "calc", calc()).await;

    let value = supervisor
        .call("calc", "evaluate", vec![json!("2 + 2 * 3")], Kwargs::new())
        .await
        .unwrap();
    assert_eq!(value, json!(8.0));

    // A raising method surfaces as a remote error carrying its message.
    let err = supervisor
        .call("calc", "evaluate", vec![json!("boom")], Kwargs::new())
        .await
        .unwrap_err();
    match err {
        AgentError::Remote(trace) => {
            assert!(trace.contains("boom"));
            assert!(trace.contains("evaluate"));
        }
        other => panic!("expected remote error, got {other}"),
    }

    // The worker is unharmed.
    let value = supervisor
        .call("calc", "evaluate", vec![json!("1 + 1")], Kwargs::new())
        .await
        .unwrap();
    assert_eq!(value, json!(2.0));
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let supervisor = ToolSupervisor::new();
    start(&supervisor, "calc", calc()).await;

    let err = supervisor
        .start("calc", worker::spawn_local(calc()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AlreadyExists(_)));
}

#[tokio::test]
async fn stop_is_idempotent_in_effect() {
    let supervisor = ToolSupervisor::new();
    start(&supervisor, "calc", calc()).await;

    supervisor.stop("calc").await.unwrap();
    let err = supervisor.stop("calc").await.unwrap_err();
    assert!(matches!(err, AgentError::NotFound(_)));
}

#[tokio::test]
async fn stopped_tool_can_be_restarted() {
    let supervisor = ToolSupervisor::new();
    start(&supervisor, "file", file()).await;

    supervisor.stop("file").await.unwrap();

    let err = supervisor
        .call("file", "delete", vec![json!("/tmp/x")], Kwargs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NotFound(_)));

    // A fresh worker under the old name serves calls again.
    start(&supervisor, "file", file()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("y.txt");
    let value = supervisor
        .call(
            "file",
            "create",
            vec![json!(path.to_str().unwrap()), json!("abc")],
            Kwargs::new(),
        )
        .await
        .unwrap();
    assert_eq!(value, json!(path.to_str().unwrap()));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "abc");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_call_is_in_flight_per_worker() {
    let supervisor = Arc::new(ToolSupervisor::new());
    let (probe, max_seen) = ProbeTool::new();
    supervisor
        .start("probe", worker::spawn_local(Box::new(probe)))
        .await
        .unwrap();

    let calls: Vec<_> = (0..8)
        .map(|_| supervisor.call_async("probe", "work", vec![], Kwargs::new()))
        .collect();
    for call in calls {
        call.join().await.unwrap();
    }

    assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dead_worker_surfaces_as_unavailable() {
    let supervisor = ToolSupervisor::new();
    let (probe, _) = ProbeTool::new();
    start(&supervisor, "probe", Box::new(probe)).await;

    let err = supervisor
        .call("probe", "explode", vec![], Kwargs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ToolUnavailable(_)));

    // Subsequent calls keep failing the same way; no auto-restart.
    let err = supervisor
        .call("probe", "work", vec![], Kwargs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ToolUnavailable(_)));
}

#[tokio::test]
async fn manifests_aggregate_in_start_order() {
    let supervisor = ToolSupervisor::new();
    start(&supervisor, "file", file()).await;
    start(&supervisor, "calc", calc()).await;

    let tools = supervisor.tools().await;
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["file", "calc"]);

    // Every public method appears exactly once; no reserved names leak.
    let file_specs: Vec<_> = tools[0].specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(file_specs, vec!["create", "modify", "delete"]);
    for spec in tools.iter().flat_map(|t| &t.specs) {
        assert!(!["config", "specs", "setup", "teardown"].contains(&spec.name.as_str()));
    }
}

#[tokio::test]
async fn dead_worker_reports_empty_specs_without_blocking_others() {
    let supervisor = ToolSupervisor::new();
    let (probe, _) = ProbeTool::new();
    start(&supervisor, "probe", Box::new(probe)).await;
    start(&supervisor, "calc", calc()).await;

    // Kill the probe worker.
    let _ = supervisor
        .call("probe", "explode", vec![], Kwargs::new())
        .await;

    let tools = supervisor.tools().await;
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "probe");
    assert!(tools[0].specs.is_empty());
    assert_eq!(tools[1].specs.len(), 1);
}

#[tokio::test]
async fn batch_start_checks_names_before_starting_anything() {
    let supervisor = ToolSupervisor::new();
    start(&supervisor, "calc", calc()).await;

    let err = supervisor
        .start_many(vec![
            ("fresh".to_string(), worker::spawn_local(calc())),
            ("calc".to_string(), worker::spawn_local(calc())),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AlreadyExists(_)));

    // The precondition failure left the batch unapplied.
    assert_eq!(supervisor.names(), vec!["calc"]);

    supervisor
        .start_many(vec![
            ("a".to_string(), worker::spawn_local(calc())),
            ("b".to_string(), worker::spawn_local(calc())),
        ])
        .await
        .unwrap();
    assert_eq!(supervisor.names(), vec!["calc", "a", "b"]);

    let err = supervisor
        .stop_many(&["a".to_string(), "ghost".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NotFound(_)));
    assert_eq!(supervisor.names(), vec!["calc", "a", "b"]);

    supervisor
        .stop_many(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(supervisor.names(), vec!["calc"]);
}

#[tokio::test]
async fn async_calls_resolve_like_sync_ones() {
    let supervisor = Arc::new(ToolSupervisor::new());
    supervisor
        .start("calc", worker::spawn_local(calc()))
        .await
        .unwrap();

    let ok = supervisor.call_async("calc", "evaluate", vec![json!("3 * 3")], Kwargs::new());
    let bad = supervisor.call_async("calc", "evaluate", vec![json!("oops")], Kwargs::new());

    assert_eq!(ok.join().await.unwrap(), json!(9.0));
    assert!(matches!(bad.join().await.unwrap_err(), AgentError::Remote(_)));
}

#[tokio::test]
async fn calls_to_unknown_tools_fail_fast() {
    let supervisor = ToolSupervisor::new();
    let err = supervisor
        .call("ghost", "anything", vec![], Kwargs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NotFound(_)));

    // ToolCall splitting feeds the same path.
    let call = ToolCall {
        tool: "ghost".into(),
        function: "anything".into(),
        args: vec![],
        kwargs: Kwargs::new(),
    };
    let (tool, bare) = call.into_parts();
    assert_eq!(tool, "ghost");
    assert_eq!(bare.function, "anything");
}
