//! Integration tests for the orchestrator's callback surface, the same
//! entry points RPC and HTTP callers use.

mod common;

use common::ScriptedDriver;
use relay::types::{Kwargs, PromptResult, ToolCall};
use relay::{MainConfig, Runtime};
use serde_json::{json, Value};

async fn runtime_with_calc() -> Runtime {
    let runtime = Runtime::new(MainConfig::default());
    runtime
        .start_tool(
            "calc",
            Box::new(relay::tools::calc::CalcTool::new(&Default::default())),
        )
        .await
        .unwrap();
    runtime
}

async fn dispatch(runtime: &Runtime, function: &str, args: Vec<Value>) -> relay::CallResult {
    runtime
        .callbacks()
        .dispatch(function, args, Kwargs::new())
        .await
}

#[tokio::test]
async fn surface_lists_models_tools_and_config() {
    let runtime = runtime_with_calc().await;
    let (driver, _) = ScriptedDriver::new(vec![]);
    runtime
        .registry()
        .insert_driver("my_ai", Box::new(driver))
        .unwrap();

    let ais = dispatch(&runtime, "ais", vec![]).await;
    assert_eq!(ais.result, Some(json!(["my_ai"])));

    let tools = dispatch(&runtime, "tools", vec![]).await;
    let tools = tools.result.unwrap();
    assert_eq!(tools[0]["name"], "calc");
    assert_eq!(tools[0]["specs"][0]["name"], "evaluate");

    let config = dispatch(&runtime, "config", vec![]).await;
    assert!(config.result.unwrap().get("settings").is_some());
}

#[tokio::test]
async fn call_tool_dispatches_and_reports_errors_in_band() {
    let runtime = runtime_with_calc().await;

    let ok = dispatch(
        &runtime,
        "call_tool",
        vec![json!("calc"), json!("evaluate"), json!(["6 * 7"])],
    )
    .await;
    assert_eq!(ok.result, Some(json!(42.0)));

    let bad = dispatch(
        &runtime,
        "call_tool",
        vec![json!("calc"), json!("evaluate"), json!(["boom"])],
    )
    .await;
    assert!(bad.error.unwrap().contains("boom"));

    let missing = dispatch(&runtime, "call_tool", vec![json!("ghost"), json!("x")]).await;
    assert!(missing.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn async_tickets_redeem_exactly_once() {
    let runtime = runtime_with_calc().await;

    let issued = dispatch(
        &runtime,
        "call_tool_async",
        vec![json!("calc"), json!("evaluate"), json!(["10 / 4"])],
    )
    .await;
    let ticket = issued.result.unwrap();
    let ticket_str = ticket.as_str().unwrap().to_string();

    let value = dispatch(&runtime, "async_result", vec![json!(ticket_str)]).await;
    assert_eq!(value.result, Some(json!(2.5)));

    // Redeeming the same ticket twice fails.
    let again = dispatch(&runtime, "async_result", vec![json!(ticket_str)]).await;
    assert!(again.error.is_some());

    // Garbage tickets are rejected as input errors.
    let garbage = dispatch(&runtime, "async_result", vec![json!("not-a-ticket")]).await;
    assert!(garbage.error.unwrap().contains("invalid ticket"));
}

#[tokio::test]
async fn prompt_runs_the_agent_loop_end_to_end() {
    let runtime = runtime_with_calc().await;
    let (driver, prompts) = ScriptedDriver::new(vec![
        PromptResult::Calls(vec![ToolCall {
            tool: "calc".into(),
            function: "evaluate".into(),
            args: vec![json!("20 + 22")],
            kwargs: Kwargs::new(),
        }]),
        PromptResult::Text("the answer is 42".into()),
    ]);
    runtime
        .registry()
        .insert_driver("my_ai", Box::new(driver))
        .unwrap();

    let answer = dispatch(
        &runtime,
        "prompt",
        vec![json!("my_ai"), json!("what is 20 + 22?")],
    )
    .await;
    assert_eq!(answer.result, Some(json!("the answer is 42")));
    assert_eq!(prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn prompt_with_auto_call_off_returns_the_calls() {
    let runtime = Runtime::new(MainConfig::default());
    let (driver, _) = ScriptedDriver::new(vec![PromptResult::Calls(vec![ToolCall {
        tool: "calc".into(),
        function: "evaluate".into(),
        args: vec![json!("1 + 1")],
        kwargs: Kwargs::new(),
    }])]);
    runtime
        .registry()
        .insert_driver("my_ai", Box::new(driver))
        .unwrap();

    let answer = dispatch(
        &runtime,
        "prompt",
        vec![json!("my_ai"), json!("add"), json!(false)],
    )
    .await;

    let calls: Vec<ToolCall> =
        serde_json::from_str(answer.result.unwrap().as_str().unwrap()).unwrap();
    assert_eq!(calls[0].tool, "calc");
}

#[tokio::test]
async fn stop_unwinds_models_and_tools() {
    let mut runtime = runtime_with_calc().await;
    let (driver, _) = ScriptedDriver::new(vec![]);
    runtime
        .registry()
        .insert_driver("my_ai", Box::new(driver))
        .unwrap();

    runtime.stop().await.unwrap();

    assert!(runtime.registry().ais().is_empty());
    assert!(runtime.supervisor().names().is_empty());
}
