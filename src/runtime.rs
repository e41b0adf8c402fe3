//! The Orchestrator
//!
//! [`Runtime`] composes the whole system: the tool supervisor, the model
//! registry, the agent executor, and the optional RPC fabric and HTTP
//! facade. It owns every component's lifecycle and publishes the callback
//! surface (`ais`, `tools`, `config`, `call_tool`, `call_tool_async`,
//! `async_result`, `prompt`) that both servers share.

use crate::agents::{AgentExecutor, EventBus, PromptOptions};
use crate::api::HttpServer;
use crate::llm::ModelRegistry;
use crate::rpc::{handler, CallbackTable, RpcBroker, RpcServer};
use crate::tools::supervisor::AsyncToolCall;
use crate::tools::{worker, CallArgs, ToolSupervisor};
use crate::types::{AgentError, Kwargs, Result};
use crate::utils::config::MainConfig;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of the runtime's own RPC server on the broker.
pub const RPC_IDENTITY: &str = "relay";

/// Tickets for calls started through `call_tool_async`.
///
/// Futures do not cross the wire, so an async call is represented to
/// remote callers by an opaque id; `async_result` redeems it exactly once.
#[derive(Default)]
struct AsyncTickets {
    calls: parking_lot::Mutex<HashMap<Uuid, AsyncToolCall>>,
}

impl AsyncTickets {
    fn issue(&self, call: AsyncToolCall) -> Uuid {
        let ticket = Uuid::new_v4();
        self.calls.lock().insert(ticket, call);
        ticket
    }

    fn take(&self, ticket: &Uuid) -> Result<AsyncToolCall> {
        self.calls
            .lock()
            .remove(ticket)
            .ok_or_else(|| AgentError::NotFound(ticket.to_string()))
    }
}

/// Composes supervisor, registry, executor and servers into one system.
pub struct Runtime {
    config: MainConfig,
    supervisor: Arc<ToolSupervisor>,
    registry: Arc<ModelRegistry>,
    executor: Arc<AgentExecutor>,
    events: EventBus,
    callbacks: Arc<CallbackTable>,
    broker: Option<RpcBroker>,
    rpc_server: Option<RpcServer>,
    http_server: Option<HttpServer>,
}

impl Runtime {
    /// Wire up a runtime for `config`. Nothing is started yet.
    pub fn new(config: MainConfig) -> Self {
        let supervisor = Arc::new(ToolSupervisor::new());
        let registry = Arc::new(ModelRegistry::new());
        let events = EventBus::default();
        let executor = Arc::new(AgentExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&supervisor),
            events.clone(),
        ));
        let tickets = Arc::new(AsyncTickets::default());

        let callbacks = Arc::new(build_callbacks(
            &config,
            &supervisor,
            &registry,
            &executor,
            &tickets,
        ));

        let rpc_config = config.settings.server.rpc.clone();
        let http_config = config.settings.server.http.clone();

        let broker = rpc_config.clone().map(RpcBroker::new);
        let rpc_server = rpc_config
            .map(|cfg| RpcServer::new(RPC_IDENTITY, cfg, (*callbacks).clone()));
        let http_server = http_config.map(|cfg| HttpServer::new(cfg, Arc::clone(&callbacks)));

        Self {
            config,
            supervisor,
            registry,
            executor,
            events,
            callbacks,
            broker,
            rpc_server,
            http_server,
        }
    }

    /// The tool supervisor.
    pub fn supervisor(&self) -> &Arc<ToolSupervisor> {
        &self.supervisor
    }

    /// The model registry.
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// The event bus carrying turn snapshots.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The published callback surface.
    pub fn callbacks(&self) -> &Arc<CallbackTable> {
        &self.callbacks
    }

    /// Bring the system up: all tools, then all models, then the tool-spec
    /// broadcast, then the configured servers.
    pub async fn start(&mut self) -> Result<()> {
        for tool in &self.config.tools {
            let pending = worker::spawn_process(tool)?;
            self.supervisor.start(&tool.name, pending).await?;
        }

        for ai in &self.config.ais {
            self.registry.add(ai).await?;
        }

        let tools = self.supervisor.tools().await;
        if !tools.is_empty() && !self.registry.register_tools(&tools).await {
            tracing::warn!("some models failed to receive the tool announcement");
        }

        if let Some(broker) = &mut self.broker {
            broker.start().await?;
        }
        if let Some(server) = &mut self.rpc_server {
            server.start().await?;
        }
        if let Some(server) = &mut self.http_server {
            server.start().await?;
        }

        tracing::info!(
            "runtime started: {} tool(s), {} model(s)",
            self.supervisor.names().len(),
            self.registry.ais().len()
        );

        Ok(())
    }

    /// Tear the system down in reverse: models, tools, servers.
    pub async fn stop(&mut self) -> Result<()> {
        for name in self.registry.ais() {
            if let Err(e) = self.registry.remove(&name) {
                tracing::error!("failed to remove model \"{name}\": {e}");
            }
        }

        for name in self.supervisor.names() {
            if let Err(e) = self.supervisor.stop(&name).await {
                tracing::error!("failed to stop tool \"{name}\": {e}");
            }
        }

        if let Some(server) = &mut self.http_server {
            server.stop().await?;
        }
        if let Some(server) = &mut self.rpc_server {
            server.stop().await?;
        }
        if let Some(broker) = &mut self.broker {
            broker.stop().await?;
        }

        tracing::info!("runtime stopped");

        Ok(())
    }

    /// Start an in-process tool under `name`, for embedded deployments
    /// that do not spawn worker processes.
    pub async fn start_tool(&self, name: &str, tool: Box<dyn crate::tools::Tool>) -> Result<()> {
        self.supervisor.start(name, worker::spawn_local(tool)).await
    }

    /// Prompt a model through the agent loop.
    pub async fn prompt(&self, model: &str, text: &str, options: &PromptOptions) -> Result<String> {
        self.executor.prompt(model, text, options).await
    }
}

fn build_callbacks(
    config: &MainConfig,
    supervisor: &Arc<ToolSupervisor>,
    registry: &Arc<ModelRegistry>,
    executor: &Arc<AgentExecutor>,
    tickets: &Arc<AsyncTickets>,
) -> CallbackTable {
    let mut table = CallbackTable::new();

    {
        let registry = Arc::clone(registry);
        table.register(
            "ais",
            handler(move |_args, _kwargs| {
                let registry = Arc::clone(&registry);
                async move { Ok(json!(registry.ais())) }
            }),
        );
    }

    {
        let supervisor = Arc::clone(supervisor);
        table.register(
            "tools",
            handler(move |_args, _kwargs| {
                let supervisor = Arc::clone(&supervisor);
                async move { Ok(serde_json::to_value(supervisor.tools().await)?) }
            }),
        );
    }

    {
        let config = config.clone();
        table.register(
            "config",
            handler(move |_args, _kwargs| {
                let config = config.clone();
                async move { Ok(serde_json::to_value(&config)?) }
            }),
        );
    }

    {
        let supervisor = Arc::clone(supervisor);
        table.register(
            "call_tool",
            handler(move |args, kwargs| {
                let supervisor = Arc::clone(&supervisor);
                async move {
                    let (tool, function, call_args, call_kwargs) =
                        parse_tool_call(&args, &kwargs)?;
                    supervisor.call(&tool, &function, call_args, call_kwargs).await
                }
            }),
        );
    }

    {
        let supervisor = Arc::clone(supervisor);
        let issue_tickets = Arc::clone(tickets);
        table.register(
            "call_tool_async",
            handler(move |args, kwargs| {
                let supervisor = Arc::clone(&supervisor);
                let tickets = Arc::clone(&issue_tickets);
                async move {
                    let (tool, function, call_args, call_kwargs) =
                        parse_tool_call(&args, &kwargs)?;
                    let call = supervisor.call_async(&tool, &function, call_args, call_kwargs);
                    Ok(json!(tickets.issue(call).to_string()))
                }
            }),
        );
    }

    {
        let redeem_tickets = Arc::clone(tickets);
        table.register(
            "async_result",
            handler(move |args, kwargs| {
                let tickets = Arc::clone(&redeem_tickets);
                async move {
                    let view = CallArgs::new(&args, &kwargs);
                    let raw = view.required_str(0, "ticket")?;
                    let ticket = Uuid::parse_str(raw)
                        .map_err(|_| AgentError::InvalidInput(format!("invalid ticket \"{raw}\"")))?;
                    tickets.take(&ticket)?.join().await
                }
            }),
        );
    }

    {
        let executor = Arc::clone(executor);
        table.register(
            "prompt",
            handler(move |args, kwargs| {
                let executor = Arc::clone(&executor);
                async move {
                    let view = CallArgs::new(&args, &kwargs);
                    let name = view.required_str(0, "name")?;
                    let text = view.required_str(1, "text")?;
                    let options = PromptOptions {
                        auto_call: view.bool_or(2, "auto_call", true)?,
                        ..PromptOptions::default()
                    };
                    Ok(json!(executor.prompt(name, text, &options).await?))
                }
            }),
        );
    }

    table
}

fn parse_tool_call(args: &[Value], kwargs: &Kwargs) -> Result<(String, String, Vec<Value>, Kwargs)> {
    let view = CallArgs::new(args, kwargs);
    let tool = view.required_str(0, "tool")?.to_string();
    let function = view.required_str(1, "function")?.to_string();

    let call_args = match view.get(2, "args") {
        None => Vec::new(),
        Some(value) => value
            .as_array()
            .cloned()
            .ok_or_else(|| AgentError::InvalidInput("parameter \"args\" must be an array".into()))?,
    };

    let call_kwargs = match view.get(3, "kwargs") {
        None => Kwargs::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|_| AgentError::InvalidInput("parameter \"kwargs\" must be an object".into()))?,
    };

    Ok((tool, function, call_args, call_kwargs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_arguments_parse_positionally_and_by_name() {
        let args = vec![json!("calc"), json!("evaluate"), json!(["1 + 1"])];
        let kwargs = Kwargs::new();
        let (tool, function, call_args, call_kwargs) = parse_tool_call(&args, &kwargs).unwrap();
        assert_eq!((tool.as_str(), function.as_str()), ("calc", "evaluate"));
        assert_eq!(call_args, vec![json!("1 + 1")]);
        assert!(call_kwargs.is_empty());

        let mut kwargs = Kwargs::new();
        kwargs.insert("tool".into(), json!("file"));
        kwargs.insert("function".into(), json!("delete"));
        kwargs.insert("kwargs".into(), json!({"filename": "/tmp/x"}));
        let (tool, function, call_args, call_kwargs) = parse_tool_call(&[], &kwargs).unwrap();
        assert_eq!((tool.as_str(), function.as_str()), ("file", "delete"));
        assert!(call_args.is_empty());
        assert_eq!(call_kwargs["filename"], json!("/tmp/x"));
    }

    #[test]
    fn malformed_tool_call_arguments_are_rejected() {
        let err = parse_tool_call(&[json!("calc")], &Kwargs::new()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));

        let args = vec![json!("calc"), json!("evaluate"), json!("not-an-array")];
        let err = parse_tool_call(&args, &Kwargs::new()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }
}
