//! # Relay - An Agent Runtime for Models and Out-of-Process Tools
//!
//! Relay brokers conversations between LLM providers and a fleet of
//! user-supplied tools. A client sends a free-form prompt to a named
//! model; the runtime obtains the model's reply, detects any tool calls it
//! proposes, dispatches them to the right worker, feeds the results back,
//! and iterates until the model produces a terminal textual answer.
//!
//! ## Overview
//!
//! Relay can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `relay-server` binary against a
//!    JSON configuration
//! 2. **As a library** - Compose [`Runtime`] (or the individual
//!    components) into your own program
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use relay::{MainConfig, PromptOptions, Runtime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MainConfig::from_file("relay.json")?;
//!     let mut runtime = Runtime::new(config);
//!     runtime.start().await?;
//!
//!     let answer = runtime
//!         .prompt("my_ai", "create /tmp/x with body abc", &PromptOptions::auto())
//!         .await?;
//!     println!("{answer}");
//!
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - Each tool runs in its own **worker** (a child process, or an
//!   in-process task for embedded use) behind a duplex channel of
//!   length-prefixed JSON frames; the
//!   [`ToolSupervisor`](tools::ToolSupervisor) manages the fleet.
//! - Each model sits behind a [`ModelDriver`](llm::ModelDriver) owning its
//!   vendor session; the [`ModelRegistry`](llm::ModelRegistry) names and
//!   serialises them.
//! - The [`AgentExecutor`](agents::AgentExecutor) interleaves prompts with
//!   tool dispatches until the model answers with prose.
//! - External callers enter through the RPC fabric ([`rpc`]) or the HTTP
//!   facade ([`api`]); both dispatch the same callback surface published
//!   by [`Runtime`].
//!
//! ## Modules
//!
//! - [`agents`] - The agent loop and its observers
//! - [`api`] - The HTTP facade
//! - [`llm`] - Model drivers and registry
//! - [`rpc`] - Broker, RPC server and RPC client
//! - [`tools`] - Tool trait, workers and supervisor
//! - [`types`] - Common types and error handling
//! - [`utils`] - Configuration

#![warn(missing_docs)]

/// The agent loop and its observers.
pub mod agents;
/// The HTTP facade.
pub mod api;
/// Model drivers and registry.
pub mod llm;
/// The RPC broker, server and client.
pub mod rpc;
/// The orchestrator.
pub mod runtime;
/// Tool workers and their supervisor.
pub mod tools;
/// Core types (calls, results, specs, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use agents::{AgentExecutor, EventBus, PromptOptions, TurnEvent, TurnObserver};
pub use api::{HttpClient, HttpServer};
pub use llm::{ModelDriver, ModelRegistry};
pub use rpc::{CallbackTable, RpcBroker, RpcClient, RpcServer};
pub use runtime::Runtime;
pub use tools::{Tool, ToolSupervisor};
pub use types::{
    AgentError, Call, CallResult, PromptResult, Result, ToolCall, ToolInfo, ToolSpec,
};
pub use utils::config::{AiConfig, HttpConfig, MainConfig, RpcConfig, ToolConfig};
