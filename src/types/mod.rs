//! Core types used throughout the relay runtime.
//!
//! This module contains the common data structures used for:
//! - Tool invocations and their results
//! - Model replies (the `PromptResult` contract)
//! - Tool manifests exposed to models
//! - Conversation history
//! - Error handling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keyword arguments of a call, keyed by parameter name.
///
/// A `BTreeMap` keeps serialisation deterministic, which matters when the
/// encoded call is fed back to a model.
pub type Kwargs = BTreeMap<String, Value>;

// ============= Call Types =============

/// A request to invoke a named function with positional and keyword
/// arguments. Immutable once sent; all values are JSON-serialisable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Name of the function to invoke.
    pub function: String,
    /// Positional arguments, in order.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl Call {
    /// Convenience constructor for a call without arguments.
    pub fn bare(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
        }
    }
}

/// The outcome of a [`Call`].
///
/// At most one of `result` and `error` is populated. `error: None` means
/// success; a populated `error` is always a non-empty failure trace. Both
/// fields absent is a no-op acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// The returned value on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// The failure trace on error.
    #[serde(default)]
    pub error: Option<String>,
}

impl CallResult {
    /// A successful result carrying `value`.
    pub fn ok(value: Value) -> Self {
        Self {
            result: Some(value),
            error: None,
        }
    }

    /// A failed result carrying an error trace.
    pub fn err(trace: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(trace.into()),
        }
    }

    /// A no-op acknowledgement.
    pub fn ack() -> Self {
        Self::default()
    }

    /// Whether this result represents a failure.
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Normalise boundary encodings: an empty-string error never means
    /// failure, so it collapses to `None`.
    pub fn normalized(mut self) -> Self {
        if self.error.as_deref() == Some("") {
            self.error = None;
        }
        self
    }
}

/// A [`Call`] annotated with the tool that should execute it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the target tool.
    pub tool: String,
    /// Name of the function to invoke on that tool.
    pub function: String,
    /// Positional arguments, in order.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl ToolCall {
    /// Split into the target tool name and the bare [`Call`].
    pub fn into_parts(self) -> (String, Call) {
        (
            self.tool,
            Call {
                function: self.function,
                args: self.args,
                kwargs: self.kwargs,
            },
        )
    }
}

// ============= Model Reply Types =============

/// A model's reply: either a terminal prose answer or a batch of tool
/// calls to execute, never both.
///
/// On the wire this is the JSON object `{"text": ..., "calls": ...}` with
/// exactly one field non-null; anything else fails to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptResult {
    /// A terminal textual answer for the user.
    Text(String),
    /// Tool invocations the model wants executed, in order.
    Calls(Vec<ToolCall>),
}

impl PromptResult {
    /// The prose answer, if this is a terminal reply.
    pub fn text(&self) -> Option<&str> {
        match self {
            PromptResult::Text(t) => Some(t),
            PromptResult::Calls(_) => None,
        }
    }

    /// The proposed tool calls, if any.
    pub fn calls(&self) -> Option<&[ToolCall]> {
        match self {
            PromptResult::Text(_) => None,
            PromptResult::Calls(c) => Some(c),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PromptResultWire {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    calls: Option<Vec<ToolCall>>,
}

impl Serialize for PromptResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            PromptResult::Text(t) => PromptResultWire {
                text: Some(t.clone()),
                calls: None,
            },
            PromptResult::Calls(c) => PromptResultWire {
                text: None,
                calls: Some(c.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PromptResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = PromptResultWire::deserialize(deserializer)?;
        match (wire.text, wire.calls) {
            (Some(t), None) => Ok(PromptResult::Text(t)),
            (None, Some(c)) => Ok(PromptResult::Calls(c)),
            (Some(_), Some(_)) => Err(serde::de::Error::custom(
                "reply populates both 'text' and 'calls'",
            )),
            (None, None) => Err(serde::de::Error::custom(
                "reply populates neither 'text' nor 'calls'",
            )),
        }
    }
}

// ============= Tool Manifest Types =============

/// One parameter of a tool method.
///
/// The `kind` label is advisory documentation for the model; it is not
/// validated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    /// Parameter name.
    pub name: String,
    /// Advisory type label (e.g. `"str"`, `"number"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// What the parameter means.
    pub description: String,
    /// Whether the parameter may be omitted.
    pub optional: bool,
}

/// The return value of a tool method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReturns {
    /// Advisory type label.
    #[serde(rename = "type")]
    pub kind: String,
    /// What the return value means.
    pub description: String,
}

/// One failure mode of a tool method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRaise {
    /// Advisory error label.
    #[serde(rename = "type")]
    pub kind: String,
    /// When the failure occurs.
    pub description: String,
}

/// Machine-readable description of one tool method, consumed by models as
/// documentation. Derived once at worker start and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Method name.
    pub name: String,
    /// What the method does.
    pub description: String,
    /// Parameters, in declaration order.
    pub params: Vec<ToolParam>,
    /// Return value, if the method returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ToolReturns>,
    /// Failure modes.
    #[serde(default)]
    pub raises: Vec<ToolRaise>,
}

/// The full manifest of one tool: its name plus the specs of every public
/// method it exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name, unique within one runtime.
    pub name: String,
    /// Specs of all exposed methods.
    pub specs: Vec<ToolSpec>,
}

// ============= Conversation Types =============

/// A single message in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The message content.
    pub content: String,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Record a message now.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions to the model.
    System,
    /// Message from the user (including serialised tool results).
    User,
    /// Reply from the model.
    Assistant,
    /// Output attributed to a tool.
    Tool,
}

// ============= Error Types =============

/// Runtime-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Malformed or missing configuration; fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool or model with this name is already registered.
    #[error("\"{0}\" already exists")]
    AlreadyExists(String),

    /// No tool or model with this name is registered.
    #[error("\"{0}\" does not exist")]
    NotFound(String),

    /// A tool does not expose the requested method.
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// A tool or RPC handler failed; carries the remote trace verbatim.
    #[error("Remote error: {0}")]
    Remote(String),

    /// No reply within the deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Model output did not conform to the `PromptResult` contract.
    #[error("Model protocol error: {0}")]
    ModelProtocol(String),

    /// The tool's worker is dead or its channel is closed.
    #[error("tool \"{0}\" is unavailable")]
    ToolUnavailable(String),

    /// Input validation failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialisation failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal runtime error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AgentError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AgentError::NotFound(_) | AgentError::NoSuchMethod(_) => {
                axum::http::StatusCode::NOT_FOUND
            }
            AgentError::InvalidInput(_) | AgentError::AlreadyExists(_) => {
                axum::http::StatusCode::BAD_REQUEST
            }
            AgentError::Timeout(_) => axum::http::StatusCode::GATEWAY_TIMEOUT,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });

        (status, axum::Json(body)).into_response()
    }
}

/// A specialized Result type for relay operations.
pub type Result<T> = std::result::Result<T, AgentError>;
