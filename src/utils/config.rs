//! Immutable runtime settings: servers, tools, models.
//!
//! The runtime core consumes these as already-parsed values. A JSON file
//! loader is provided for the server binary; everything else receives a
//! [`MainConfig`] by value.

use crate::types::{AgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

fn default_timeout() -> u64 {
    10
}

/// Endpoint settings shared by the HTTP facade and the RPC fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host to bind or connect to.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Per-operation deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl EndpointConfig {
    /// The `host:port` address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The per-operation deadline as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

/// HTTP facade settings.
pub type HttpConfig = EndpointConfig;
/// RPC broker/server/client settings.
pub type RpcConfig = EndpointConfig;

/// Which servers the runtime exposes. Both are optional; a runtime without
/// servers is library-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP facade endpoint, if enabled.
    #[serde(default)]
    pub http: Option<HttpConfig>,
    /// RPC broker endpoint, if enabled.
    #[serde(default)]
    pub rpc: Option<RpcConfig>,
}

/// Top-level settings block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Server endpoints.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Configuration of one tool worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Unique tool name within the runtime.
    pub name: String,
    /// Which registered tool builder to instantiate (e.g. `"file"`).
    pub kind: String,
    /// Opaque tool-specific settings, handed to the builder verbatim.
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI Responses API.
    OpenAi,
    /// Google Gemini.
    Google,
    /// Anthropic Messages API.
    Anthropic,
    /// Local Ollama server.
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Google => "google",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

/// Configuration of one named model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    /// Unique model name within the runtime.
    pub name: String,
    /// Vendor model identifier (e.g. `"gpt-4o-mini"`).
    pub model: String,
    /// Which driver to use.
    pub kind: ProviderKind,
    /// Vendor API key. May be empty for local providers.
    #[serde(default)]
    pub api_key: String,
    /// Override for the vendor endpoint. Each driver has a sensible
    /// default; local providers and tests set this explicitly.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// The complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainConfig {
    /// Server endpoints.
    #[serde(default)]
    pub settings: Settings,
    /// Tools to start.
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    /// Models to register.
    #[serde(default)]
    pub ais: Vec<AiConfig>,
}

impl MainConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("failed to load {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("malformed config {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn endpoint_defaults_timeout() {
        let config: EndpointConfig =
            serde_json::from_str(r#"{"host": "127.0.0.1", "port": 5555}"#).unwrap();
        assert_eq!(config.timeout_seconds, 10);
        assert_eq!(config.address(), "127.0.0.1:5555");
    }

    #[rstest]
    #[case("openai", ProviderKind::OpenAi)]
    #[case("google", ProviderKind::Google)]
    #[case("anthropic", ProviderKind::Anthropic)]
    #[case("ollama", ProviderKind::Ollama)]
    fn provider_kind_parses(#[case] raw: &str, #[case] expected: ProviderKind) {
        let parsed: ProviderKind = serde_json::from_value(serde_json::json!(raw)).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn unknown_provider_kind_is_rejected() {
        assert!(serde_json::from_value::<ProviderKind>(serde_json::json!("cohere")).is_err());
    }

    #[test]
    fn full_config_parses() {
        let config: MainConfig = serde_json::from_str(
            r#"{
                "settings": {
                    "server": {
                        "http": {"host": "127.0.0.1", "port": 8000},
                        "rpc": {"host": "127.0.0.1", "port": 5555, "timeout_seconds": 5}
                    }
                },
                "tools": [
                    {"name": "file", "kind": "file"},
                    {"name": "calc", "kind": "calc", "config": {"precision": 6}}
                ],
                "ais": [
                    {"name": "my_ai", "model": "llama3.2", "kind": "ollama"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.tools[1].config["precision"], 6);
        assert_eq!(config.ais[0].kind, ProviderKind::Ollama);
        assert_eq!(config.ais[0].api_key, "");
        let rpc = config.settings.server.rpc.unwrap();
        assert_eq!(rpc.timeout_seconds, 5);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = MainConfig::from_file("/nonexistent/relay.json").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
