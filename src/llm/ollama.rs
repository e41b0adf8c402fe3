//! Local Ollama driver.

use crate::llm::driver::{parse_prompt_result, preamble, ModelDriver};
use crate::types::{Message, PromptResult, Result, Role};
use crate::utils::config::AiConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Driver for a local or remote Ollama server.
///
/// The session is an explicit history array replayed on every request;
/// `format: "json"` makes the server constrain output to valid JSON, which
/// the preamble then shapes into the `PromptResult` contract.
pub struct OllamaDriver {
    client: reqwest::Client,
    base_url: String,
    model: String,
    history: Vec<Message>,
    primed_len: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    format: &'a str,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: WireMessage,
}

impl OllamaDriver {
    /// Build the driver and prime it with the preamble.
    pub async fn connect(config: &AiConfig) -> Result<Self> {
        let mut driver = Self {
            client: reqwest::Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            history: Vec::new(),
            primed_len: 0,
        };

        driver.prompt(&preamble()).await?;
        driver.primed_len = driver.history.len();

        Ok(driver)
    }

    fn wire_history(&self) -> Vec<WireMessage> {
        self.history
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant".to_string(),
                    Role::System => "system".to_string(),
                    _ => "user".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ModelDriver for OllamaDriver {
    async fn prompt(&mut self, text: &str) -> Result<PromptResult> {
        self.history.push(Message::new(Role::User, text));

        let request = ChatRequest {
            model: &self.model,
            messages: self.wire_history(),
            stream: false,
            format: "json",
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.history
            .push(Message::new(Role::Assistant, &response.message.content));

        parse_prompt_result(&response.message.content)
    }

    fn history(&self) -> &[Message] {
        &self.history
    }

    fn reset(&mut self) {
        self.history.truncate(self.primed_len);
    }
}
