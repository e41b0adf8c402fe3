//! Anthropic Messages API driver.

use crate::llm::driver::{parse_prompt_result, preamble, ModelDriver};
use crate::types::{AgentError, Message, PromptResult, Result, Role};
use crate::utils::config::AiConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Driver for Anthropic's Messages API.
///
/// The session is an explicit history array of alternating user/assistant
/// messages replayed on every request; the preamble travels as the first
/// user message.
pub struct AnthropicDriver {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    history: Vec<Message>,
    primed_len: usize,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicDriver {
    /// Build the driver and prime it with the preamble.
    pub async fn connect(config: &AiConfig) -> Result<Self> {
        let mut driver = Self {
            client: reqwest::Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
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
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ModelDriver for AnthropicDriver {
    async fn prompt(&mut self, text: &str) -> Result<PromptResult> {
        self.history.push(Message::new(Role::User, text));

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: self.wire_history(),
        };

        let response: MessagesResponse = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| AgentError::ModelProtocol("reply carries no content".into()))?;

        self.history.push(Message::new(Role::Assistant, &reply));

        parse_prompt_result(&reply)
    }

    fn history(&self) -> &[Message] {
        &self.history
    }

    fn reset(&mut self) {
        self.history.truncate(self.primed_len);
    }
}
