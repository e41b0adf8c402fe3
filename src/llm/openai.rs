//! OpenAI Responses API driver.

use crate::llm::driver::{parse_prompt_result, preamble, ModelDriver};
use crate::types::{Message, PromptResult, Result, Role};
use crate::utils::config::AiConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Driver for OpenAI's Responses API.
///
/// The session is a server-side response-id chain: every request names the
/// previous response and only carries the new user message. A local
/// transcript is mirrored for [`ModelDriver::history`].
pub struct OpenAiDriver {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    last_response_id: Option<String>,
    primed_response_id: Option<String>,
    transcript: Vec<Message>,
    primed_len: usize,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: String,
}

impl OpenAiDriver {
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
            last_response_id: None,
            primed_response_id: None,
            transcript: Vec::new(),
            primed_len: 0,
        };

        driver.prompt(&preamble()).await?;
        driver.primed_response_id = driver.last_response_id.clone();
        driver.primed_len = driver.transcript.len();

        Ok(driver)
    }
}

#[async_trait]
impl ModelDriver for OpenAiDriver {
    async fn prompt(&mut self, text: &str) -> Result<PromptResult> {
        // The first request opens the chain with bare input; follow-ups
        // reference the previous response and send only the new message.
        let input = match self.last_response_id {
            None => json!(text),
            Some(_) => json!([{"role": "user", "content": text}]),
        };

        let request = ResponsesRequest {
            model: &self.model,
            input,
            previous_response_id: self.last_response_id.as_deref(),
        };

        let response: ResponsesResponse = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply: String = response
            .output
            .iter()
            .flat_map(|item| item.content.iter())
            .map(|part| part.text.as_str())
            .collect();

        self.last_response_id = Some(response.id);
        self.transcript.push(Message::new(Role::User, text));
        self.transcript.push(Message::new(Role::Assistant, &reply));

        parse_prompt_result(&reply)
    }

    fn history(&self) -> &[Message] {
        &self.transcript
    }

    fn reset(&mut self) {
        self.last_response_id = self.primed_response_id.clone();
        self.transcript.truncate(self.primed_len);
    }
}
