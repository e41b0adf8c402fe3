//! Google Gemini driver.

use crate::llm::driver::{parse_prompt_result, preamble, ModelDriver};
use crate::types::{AgentError, Message, PromptResult, Result, Role};
use crate::utils::config::AiConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Driver for Google Gemini.
///
/// The session is the accumulated `contents` array of a chat; the response
/// MIME type is pinned to JSON so replies stay inside the `PromptResult`
/// contract.
pub struct GoogleDriver {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    history: Vec<Message>,
    primed_len: usize,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: serde_json::Value,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl GoogleDriver {
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

    fn wire_history(&self) -> Vec<Content> {
        self.history
            .iter()
            .map(|m| Content {
                role: match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                },
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect()
    }
}

#[async_trait]
impl ModelDriver for GoogleDriver {
    async fn prompt(&mut self, text: &str) -> Result<PromptResult> {
        self.history.push(Message::new(Role::User, text));

        let request = GenerateRequest {
            contents: self.wire_history(),
            generation_config: json!({"responseMimeType": "application/json"}),
        };

        let response: GenerateResponse = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = response
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<String>()
            })
            .ok_or_else(|| AgentError::ModelProtocol("reply carries no candidates".into()))?;

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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn assistant_turns_use_the_model_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [
                    {"text": "{\"text\": \"hi\", \"calls\": null}"}
                ]}}]
            })))
            .mount(&server)
            .await;

        let config = AiConfig {
            name: "gemini".into(),
            model: "gemini-2.0-flash".into(),
            kind: crate::utils::config::ProviderKind::Google,
            api_key: "key".into(),
            base_url: Some(server.uri()),
        };

        let mut driver = GoogleDriver::connect(&config).await.unwrap();
        driver.prompt("hello").await.unwrap();

        let wire = driver.wire_history();
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[1].role, "model");
    }
}
