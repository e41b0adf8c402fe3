//! The driver trait, preamble protocol and reply validation.

use crate::types::{AgentError, Message, PromptResult, Result};
use crate::utils::config::{AiConfig, ProviderKind};
use async_trait::async_trait;

/// Uniform interface over one vendor session.
///
/// A driver owns its conversation state and mutates it on every prompt, so
/// callers must serialise access per driver; the
/// [`ModelRegistry`](crate::llm::ModelRegistry) does exactly that.
#[async_trait]
pub trait ModelDriver: Send {
    /// Send one user message and return the validated reply.
    ///
    /// Non-conforming model output surfaces as
    /// [`AgentError::ModelProtocol`]; vendor transport failures as
    /// [`AgentError::Http`].
    async fn prompt(&mut self, text: &str) -> Result<PromptResult>;

    /// Read-only view of the conversation so far, preamble included.
    fn history(&self) -> &[Message];

    /// Discard the conversation, keeping the preamble priming so the next
    /// prompt still speaks the `PromptResult` contract.
    fn reset(&mut self);
}

/// Build and prime the driver selected by `config.kind`.
pub async fn connect_driver(config: &AiConfig) -> Result<Box<dyn ModelDriver>> {
    match config.kind {
        ProviderKind::OpenAi => Ok(Box::new(super::openai::OpenAiDriver::connect(config).await?)),
        ProviderKind::Google => Ok(Box::new(super::google::GoogleDriver::connect(config).await?)),
        ProviderKind::Anthropic => Ok(Box::new(
            super::anthropic::AnthropicDriver::connect(config).await?,
        )),
        ProviderKind::Ollama => Ok(Box::new(super::ollama::OllamaDriver::connect(config).await?)),
    }
}

/// The system message that teaches a model the `PromptResult` contract.
///
/// Sent once, as the first user message of every session.
pub fn preamble() -> String {
    let prompt_result_schema = r#"{"text": "str | null", "calls": "List[ToolCall] | null"}"#;
    let tool_call_schema =
        r#"{"tool": "str", "function": "str", "args": "List[Any]", "kwargs": "Dict[str, Any]"}"#;
    let call_result_schema = r#"{"result": "Any | null", "error": "str | null"}"#;

    format!(
        "You are a helpful AI assistant who is capable of the following:\n\
         * Responding to prompts ONLY with a JSON object with this type schema: {prompt_result_schema}.\n\
         * Breaking down user queries step-by-step and thinking carefully about how to respond.\n\
         * Deciding whether or not tool call(s) should be made.\n\
           Tools will be made available for you to call if you want to execute actions or obtain further information to answer a user query.\n\
           The description of available tools may be provided in future prompts.\n\
           When a new tool description is provided, you will remember it so you can use it for future queries if necessary.\n\
         * If no tool needs to be called, you will speak directly to the user.\n\
         * If you are speaking directly to the user, you will put your speech content inside the 'text' property and set the 'calls' property to null.\n\
         * If you are performing tool call(s), you will set the 'calls' property to an array of 'ToolCall' objects and set the 'text' property to null.\n\
           Each 'ToolCall' object has this schema: {tool_call_schema}.\n\
         * After performing tool call(s), you will expect the next immediate prompt to be the result(s) of the call(s).\n\
           Each result will be presented as a 'CallResult' object of the following schema: {call_result_schema}.\n\
           If a call was successful, its output can be found in the 'result' property and 'error' will be null.\n\
           If a call was unsuccessful, 'error' will contain the error message and 'result' will be null.\n\
           Upon receiving the 'CallResult' objects you may then proceed to either make further tool call(s) or speak directly to the user."
    )
}

/// The corrective message sent once after a non-conforming reply.
pub(crate) const REPROMPT: &str = "Your previous reply did not conform to the required schema. \
     Respond again to the previous prompt, ONLY with a JSON object of the schema \
     {\"text\": \"str | null\", \"calls\": \"List[ToolCall] | null\"} and no other content.";

/// Validate a raw model reply against the `PromptResult` contract.
///
/// Models occasionally wrap JSON in a markdown fence even when asked not
/// to; the fence is stripped before parsing.
pub fn parse_prompt_result(raw: &str) -> Result<PromptResult> {
    let text = strip_code_fence(raw.trim());

    serde_json::from_str(text).map_err(|e| {
        let mut excerpt: String = raw.chars().take(200).collect();
        if excerpt.len() < raw.len() {
            excerpt.push('…');
        }
        AgentError::ModelProtocol(format!("reply does not conform to PromptResult ({e}): {excerpt}"))
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(text)
}
