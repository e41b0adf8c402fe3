//! Model Drivers and Registry
//!
//! This module provides a uniform `prompt(text) -> PromptResult` interface
//! over several LLM vendors. Conversation state lives inside each driver:
//! whatever session primitive the vendor offers (a response-id chain, a
//! chat session, an explicit history array) is hidden behind
//! [`ModelDriver`].
//!
//! All drivers share the preamble protocol: on construction the model is
//! primed with a system message teaching it to answer every prompt with a
//! JSON object matching the [`PromptResult`](crate::types::PromptResult)
//! contract: prose in `text`, proposed tool calls in `calls`, never both.
//!
//! # Supported providers
//!
//! - [`openai`] - OpenAI Responses API (previous-response-id chaining)
//! - [`google`] - Google Gemini (accumulated chat contents)
//! - [`anthropic`] - Anthropic Messages API (explicit history array)
//! - [`ollama`] - Local Ollama server (history array, JSON output mode)

/// Anthropic Messages API driver.
pub mod anthropic;
/// The driver trait, preamble protocol and reply validation.
pub mod driver;
/// Google Gemini driver.
pub mod google;
/// Local Ollama driver.
pub mod ollama;
/// OpenAI Responses API driver.
pub mod openai;
/// Registry of named models.
pub mod registry;

pub use driver::{connect_driver, parse_prompt_result, preamble, ModelDriver};
pub use registry::ModelRegistry;
