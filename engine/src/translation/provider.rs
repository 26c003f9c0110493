//! Concrete `Translator` backends: Gemini (via its OpenAI-compatibility
//! endpoint) and any OpenAI-compatible chat-completions API. Both share the
//! same request shape; grounded on the pack's OpenRouter/NIM client pattern.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("missing API credentials for {0}")]
    MissingCredentials(&'static str),
    #[error("server error or timeout: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl TranslatorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranslatorError::Transient(_))
    }
}

/// One call to a chat-completions-shaped provider: `messages` is the full
/// conversation (system prompt, history pairs, final user turn).
#[async_trait]
pub trait Translator: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TranslatorError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

struct OpenAiCompatibleTranslator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleTranslator {
    fn new(base_url: impl Into<String>, api_key: String, model: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), api_key, model: model.into() }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TranslatorError> {
        let request = ChatRequest { model: &self.model, messages };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslatorError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(TranslatorError::Transient(format!("http {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslatorError::Rejected(format!("http {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslatorError::Rejected(format!("malformed response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TranslatorError::Rejected("empty choices array".to_string()))
    }
}

pub struct GeminiTranslator(OpenAiCompatibleTranslator);

impl GeminiTranslator {
    pub fn new(model: impl Into<String>) -> Result<Self, TranslatorError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| TranslatorError::MissingCredentials("GEMINI_API_KEY"))?;
        Ok(Self(OpenAiCompatibleTranslator::new(GEMINI_BASE_URL, api_key, model)))
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TranslatorError> {
        self.0.complete(messages).await
    }
}

pub struct OpenAiTranslator(OpenAiCompatibleTranslator);

impl OpenAiTranslator {
    pub fn new(model: impl Into<String>) -> Result<Self, TranslatorError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| TranslatorError::MissingCredentials("OPENAI_API_KEY"))?;
        Ok(Self(OpenAiCompatibleTranslator::new(OPENAI_BASE_URL, api_key, model)))
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TranslatorError> {
        self.0.complete(messages).await
    }
}

/// ISO-639-1 to English exonym, covering the languages this project's
/// provider prompts are likely to target. Not exhaustive by design: a full
/// locale-data crate is more than this one prompt substitution needs.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "cs" => "Czech",
        "de" => "German",
        "es" => "Spanish",
        "fr" => "French",
        "it" => "Italian",
        "pl" => "Polish",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "uk" => "Ukrainian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_codes_resolve() {
        assert_eq!(language_name("cs"), "Czech");
        assert_eq!(language_name("en"), "English");
    }

    #[test]
    fn unknown_code_passes_through() {
        assert_eq!(language_name("xx"), "xx");
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(TranslatorError::Transient("http 503".into()).is_retryable());
        assert!(!TranslatorError::Rejected("http 400".into()).is_retryable());
    }
}
