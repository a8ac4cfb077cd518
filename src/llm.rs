//! Chat model providers implementing [`documentor_core::llm::ChatModel`].
//!
//! - **[`OllamaChat`]**: `POST {url}/api/chat` with `stream: false`.
//! - **[`OpenAIChat`]**: `POST https://api.openai.com/v1/chat/completions`.
//!
//! Requests carry the configured timeout. There is no retry: a failed call
//! surfaces as [`RagError::Generation`] and the session renders its
//! fallback message.

use anyhow::{bail, Result};
use async_trait::async_trait;
use documentor_core::llm::{ChatMessage, ChatModel};
use documentor_core::RagError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;

type CoreResult<T> = documentor_core::Result<T>;

fn generation_error(e: impl std::fmt::Display) -> RagError {
    RagError::Generation(e.to_string())
}

async fn post_chat(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    label: &str,
) -> CoreResult<serde_json::Value> {
    let mut request = client.post(url).json(body);
    if let Some(key) = bearer {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            generation_error(format!("{} request timed out", label))
        } else {
            generation_error(format!("{} connection error ({}): {}", label, url, e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(generation_error(format!(
            "{} API error {}: {}",
            label, status, body_text
        )));
    }

    response
        .json()
        .await
        .map_err(|e| generation_error(format!("{} returned invalid JSON: {}", label, e)))
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }
        body
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> CoreResult<String> {
        debug!(model = %self.model, messages = messages.len(), "ollama chat request");
        let endpoint = format!("{}/api/chat", self.url);
        let json = post_chat(
            &self.client,
            &endpoint,
            None,
            &self.request_body(messages),
            "Ollama",
        )
        .await?;
        parse_ollama_chat(&json)
    }
}

/// Extract `message.content` from an Ollama chat response.
pub fn parse_ollama_chat(json: &serde_json::Value) -> CoreResult<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return Err(generation_error(format!("Ollama error: {}", err)));
    }
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| generation_error("Invalid Ollama response: missing message.content"))
}

// ============ OpenAI ============

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIChat {
    model: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> CoreResult<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        let json = post_chat(
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            Some(&self.api_key),
            &body,
            "OpenAI",
        )
        .await?;
        parse_openai_chat(&json)
    }
}

/// Extract `choices[0].message.content` from an OpenAI chat response.
pub fn parse_openai_chat(json: &serde_json::Value) -> CoreResult<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| generation_error("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Create the [`ChatModel`] selected by `llm.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
