//! Language model backends for the qualitative review pass.
//!
//! The review pipeline only needs "send a prompt, get text back" with
//! bounded latency. [`ChatClient`] speaks the OpenAI-compatible chat
//! completions protocol, which Groq, OpenRouter and Ollama's `/v1` all serve.


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::{Config, LlmConfig};
use crate::retry::{Failure, HttpCall, RetryPolicy};
use crate::{Result, ReviewError};

/// Sends one prompt and returns the model's text answer
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Model identifier, for logs and notes
    fn name(&self) -> &str;

    /// Fails with [`ReviewError::ModelBackendTimeout`] or
    /// [`ReviewError::ModelBackendRejected`]
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl ChatClient {
    #[inline]
    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ReviewError::Config(format!("Invalid model endpoint: {e}")))?;

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            agent: build_agent(retry.timeout),
            retry,
        })
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn map_failure(failure: Failure<String>) -> ReviewError {
    match failure {
        Failure::Timeout => ReviewError::ModelBackendTimeout("no answer within the timeout".to_string()),
        Failure::Transient(reason) | Failure::Permanent(reason) => {
            ReviewError::ModelBackendRejected(reason)
        }
    }
}

#[async_trait]
impl ModelBackend for ChatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| ReviewError::ModelBackendRejected(format!("unencodable request: {e}")))?;

        debug!(
            "Sending {} byte prompt to {} ({})",
            prompt.len(),
            self.model,
            self.endpoint
        );

        let call = HttpCall::PostJson {
            url: self.endpoint.to_string(),
            body,
            bearer: self.api_key.clone(),
        };
        let response_text = self
            .retry
            .http(&self.agent, "chat completion", &call)
            .await
            .map_err(map_failure)?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ReviewError::ModelBackendRejected(format!("malformed response: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ReviewError::ModelBackendRejected("empty completion".to_string()))
    }
}

fn is_local(endpoint: &Url) -> bool {
    matches!(
        endpoint.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
    )
}

/// Build the configured backend, or `None` when the qualitative pass is off.
///
/// Remote endpoints without an API key are treated as off.
#[inline]
pub fn create_backend(config: &Config) -> Result<Option<Arc<dyn ModelBackend>>> {
    if !config.llm.enabled {
        debug!("Model backend disabled in configuration");
        return Ok(None);
    }

    let client = ChatClient::new(&config.llm, config.retry.policy())?;
    if !client.has_api_key() && !is_local(client.endpoint()) {
        warn!(
            "No API key for {}; qualitative review is skipped",
            client.endpoint()
        );
        return Ok(None);
    }

    Ok(Some(Arc::new(client)))
}
