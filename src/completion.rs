//! Remote chat completion
//!
//! Questions are sent to an OpenAI-compatible `/v1/chat/completions`
//! endpoint along with the co-host system prompt.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::Result;

/// Question answering backend
#[async_trait]
pub trait Completer: Send + Sync {
    /// Answer `prompt`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Completion`] on timeout, transport failure,
    /// non-success status, or an empty answer
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible chat completions API
pub struct CompletionClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
    model: Option<String>,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl CompletionClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        })
    }

    async fn request(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let body = ChatRequest {
            model: self.model.as_deref(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| self.transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.transport(&e))?;
        extract_answer(parsed)
    }

    fn transport(&self, e: &reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tracing::debug!(url = %self.url, prompt, "requesting completion");

        let answer = tokio::time::timeout(self.timeout, self.request(prompt))
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout))??;

        tracing::debug!(answer_len = answer.len(), "completion received");
        Ok(answer)
    }
}

fn extract_answer(response: ChatResponse) -> std::result::Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(CompletionError::NoAnswer)
}
