//! Ollama chat client.
//!
//! Sends a single non-streaming `/api/chat` request per prompt and maps
//! HTTP and transport failures onto [`ProviderError`] so the request gate
//! can tell retryable trouble from terminal trouble.

use crate::error::{AnalysisError, ProviderError};
use crate::provider::{Completion, ReasoningProvider, Usage};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the Ollama API.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// [`ReasoningProvider`] backed by a local or remote Ollama server.
pub struct OllamaProvider {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Build the HTTP client. Failures here are setup errors, never retried.
    pub fn new(config: OllamaConfig) -> Result<Self, AnalysisError> {
        let url = reqwest::Url::parse(&config.ollama_url).map_err(|e| {
            AnalysisError::InvalidConfig(format!("invalid Ollama URL {}: {}", config.ollama_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AnalysisError::InvalidConfig(format!(
                "Ollama URL must use http or https: {}",
                config.ollama_url
            )));
        }

        info!(
            "Using Ollama model {} at {}",
            config.model_name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn send_prompt(&self, prompt: String) -> Result<Completion, ProviderError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: &self.config.model_name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, retry_after));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("unreadable Ollama response: {}", e)))?;

        let usage = Usage {
            input_tokens: chat_response.prompt_eval_count.unwrap_or(0),
            output_tokens: chat_response.eval_count.unwrap_or(0),
        };
        debug!("Ollama replied with {} tokens", usage.total());

        Ok(Completion {
            text: chat_response.message.content,
            usage,
        })
    }

    fn classify_transport(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Transient(format!(
                "request timed out after {}s",
                self.config.timeout_seconds
            ))
        } else if e.is_connect() {
            ProviderError::Transient(format!(
                "cannot connect to Ollama at {}",
                self.config.ollama_url
            ))
        } else {
            ProviderError::Transient(format!("failed to send request: {}", e))
        }
    }
}

impl ReasoningProvider for OllamaProvider {
    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<Completion, ProviderError>> {
        Box::pin(self.send_prompt(prompt))
    }

    fn model_version(&self) -> &str {
        &self.config.model_name
    }
}

/// Map a non-success HTTP status onto the retry taxonomy.
fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> ProviderError {
    let detail = format!("Ollama API error {}: {}", status, body.trim());

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(detail),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::Malformed(detail)
        }
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            ProviderError::Transient(detail)
        }
        _ => ProviderError::Malformed(detail),
    }
}

/// Only the delta-seconds form of `Retry-After` is understood.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

const SYSTEM_PROMPT: &str = r#"You are an expert compliance auditor reviewing source code.
Judge the code only against the requested framework.
Reply with a single JSON object and nothing else."#;
