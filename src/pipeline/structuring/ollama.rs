use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, GenerationRequest, LlmBackend, LlmResponse, TokenUsage};
use super::StructuringError;

pub const OLLAMA_BACKEND_ID: &str = "ollama";
const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:14b";

/// Ollama HTTP backend (`/api/chat`, non-streaming).
pub struct OllamaBackend {
    base_url: String,
    default_model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: &str, default_model: &str, timeout_secs: u64) -> Result<Self, StructuringError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            client,
            timeout_secs,
        })
    }

    /// Local instance at localhost:11434 with the default model.
    pub fn default_local(timeout_secs: u64) -> Result<Self, StructuringError> {
        Self::new("http://localhost:11434", DEFAULT_OLLAMA_MODEL, timeout_secs)
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: request.model.as_deref().unwrap_or(&self.default_model),
            messages: &request.messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> StructuringError {
        if e.is_connect() {
            StructuringError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            StructuringError::Timeout(self.timeout_secs)
        } else {
            StructuringError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/chat
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response body from Ollama /api/chat
#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl From<OllamaChatResponse> for LlmResponse {
    fn from(parsed: OllamaChatResponse) -> Self {
        LlmResponse {
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            usage: TokenUsage {
                prompt_tokens: parsed.prompt_eval_count,
                completion_tokens: parsed.eval_count,
                cached_tokens: None,
            },
            model: parsed.model,
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn id(&self) -> &str {
        OLLAMA_BACKEND_ID
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<LlmResponse, StructuringError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_body(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StructuringError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        Ok(parsed.into())
    }
}
