//! OpenAI-compatible chat completions backend.
//!
//! Covers hosted gateways that speak `/v1/chat/completions` with a bearer
//! key. An optional [`TokenBudget`] paces requests against the provider's
//! per-minute token limit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pacing::TokenBudget;
use super::types::{ChatMessage, GenerationRequest, LlmBackend, LlmResponse, TokenUsage};
use super::StructuringError;

pub const OPENAI_BACKEND_ID: &str = "openai";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiCompatibleBackend {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
    timeout_secs: u64,
    budget: Option<Arc<TokenBudget>>,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        id: &str,
        base_url: &str,
        api_key: &str,
        default_model: &str,
        timeout_secs: u64,
    ) -> Result<Self, StructuringError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').trim_end_matches("/v1").to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
            client,
            timeout_secs,
            budget: None,
        })
    }

    /// api.openai.com with the default model.
    pub fn openai(api_key: &str, timeout_secs: u64) -> Result<Self, StructuringError> {
        Self::new(
            OPENAI_BACKEND_ID,
            "https://api.openai.com",
            api_key,
            DEFAULT_OPENAI_MODEL,
            timeout_secs,
        )
    }

    pub fn with_budget(mut self, budget: Arc<TokenBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: request.model.as_deref().unwrap_or(&self.default_model),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    /// Some gateways report cache hits at the top level.
    #[serde(default)]
    prompt_cache_hit_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

impl From<ChatCompletionResponse> for LlmResponse {
    fn from(parsed: ChatCompletionResponse) -> Self {
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                cached_tokens: u
                    .prompt_tokens_details
                    .and_then(|d| d.cached_tokens)
                    .or(u.prompt_cache_hit_tokens),
            })
            .unwrap_or_default();
        LlmResponse {
            content,
            usage,
            model: parsed.model,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<LlmResponse, StructuringError> {
        if let Some(budget) = &self.budget {
            budget.acquire().await;
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    StructuringError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    StructuringError::Timeout(self.timeout_secs)
                } else {
                    StructuringError::HttpClient(e.to_string())
                }
            })?;

        if let Some(budget) = &self.budget {
            budget.sync_headers(response.headers());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StructuringError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        Ok(parsed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::types::BackendSelection;

    #[test]
    fn base_url_normalised() {
        let backend =
            OpenAiCompatibleBackend::new("gateway", "https://llm.example/v1/", "k", "m", 10).unwrap();
        assert_eq!(backend.base_url, "https://llm.example");
        assert_eq!(backend.id(), "gateway");
    }

    #[test]
    fn body_carries_messages_and_limits() {
        let backend = OpenAiCompatibleBackend::openai("sk-test", 10).unwrap();
        let mut selection = BackendSelection::new(OPENAI_BACKEND_ID);
        selection.max_tokens = Some(2048);
        let request = GenerationRequest::new(vec![ChatMessage::user("hello")], &selection);
        let body = serde_json::to_value(backend.build_body(&request)).unwrap();
        assert_eq!(body["model"], DEFAULT_OPENAI_MODEL);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn response_reads_first_choice_and_cache_hits() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"model":"m","choices":[{"message":{"role":"assistant","content":"[1]"}}],
                "usage":{"prompt_tokens":900,"completion_tokens":50,"prompt_tokens_details":{"cached_tokens":800}}}"#,
        )
        .unwrap();
        let response: LlmResponse = parsed.into();
        assert_eq!(response.content, "[1]");
        assert_eq!(response.usage.cached_tokens, Some(800));
    }

    #[test]
    fn null_content_becomes_empty() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        let response: LlmResponse = parsed.into();
        assert!(response.content.is_empty());
    }

    #[test]
    fn top_level_cache_counter_is_used() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"prompt_cache_hit_tokens":6}}"#,
        )
        .unwrap();
        let response: LlmResponse = parsed.into();
        assert_eq!(response.usage.cached_tokens, Some(6));
    }
}
