use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::StructuringError;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Which backend to call and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSelection {
    /// Registry tag, e.g. `"ollama"` or `"openai"`.
    pub backend: String,
    /// Overrides the backend's default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for BackendSelection {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: None,
            temperature: 0.1,
            max_tokens: None,
        }
    }
}

impl BackendSelection {
    pub fn new(backend: &str) -> Self {
        Self {
            backend: backend.to_string(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// One call to a text-generation backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>, selection: &BackendSelection) -> Self {
        Self {
            messages,
            model: selection.model.clone(),
            temperature: selection.temperature,
            max_tokens: selection.max_tokens,
        }
    }
}

/// Token accounting reported by the backend. Fields are absent when the backend does not report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cached_tokens: Option<u32>,
}

impl TokenUsage {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none() && self.cached_tokens.is_none()
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens
            .unwrap_or(0)
            .saturating_add(self.completion_tokens.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Generated text. May be empty, truncated, or not JSON at all.
    pub content: String,
    pub usage: TokenUsage,
    pub model: Option<String>,
}

/// A text-generation backend. Content problems are never errors here;
/// only transport and protocol failures are.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Registry tag of this backend.
    fn id(&self) -> &str;

    async fn complete(&self, request: &GenerationRequest) -> Result<LlmResponse, StructuringError>;
}
