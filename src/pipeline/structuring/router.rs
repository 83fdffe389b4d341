//! Backend lookup by string tag.

use std::collections::HashMap;
use std::sync::Arc;

use super::ollama::{OllamaBackend, OLLAMA_BACKEND_ID};
use super::openai::{OpenAiCompatibleBackend, OPENAI_BACKEND_ID};
use super::pacing::TokenBudget;
use super::types::LlmBackend;
use super::StructuringError;
use crate::config::Endpoints;

const DEFAULT_LOCAL_MODEL: &str = "qwen2.5:14b";
const DEFAULT_HOSTED_MODEL: &str = "gpt-4o-mini";

/// Registered backends keyed by their tag.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ollama always; the OpenAI-compatible backend only when a key is configured.
    pub fn from_endpoints(endpoints: &Endpoints) -> Result<Self, StructuringError> {
        let mut registry = Self::new();
        registry.register(Arc::new(OllamaBackend::new(
            &endpoints.ollama_url,
            DEFAULT_LOCAL_MODEL,
            endpoints.timeout_secs,
        )?));

        if let Some(key) = &endpoints.openai_key {
            let mut hosted = OpenAiCompatibleBackend::new(
                OPENAI_BACKEND_ID,
                &endpoints.openai_url,
                key,
                DEFAULT_HOSTED_MODEL,
                endpoints.timeout_secs,
            )?;
            if let Some(tpm) = endpoints.tokens_per_minute {
                hosted = hosted.with_budget(Arc::new(TokenBudget::new(tpm)));
            }
            registry.register(Arc::new(hosted));
        }

        tracing::info!(backends = ?registry.ids(), "Backend registry ready");
        Ok(registry)
    }

    /// Register under the backend's own id. Replaces any previous entry.
    pub fn register(&mut self, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(backend.id().to_string(), backend);
    }

    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn LlmBackend>, StructuringError> {
        self.backends
            .get(tag)
            .cloned()
            .ok_or_else(|| StructuringError::UnknownBackend(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.backends.contains_key(tag)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }
}
