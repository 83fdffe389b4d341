//! Backend call + extraction + schema check, with corrective retries.
//!
//! Expected failures (transport errors, unparseable text, schema
//! violations) are reported through an [`AttemptLog`] and consume the same
//! retry budget. None of them cross this boundary as an error: the caller
//! receives `None` once the budget is spent.

use serde_json::{json, Value};

use super::parser::extract_structured;
use super::router::BackendRegistry;
use super::schema::{conform, StructuredSchema};
use super::types::{BackendSelection, ChatMessage, GenerationRequest, TokenUsage};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

pub const DEFAULT_CORRECTIVE_PROMPT: &str = "YOUR PREVIOUS ANSWER DID NOT MATCH THE REQUIRED JSON SCHEMA.\n\
Return valid JSON only.\n\
No prose, no markdown, only the JSON data.";

/// Longest raw-response excerpt attached to a log entry.
const RAW_EXCERPT_CHARS: usize = 500;

/// Receives attempt-level telemetry from the generator.
pub trait AttemptLog: Send + Sync {
    fn log(&self, message: &str, details: Value);
}

impl<F> AttemptLog for F
where
    F: Fn(&str, Value) + Send + Sync,
{
    fn log(&self, message: &str, details: Value) {
        self(message, details)
    }
}

/// Discards every entry.
pub struct NoopLog;

impl AttemptLog for NoopLog {
    fn log(&self, _message: &str, _details: Value) {}
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct StructuredCall<'a> {
    pub selection: &'a BackendSelection,
    pub max_retries: u32,
    pub corrective_prompt: &'a str,
}

impl<'a> StructuredCall<'a> {
    pub fn new(selection: &'a BackendSelection) -> Self {
        Self {
            selection,
            max_retries: DEFAULT_MAX_RETRIES,
            corrective_prompt: DEFAULT_CORRECTIVE_PROMPT,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_corrective_prompt(mut self, prompt: &'a str) -> Self {
        self.corrective_prompt = prompt;
        self
    }
}

#[derive(Clone)]
pub struct StructuredGenerator {
    registry: BackendRegistry,
}

impl StructuredGenerator {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    /// Produce one schema-valid `T` within `1 + max_retries` backend calls.
    ///
    /// Every retry sends the original conversation plus exactly one
    /// corrective user turn.
    pub async fn generate<T: StructuredSchema>(
        &self,
        messages: &[ChatMessage],
        call: &StructuredCall<'_>,
        log: &dyn AttemptLog,
    ) -> Option<T> {
        let backend = match self.registry.resolve(&call.selection.backend) {
            Ok(backend) => backend,
            Err(e) => {
                log.log("Backend unavailable", json!({ "error": e.to_string() }));
                tracing::warn!(backend = %call.selection.backend, error = %e, "Structured generation skipped");
                return None;
            }
        };

        for attempt in 0..=call.max_retries {
            let attempt_no = attempt + 1;
            let mut conversation = messages.to_vec();
            if attempt > 0 {
                conversation.push(ChatMessage::user(call.corrective_prompt));
                log.log(&format!("Retry attempt #{attempt}"), Value::Null);
            }

            let request = GenerationRequest::new(conversation, call.selection);
            let response = match backend.complete(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(backend = backend.id(), attempt = attempt_no, error = %e, "Backend call failed");
                    log.log(
                        &format!("Generation error (attempt {attempt_no})"),
                        json!({ "error": e.to_string() }),
                    );
                    continue;
                }
            };

            report_usage(&response.usage, log);

            let Some(candidate) = extract_structured(Some(&response.content), T::SHAPE) else {
                log.log(
                    &format!("JSON parse failure (attempt {attempt_no})"),
                    json!({ "raw_content": excerpt(&response.content) }),
                );
                continue;
            };

            match conform::<T>(candidate) {
                Ok(value) => return Some(value),
                Err(issues) => {
                    tracing::debug!(attempt = attempt_no, issues = %issues, "Schema violation");
                    log.log(
                        &format!("Schema validation failure (attempt {attempt_no})"),
                        json!({ "error": issues, "raw_content": excerpt(&response.content) }),
                    );
                }
            }
        }

        log.log(
            "Structured generation exhausted its retries",
            json!({ "attempts": call.max_retries + 1 }),
        );
        None
    }
}

fn report_usage(usage: &TokenUsage, log: &dyn AttemptLog) {
    if usage.is_empty() {
        return;
    }
    log.log(
        "Token usage",
        json!({
            "prompt": usage.prompt_tokens,
            "completion": usage.completion_tokens,
            "cached": usage.cached_tokens,
            "total": usage.total(),
        }),
    );
}

fn excerpt(text: &str) -> String {
    text.chars().take(RAW_EXCERPT_CHARS).collect()
}
