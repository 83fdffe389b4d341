//! Scripted backend for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{GenerationRequest, LlmBackend, LlmResponse, TokenUsage};
use super::StructuringError;

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(String),
    Fail(String),
}

type Responder = Box<dyn Fn(&GenerationRequest) -> ScriptStep + Send + Sync>;

/// Replays queued replies in order, then defers to an optional responder.
/// Every request is recorded for later inspection.
pub struct ScriptedBackend {
    id: String,
    queue: Mutex<VecDeque<ScriptStep>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<I, S>(id: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new(id);
        for reply in replies {
            backend.push(ScriptStep::Reply(reply.into()));
        }
        backend
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&GenerationRequest) -> ScriptStep + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn push(&self, step: ScriptStep) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(step);
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<LlmResponse, StructuringError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let step = match (queued, &self.responder) {
            (Some(step), _) => step,
            (None, Some(responder)) => responder(request),
            (None, None) => {
                return Err(StructuringError::HttpClient("scripted backend exhausted".into()))
            }
        };

        match step {
            ScriptStep::Reply(content) => Ok(LlmResponse {
                content,
                usage: TokenUsage::default(),
                model: Some(self.id.clone()),
            }),
            ScriptStep::Fail(reason) => Err(StructuringError::Api {
                status: 503,
                body: reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::types::{BackendSelection, ChatMessage};

    fn request() -> GenerationRequest {
        GenerationRequest::new(vec![ChatMessage::user("q")], &BackendSelection::default())
    }

    #[tokio::test]
    async fn replays_queue_then_responder() {
        let backend = ScriptedBackend::with_replies("fake", ["one"])
            .with_responder(|_| ScriptStep::Reply("fallback".into()));
        assert_eq!(backend.complete(&request()).await.unwrap().content, "one");
        assert_eq!(backend.complete(&request()).await.unwrap().content, "fallback");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_errors() {
        let backend = ScriptedBackend::new("fake");
        assert!(backend.complete(&request()).await.is_err());
    }

    #[tokio::test]
    async fn scripted_failure_is_api_error() {
        let backend = ScriptedBackend::new("fake");
        backend.push(ScriptStep::Fail("overloaded".into()));
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, StructuringError::Api { status: 503, .. }));
    }
}
