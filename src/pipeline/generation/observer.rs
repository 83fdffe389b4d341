//! Progress observers.

use serde_json::Value;

use super::traits::ProgressObserver;
use super::types::{GenerationLog, LogStep, PipelineRunResult};
use crate::pipeline::structuring::AttemptLog;

/// Forwards the progress stream into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_log(&self, entry: &GenerationLog) {
        match entry.step {
            LogStep::Error => {
                tracing::warn!(step = %entry.step, details = %entry.details, "{}", entry.message)
            }
            LogStep::Init | LogStep::Quota | LogStep::Completed => {
                tracing::info!(step = %entry.step, details = %entry.details, "{}", entry.message)
            }
            _ => tracing::debug!(step = %entry.step, details = %entry.details, "{}", entry.message),
        }
    }

    fn on_question_saved(&self, total_so_far: u32) {
        tracing::info!(total = total_so_far, "Question saved");
    }

    fn on_complete(&self, result: &PipelineRunResult) {
        tracing::info!(
            chunk_id = %result.chunk_id,
            success = result.success,
            generated = result.generated,
            "Generation run finished"
        );
    }

    fn on_error(&self, message: &str) {
        tracing::error!(error = %message, "Generation run failed");
    }
}

/// Adapts an observer to the structured generator's attempt log,
/// tagging every entry with one step.
pub struct StepLog<'a> {
    observer: &'a dyn ProgressObserver,
    step: LogStep,
}

impl<'a> StepLog<'a> {
    pub fn new(observer: &'a dyn ProgressObserver, step: LogStep) -> Self {
        Self { observer, step }
    }
}

impl AttemptLog for StepLog<'_> {
    fn log(&self, message: &str, details: Value) {
        self.observer.log(self.step, message, details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::generation::test_support::RecordingObserver;
    use serde_json::json;

    #[test]
    fn step_log_tags_entries() {
        let observer = RecordingObserver::default();
        let log = StepLog::new(&observer, LogStep::Validating);
        log.log("Retry attempt #1", json!({"n": 1}));
        let entries = observer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].step, LogStep::Validating);
        assert_eq!(entries[0].message, "Retry attempt #1");
    }

    #[test]
    fn tracing_observer_accepts_every_callback() {
        let observer = TracingObserver;
        observer.log(LogStep::Init, "start", Value::Null);
        observer.on_question_saved(1);
        observer.on_complete(&PipelineRunResult::failed("c1", "boom"));
        observer.on_error("boom");
    }
}
