//! Question revision: rejected candidate + verdict → replacement.

use async_trait::async_trait;
use serde_json::json;

use super::drafter::{question_json, QUESTION_RETRY_PROMPT};
use super::observer::StepLog;
use super::prompt::{GenerationContext, AUTHOR_SYSTEM_PROMPT};
use super::traits::{ProgressObserver, QuestionReviser};
use super::types::{GenerationConfig, LogStep, ValidationResult};
use crate::models::{GeneratedQuestion, QuestionBody};
use crate::pipeline::structuring::{BackendSelection, StructuredCall, StructuredGenerator};

fn revision_task(question: &GeneratedQuestion, verdict: &ValidationResult) -> String {
    let rejected = serde_json::to_string_pretty(&question_json(&question.body)).unwrap_or_default();
    let faults = if verdict.critical_faults.is_empty() {
        "- (none listed)".to_string()
    } else {
        verdict
            .critical_faults
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let suggestion = if verdict.improvement_suggestion.trim().is_empty() {
        "(none)"
    } else {
        verdict.improvement_suggestion.as_str()
    };

    format!(
        "The question below was REJECTED for the listed reasons (score {score}/100).
Revise it using the feedback. Keep whatever already works and fix only the named faults. Keep the academic tone.

## REJECTED QUESTION
{rejected}

## REJECTION REASONS (CRITICAL FAULTS)
{faults}

## IMPROVEMENT SUGGESTION
{suggestion}

Return the revised question as JSON only.",
        score = verdict.total_score,
    )
}

pub struct LlmQuestionReviser {
    generator: StructuredGenerator,
    selection: BackendSelection,
    fallback: Option<BackendSelection>,
    max_retries: u32,
}

impl LlmQuestionReviser {
    pub fn new(generator: StructuredGenerator, config: &GenerationConfig) -> Self {
        Self {
            generator,
            selection: config.revision.clone(),
            fallback: config.fallback.clone(),
            max_retries: config.max_retries,
        }
    }
}

#[async_trait]
impl QuestionReviser for LlmQuestionReviser {
    async fn revise(
        &self,
        question: &GeneratedQuestion,
        verdict: &ValidationResult,
        context: &GenerationContext,
        fallback_active: bool,
        observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion> {
        let selection = match (&self.fallback, fallback_active) {
            (Some(fallback), true) => fallback,
            _ => &self.selection,
        };
        observer.log(
            LogStep::Validating,
            "Revising question",
            json!({
                "concept": question.concept_title,
                "score": verdict.total_score,
                "faults": verdict.critical_faults,
            }),
        );

        let messages = context.messages(AUTHOR_SYSTEM_PROMPT, &revision_task(question, verdict));
        let call = StructuredCall::new(selection)
            .with_max_retries(self.max_retries)
            .with_corrective_prompt(QUESTION_RETRY_PROMPT);
        let log = StepLog::new(observer, LogStep::Validating);

        let Some(mut body) = self.generator.generate::<QuestionBody>(&messages, &call, &log).await else {
            observer.log(
                LogStep::Validating,
                "Revision failed",
                json!({ "concept": question.concept_title }),
            );
            return None;
        };

        // Level, image and concept belong to the slot, not the wording.
        body.image_index = question.body.image_index;
        Some(GeneratedQuestion {
            body,
            cognitive_level: question.cognitive_level,
            concept_title: question.concept_title.clone(),
        })
    }
}
