//! Question validation: candidate + source text → binary verdict.
//!
//! The reviewer's score is authoritative. Whatever decision text comes
//! back, `score >= threshold` approves and anything lower rejects.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use super::drafter::render_for_review;
use super::observer::StepLog;
use super::prompt::GenerationContext;
use super::traits::{ProgressObserver, QuestionValidator};
use super::types::{Decision, GenerationConfig, LogStep, ValidationResult};
use crate::models::lenient::{deserialize_string_list, deserialize_string_or_default, value_as_f64};
use crate::models::GeneratedQuestion;
use crate::pipeline::structuring::{BackendSelection, StructuredCall, StructuredGenerator, StructuredSchema};

pub const MISSING_EVIDENCE_FAULT: &str = "Question has no evidence drawn from the source text";

fn validator_system_prompt(threshold: u8) -> String {
    format!(
        "You are a senior question auditor and assessment specialist. Audit each generated exam question \
strictly against the source text and academic standards.

## SCORING (TOTAL 100)
1. GROUNDEDNESS (30): is the question based entirely on the text? Any invented fact scores 0 here and rejects the question.
2. DISTRACTOR QUALITY (25): are the wrong options plausible, of similar length, and free of \"all/none of the above\"?
3. PEDAGOGICAL DEPTH (20): does the question match its cognitive level rather than rote memory?
4. CLARITY AND TONE (15): is the language formal, academic and unambiguous?
5. EXPLANATION (10): does the explanation show why the answer is right and the others are wrong, citing the text?

## DECISION
- total_score >= {threshold} and full groundedness: \"APPROVED\"
- otherwise: \"REJECTED\"

## OUTPUT (JSON ONLY)
{{
  \"total_score\": 0,
  \"decision\": \"APPROVED\" | \"REJECTED\",
  \"critical_faults\": [\"precise fault 1\"],
  \"improvement_suggestion\": \"Technical instruction for fixing the question when rejected.\"
}}"
    )
}

fn validation_task(question: &GeneratedQuestion) -> String {
    format!(
        "## QUESTION UNDER REVIEW\n\n**Concept:** {}\n**Cognitive level:** {}\n\n{}\n\nAudit this question against the CONTEXT TEXT and reply with JSON only.",
        question.concept_title,
        question.cognitive_level,
        render_for_review(&question.body),
    )
}

/// Wire shape of a reviewer reply.
#[derive(Debug, Deserialize)]
struct VerdictResponse {
    #[serde(
        alias = "score",
        alias = "points",
        alias = "puan",
        deserialize_with = "deserialize_score"
    )]
    total_score: u8,
    #[serde(default, deserialize_with = "deserialize_decision")]
    decision: Option<Decision>,
    #[serde(default, alias = "faults", deserialize_with = "deserialize_string_list")]
    critical_faults: Vec<String>,
    #[serde(default, alias = "suggestion", deserialize_with = "deserialize_string_or_default")]
    improvement_suggestion: String,
}

impl StructuredSchema for VerdictResponse {}

fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    value
        .as_ref()
        .and_then(value_as_f64)
        .filter(|f| f.is_finite())
        .map(|f| f.round().clamp(0.0, 100.0) as u8)
        .ok_or_else(|| serde::de::Error::custom("total_score must be a number"))
}

fn deserialize_decision<'de, D>(deserializer: D) -> Result<Option<Decision>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => decision_from_text(&s),
        Some(Value::Bool(b)) => Some(if b { Decision::Approved } else { Decision::Rejected }),
        _ => None,
    })
}

/// "approve", "ok", "pass", "true" approve; "reject", "fail", "false" reject.
/// A negated approval ("not approved", "disapprove") rejects; a negated
/// rejection is left to the score.
pub fn decision_from_text(text: &str) -> Option<Decision> {
    let lower = text.trim().to_lowercase();
    let negated = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word == "not" || word == "never" || word.ends_with("n't"))
        || lower.contains("disapprov")
        || lower.contains("unapprov");

    let rejects = lower.contains("reject") || lower.contains("fail") || lower == "false";
    let approves = lower.contains("approv") || lower == "ok" || lower.contains("pass") || lower == "true";

    match (rejects, approves, negated) {
        (true, _, true) => None,
        (true, _, false) => Some(Decision::Rejected),
        (false, true, true) => Some(Decision::Rejected),
        (false, true, false) => Some(Decision::Approved),
        (false, false, _) => None,
    }
}

pub struct LlmQuestionValidator {
    generator: StructuredGenerator,
    selection: BackendSelection,
    max_retries: u32,
    threshold: u8,
}

impl LlmQuestionValidator {
    pub fn new(generator: StructuredGenerator, config: &GenerationConfig) -> Self {
        Self {
            generator,
            selection: config.validation.clone(),
            max_retries: config.max_retries,
            threshold: config.approval_threshold,
        }
    }
}

#[async_trait]
impl QuestionValidator for LlmQuestionValidator {
    async fn validate(
        &self,
        question: &GeneratedQuestion,
        context: &GenerationContext,
        observer: &dyn ProgressObserver,
    ) -> Option<ValidationResult> {
        if !question.body.has_evidence() {
            observer.log(
                LogStep::Validating,
                "Rejected without review: evidence is empty",
                json!({ "concept": question.concept_title }),
            );
            return Some(ValidationResult::rejected(MISSING_EVIDENCE_FAULT));
        }

        observer.log(
            LogStep::Validating,
            "Validating question",
            json!({ "concept": question.concept_title }),
        );

        let messages = context.messages(&validator_system_prompt(self.threshold), &validation_task(question));
        let call = StructuredCall::new(&self.selection).with_max_retries(self.max_retries);
        let log = StepLog::new(observer, LogStep::Validating);

        let Some(reply) = self.generator.generate::<VerdictResponse>(&messages, &call, &log).await else {
            observer.log(
                LogStep::Validating,
                "No verdict obtained, question discarded",
                json!({ "concept": question.concept_title }),
            );
            return None;
        };

        let verdict = ValidationResult::from_score(
            reply.total_score,
            self.threshold,
            reply.critical_faults,
            reply.improvement_suggestion,
        );
        if reply.decision.is_some_and(|d| d != verdict.decision) {
            tracing::debug!(
                score = reply.total_score,
                stated = ?reply.decision,
                "Reviewer decision overridden by score"
            );
        }

        observer.log(
            LogStep::Validating,
            "Validation result",
            json!({
                "concept": question.concept_title,
                "score": verdict.total_score,
                "decision": verdict.decision,
                "faults": verdict.critical_faults,
            }),
        );
        Some(verdict)
    }
}
