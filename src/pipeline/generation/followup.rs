//! Remedial questions for wrong answers.
//!
//! A follow-up is anchored to one evidence passage, steps the cognitive level
//! down when the learner keeps failing the same item, and names the learner's
//! recent misconceptions. Single shot: no validation or revision.

use serde_json::json;

use super::drafter::{diagnoses_block, option_letter, QUESTION_RETRY_PROMPT};
use super::error::GenerationError;
use super::observer::StepLog;
use super::prompt::{GenerationContext, AUTHOR_SYSTEM_PROMPT};
use super::runner::GenerationDeps;
use super::strategy::level_instruction;
use super::traits::ProgressObserver;
use super::types::{GenerationConfig, LogStep, WrongAnswerContext};
use crate::models::enums::{CognitiveLevel, UsagePhase};
use crate::models::{GeneratedQuestion, NewQuestion, QuestionBody};
use crate::pipeline::structuring::{BackendSelection, StructuredCall, StructuredGenerator};

/// Consecutive fails on one question at which the level steps down.
pub const SCAFFOLD_AFTER_FAILS: u32 = 2;
/// Distinct past diagnoses injected into the prompt.
pub const MAX_PREVIOUS_DIAGNOSES: usize = 3;

/// Target level for a follow-up and the scaffolding note, if any.
pub fn scaffold(original: Option<CognitiveLevel>, consecutive_fails: u32) -> (CognitiveLevel, Option<String>) {
    let level = original.unwrap_or(CognitiveLevel::Application);
    if consecutive_fails < SCAFFOLD_AFTER_FAILS {
        return (level, None);
    }
    let lowered = level.step_down();
    let note = format!(
        "SCAFFOLDING ACTIVE: the learner keeps struggling here (fail #{consecutive_fails}). \
         Lower the question ONE cognitive level, to {lowered}."
    );
    (lowered, Some(note))
}

fn option_label(body: &QuestionBody, index: usize) -> String {
    let text = body.options.get(index).map(String::as_str).unwrap_or("");
    format!("{} (\"{text}\")", option_letter(index))
}

pub fn follow_up_task(
    evidence: &str,
    wrong: &WrongAnswerContext,
    level: CognitiveLevel,
    scaffolding_note: Option<&str>,
    previous_diagnoses: &[String],
) -> String {
    let original = json!({
        "q": wrong.original.question,
        "o": wrong.original.options,
        "a": wrong.original.answer_index,
        "exp": wrong.original.explanation,
        "img": wrong.original.image_index,
    });
    let original = serde_json::to_string_pretty(&original).unwrap_or_default();

    let mut difficulty = format!("DIFFICULTY: target level {level}. {}", level_instruction(level));
    if let Some(note) = scaffolding_note {
        difficulty.push('\n');
        difficulty.push_str(note);
    }

    let mut parts = vec![
        "## SPECIAL INSTRUCTIONS
Use the wider context text only to sharpen the distractors.
The correct answer MUST rest solely on the SINGLE SOURCE sentence below."
            .to_string(),
        format!(
            "## FOLLOW-UP QUESTION
The learner answered the previous question WRONG. Write a new question.
**SINGLE SOURCE (for the correct answer):** \"{evidence}\"
1. The correct answer must be 100% faithful to the SINGLE SOURCE.
2. Build distractors from other concepts in the wider context text.
3. The answer must not be reachable from anywhere else in the text."
        ),
        difficulty,
        format!("## WRONGLY ANSWERED QUESTION\n{original}"),
        format!("Learner's answer: {}", option_label(&wrong.original, wrong.chosen_index)),
        format!("Correct answer: {}", option_label(&wrong.original, wrong.correct_index)),
    ];

    if let Some(block) = diagnoses_block(previous_diagnoses) {
        parts.push(format!("## LEARNER'S PAST MISTAKES\n{block}"));
    }

    parts.push(
        "EXTRA RULES:
1. Distractors confuse related concepts from the text but are wrong for this question.
2. Write numeric data in LaTeX ($P=10$ etc.).
3. Copy the SINGLE SOURCE sentence verbatim into \"evidence\".
4. \"diagnosis\": a short professional diagnosis of why the learner erred.
5. \"insight\": a 1-2 sentence mentor note that shows the right line of thought without giving the answer away.

Return JSON only:
{\"q\": \"...\", \"o\": [\"...\", \"...\", \"...\", \"...\", \"...\"], \"a\": 0, \"exp\": \"...\", \"evidence\": \"...\", \"img\": null, \"diagnosis\": \"...\", \"insight\": \"...\"}"
            .to_string(),
    );

    parts.join("\n\n")
}

/// Inputs for one follow-up, with evidence and history already resolved.
#[derive(Debug, Clone, Copy)]
pub struct FollowUpRequest<'a> {
    pub wrong: &'a WrongAnswerContext,
    pub evidence: &'a str,
    pub concept_title: &'a str,
    pub context: &'a GenerationContext,
    pub consecutive_fails: u32,
    pub previous_diagnoses: &'a [String],
}

pub struct FollowUpGenerator {
    generator: StructuredGenerator,
    selection: BackendSelection,
    max_retries: u32,
}

impl FollowUpGenerator {
    pub fn new(generator: StructuredGenerator, config: &GenerationConfig) -> Self {
        Self {
            generator,
            selection: config.follow_up.clone(),
            max_retries: config.max_retries,
        }
    }

    pub async fn generate(
        &self,
        request: &FollowUpRequest<'_>,
        observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion> {
        let (level, note) = scaffold(request.wrong.cognitive_level, request.consecutive_fails);
        observer.log(
            LogStep::Generating,
            "Generating follow-up question",
            json!({
                "question_id": request.wrong.question_id,
                "level": level,
                "scaffolded": note.is_some(),
                "diagnoses": request.previous_diagnoses.len(),
            }),
        );

        let task = follow_up_task(
            request.evidence,
            request.wrong,
            level,
            note.as_deref(),
            request.previous_diagnoses,
        );
        let messages = request.context.messages(AUTHOR_SYSTEM_PROMPT, &task);
        let call = StructuredCall::new(&self.selection)
            .with_max_retries(self.max_retries)
            .with_corrective_prompt(QUESTION_RETRY_PROMPT);
        let log = StepLog::new(observer, LogStep::Generating);

        let mut body = self.generator.generate::<QuestionBody>(&messages, &call, &log).await?;
        body.image_index = request.wrong.original.image_index;
        Some(GeneratedQuestion {
            body,
            cognitive_level: level,
            concept_title: request.concept_title.to_string(),
        })
    }
}

/// Generate and store one follow-up for a wrong answer.
///
/// Returns the new question's id, or `None` when the backend produced nothing usable.
pub async fn generate_follow_up(
    wrong: &WrongAnswerContext,
    deps: &GenerationDeps,
    observer: &dyn ProgressObserver,
) -> Result<Option<String>, GenerationError> {
    let summary = deps
        .chunks
        .chunk_summary(&wrong.chunk_id)
        .await?
        .ok_or_else(|| GenerationError::ChunkNotFound(wrong.chunk_id.clone()))?;

    let given_evidence = wrong
        .evidence
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .or_else(|| Some(wrong.original.evidence.as_str()).filter(|e| !e.trim().is_empty()));
    let stored = if given_evidence.is_none() || wrong.concept_title.is_none() {
        deps.questions.get_question(&wrong.question_id).await?
    } else {
        None
    };

    let evidence = given_evidence
        .map(str::to_string)
        .or_else(|| stored.as_ref().map(|q| q.body.evidence.clone()))
        .filter(|e| !e.trim().is_empty())
        .ok_or(GenerationError::MissingEvidence)?;
    let concept_title = wrong
        .concept_title
        .clone()
        .or_else(|| stored.as_ref().and_then(|q| q.concept_title.clone()))
        .unwrap_or_default();

    let guideline = match deps.guidance.guideline_for(&summary.course_id).await {
        Ok(guideline) => guideline,
        Err(e) => {
            tracing::warn!(course_id = %summary.course_id, error = %e, "Subject guidance unavailable");
            None
        }
    };
    let consecutive_fails = match deps.learners.consecutive_fails(&wrong.user_id, &wrong.question_id).await {
        Ok(fails) => fails,
        Err(e) => {
            tracing::warn!(question_id = %wrong.question_id, error = %e, "Failure streak unavailable");
            0
        }
    };
    let previous_diagnoses = match deps
        .learners
        .recent_diagnoses(&wrong.user_id, &wrong.chunk_id, MAX_PREVIOUS_DIAGNOSES)
        .await
    {
        Ok(diagnoses) => diagnoses,
        Err(e) => {
            tracing::warn!(chunk_id = %wrong.chunk_id, error = %e, "Diagnosis history unavailable");
            Vec::new()
        }
    };

    // Only the evidence passage travels as context text.
    let context = GenerationContext::from_summary(&summary, &evidence, guideline);
    let request = FollowUpRequest {
        wrong,
        evidence: &evidence,
        concept_title: &concept_title,
        context: &context,
        consecutive_fails,
        previous_diagnoses: &previous_diagnoses,
    };

    let Some(question) = deps.follow_up.generate(&request, observer).await else {
        observer.log(
            LogStep::Error,
            "Follow-up generation failed",
            json!({ "question_id": wrong.question_id }),
        );
        return Ok(None);
    };

    let record = NewQuestion {
        chunk_id: wrong.chunk_id.clone(),
        course_id: summary.course_id.clone(),
        section_title: summary.section_title.clone(),
        usage_phase: UsagePhase::Practice,
        question,
        parent_question_id: Some(wrong.question_id.clone()),
        created_by: Some(wrong.user_id.clone()),
    };
    let id = deps.questions.insert_question(&record).await?;

    observer.log(
        LogStep::Saving,
        "Follow-up question saved",
        json!({ "id": id, "parent_question_id": wrong.question_id }),
    );
    tracing::info!(question_id = %id, parent = %wrong.question_id, "Follow-up question stored");
    Ok(Some(id))
}
