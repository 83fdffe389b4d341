//! Question drafting: one concept → one candidate question.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::observer::StepLog;
use super::prompt::AUTHOR_SYSTEM_PROMPT;
use super::strategy::{node_strategy, NodeStrategy};
use super::traits::{DraftRequest, ProgressObserver, QuestionDrafter};
use super::types::{GenerationConfig, LogStep};
use crate::models::enums::UsagePhase;
use crate::models::{ConceptMapItem, GeneratedQuestion, QuestionBody};
use crate::pipeline::structuring::{BackendSelection, StructuredCall, StructuredGenerator, StructuredSchema};

/// Corrective turn for every question-shaped reply.
pub const QUESTION_RETRY_PROMPT: &str = "YOUR PREVIOUS ANSWER DID NOT MATCH THE REQUIRED JSON SCHEMA.
Return valid JSON. Schema rules:
1. \"o\" has EXACTLY 5 entries.
2. \"a\" (index of the correct option) is a number between 0 and 4.
3. \"img\" is an image index number, or null when there is no image.
4. \"evidence\" holds the supporting passage and must not be empty.
5. Add no commentary or explanation outside the JSON.";

impl StructuredSchema for QuestionBody {
    fn schema_issues(&self) -> Vec<String> {
        QuestionBody::schema_issues(self)
    }
}

const DISTRACTOR_RULES: &str = "DISTRACTOR RULES:
Wrong options are never random. Each one is built on at least one of:
1. **Concept confusion:** a term that resembles the answer but belongs to another context.
2. **Reasoning slip:** the result of a common mistake in the correct line of reasoning.
3. **Half truth:** a statement that starts correctly and ends wrongly, or the reverse.

LATEX:
Write numbers, formulas, variables and technical symbols in LaTeX in both \"q\" and \"exp\".";

const EXAM_MODE_RULES: &str = "EXAM SIMULATION MODE (raised difficulty):
- Options are very close to each other. No obviously wrong option.
- Include one strong distractor that sits right next to the correct answer.
- The stem also evokes related terms from the wider course that could be confused with this concept.";

const EVIDENCE_RULES: &str = "EVIDENCE REQUIREMENT:
Put the supporting rule or definition from the text in \"evidence\". For a scenario or analysis question add a short note on how that rule applies to the case. \
If the text holds no direct support, do not write the question.";

/// Task prompt for one concept.
pub fn build_draft_task(
    concept: &ConceptMapItem,
    strategy: &NodeStrategy,
    phase: UsagePhase,
    previous_diagnoses: &[String],
) -> String {
    let mut parts = vec![
        "GOAL: write exactly one question about the context text that follows the pedagogical strategy below.".to_string(),
        "---".to_string(),
    ];

    if phase == UsagePhase::ExamSimulation {
        parts.push(EXAM_MODE_RULES.to_string());
    }
    parts.push(DISTRACTOR_RULES.to_string());

    let mut target = format!(
        "TARGET CONCEPT:\n- Concept: {}\n- Cognitive level: {}",
        concept.title, strategy.level
    );
    if !concept.focus.trim().is_empty() {
        target.push_str(&format!("\n- Focus: {}", concept.focus));
    }
    if concept.is_exception {
        target.push_str("\n- This concept is an exception to a general rule. Test the exception itself.");
    }
    parts.push(target);

    if let Some(image) = &concept.image {
        let mut block = format!("IMAGE: build the question around '{image}' or the situation it illustrates.");
        if let Some(alt) = &concept.image_alt {
            block.push_str(&format!("\nImage description: {alt}"));
        }
        parts.push(block);
    }

    parts.push(format!("PEDAGOGICAL STRATEGY:\n{}", strategy.instruction));
    parts.push(EVIDENCE_RULES.to_string());

    if let Some(block) = diagnoses_block(previous_diagnoses) {
        parts.push(block);
    }

    parts.push("Use the CONTEXT TEXT as the source and reply with JSON only.".to_string());
    parts.join("\n\n")
}

pub(crate) fn diagnoses_block(diagnoses: &[String]) -> Option<String> {
    if diagnoses.is_empty() {
        return None;
    }
    let list = diagnoses
        .iter()
        .map(|d| format!("- {d}"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!(
        "LEARNER'S PAST MISTAKES ON THIS TOPIC:\nThe learner has made these mistakes before. Target these weak points:\n{list}"
    ))
}

/// Backend-driven drafter. Switches to the fallback selection in fallback mode.
pub struct LlmQuestionDrafter {
    generator: StructuredGenerator,
    selection: BackendSelection,
    fallback: Option<BackendSelection>,
    max_retries: u32,
}

impl LlmQuestionDrafter {
    pub fn new(generator: StructuredGenerator, config: &GenerationConfig) -> Self {
        Self {
            generator,
            selection: config.drafting.clone(),
            fallback: config.fallback.clone(),
            max_retries: config.max_retries,
        }
    }

    fn selection(&self, fallback_active: bool) -> &BackendSelection {
        match (&self.fallback, fallback_active) {
            (Some(fallback), true) => fallback,
            _ => &self.selection,
        }
    }
}

#[async_trait]
impl QuestionDrafter for LlmQuestionDrafter {
    async fn draft(
        &self,
        request: &DraftRequest<'_>,
        observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion> {
        let concept = request.concept;
        let strategy = node_strategy(request.position, concept, &request.context.course_name);
        let selection = self.selection(request.fallback_active);

        observer.log(
            LogStep::Generating,
            "Drafting question",
            json!({
                "concept": concept.title,
                "level": strategy.level,
                "phase": request.phase,
                "backend": selection.backend,
            }),
        );

        let task = build_draft_task(concept, &strategy, request.phase, request.previous_diagnoses);
        let messages = request.context.messages(AUTHOR_SYSTEM_PROMPT, &task);
        let call = StructuredCall::new(selection)
            .with_max_retries(self.max_retries)
            .with_corrective_prompt(QUESTION_RETRY_PROMPT);
        let log = StepLog::new(observer, LogStep::Generating);

        let Some(body) = self.generator.generate::<QuestionBody>(&messages, &call, &log).await else {
            observer.log(
                LogStep::Generating,
                "Draft failed",
                json!({ "concept": concept.title }),
            );
            return None;
        };

        Some(GeneratedQuestion {
            body,
            cognitive_level: strategy.level,
            concept_title: concept.title.clone(),
        })
    }
}

/// Short human-readable form of a question for review prompts.
pub fn render_for_review(body: &QuestionBody) -> String {
    let options = body
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{}) {option}", option_letter(i)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "**Question:** {}\n\n**Options:**\n{options}\n\n**Correct answer:** {}\n\n**Explanation:** {}\n\n**Evidence:** {}",
        body.question,
        option_letter(usize::from(body.answer_index)),
        body.explanation,
        body.evidence,
    )
}

/// Compact JSON form of a question using the short reply keys.
pub fn question_json(body: &QuestionBody) -> Value {
    json!({
        "q": body.question,
        "o": body.options,
        "a": body.answer_index,
        "exp": body.explanation,
        "evidence": body.evidence,
        "img": body.image_index,
    })
}

pub fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}
