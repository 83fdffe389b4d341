//! Prompt assembly for every generation task.
//!
//! Each conversation is exactly three messages:
//! 1. system: role and ground rules (fixed per task)
//! 2. user: shared context (course, section, guidance, rules, source text)
//! 3. user: the task itself, prefixed with [`TASK_HEADER`]
//!
//! The first two are identical for every call in a batch, so backends that
//! support prefix caching only pay for the task message.

use crate::models::{Chunk, ChunkSummary, SubjectGuideline};
use crate::pipeline::structuring::sanitize::replace_image_references;
use crate::pipeline::structuring::ChatMessage;

pub const TASK_HEADER: &str = "--- TASK ---\n";

pub const AUTHOR_SYSTEM_PROMPT: &str = "You are a senior exam author and assessment specialist. \
You write rigorous multiple-choice questions that are answerable from the provided source text alone. \
You never invent facts that the text does not support, and you always reply with JSON only.";

pub const QUALITY_RULES: &str = "## GENERAL QUALITY RULES
1. **Academic tone:** the stem and the options use formal, exam-style language.
2. **Scope:** stay within the context text. You may test its content through a new example or situation.
3. **Distractors:** at least two wrong options relate to other ideas in the text but contradict the tested point. \"All of the above\" and \"None of the above\" are forbidden.
4. **Options:** always exactly 5 options (A to E).
5. **Balance:** all options have similar length and structure.
6. **JSON safety:** double every backslash of a LaTeX command inside JSON strings (for example \\\\alpha, \\\\frac{1}{2}). A single backslash breaks parsing.
7. **Images:** when the question relies on an image of the text, mention it in the stem with an [IMAGE: N] tag.";

pub const OUTPUT_FORMAT: &str = "## OUTPUT FORMAT
Reply with JSON matching the schema below and nothing else. No markdown, no commentary.
{
  \"q\": \"Question stem (may include [IMAGE: N]; double LaTeX backslashes)\",
  \"o\": [\"A\", \"B\", \"C\", \"D\", \"E\"],
  \"a\": 0,
  \"exp\": \"Explanation of why the answer is right and the others are wrong\",
  \"evidence\": \"Quotation or close paraphrase of the text that proves the answer\",
  \"img\": null
}
\"a\" is the 0-based index of the correct option. \"img\" is the index of the referenced image (0, 1, 2...) or null when the question does not rely on one.";

const CONTEXT_TEXT_HEADER: &str = "## CONTEXT TEXT";

/// Normalise line endings so identical prompts stay byte-identical.
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Build the three-message conversation.
pub fn assemble(system: &str, context: &str, task: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(normalize_line_endings(system)),
        ChatMessage::user(normalize_line_endings(context)),
        ChatMessage::user(format!("{TASK_HEADER}{}", normalize_line_endings(task))),
    ]
}

/// Shared context for question tasks. Image references in `content` are
/// replaced by a placeholder.
pub fn build_context(
    content: &str,
    course_name: Option<&str>,
    section_title: Option<&str>,
    guideline: Option<&SubjectGuideline>,
) -> String {
    let mut parts = Vec::new();

    if let Some(course) = course_name.filter(|c| !c.trim().is_empty()) {
        parts.push(format!("## COURSE: {course}"));
    }
    if let Some(section) = section_title.filter(|s| !s.trim().is_empty()) {
        parts.push(format!("## SECTION: {section}"));
    }

    if let Some(guideline) = guideline.filter(|g| !g.is_empty()) {
        parts.push("## SUBJECT GUIDANCE".to_string());
        if let Some(instruction) = &guideline.instruction {
            parts.push(format!("### TECHNICAL RULES\n{instruction}"));
        }
        if let Some(good) = &guideline.good_example {
            parts.push(format!("### GOOD EXAMPLE (follow this)\n{good}"));
        }
        if let Some(bad) = &guideline.bad_example {
            parts.push(format!("### BAD EXAMPLE (avoid this)\n{bad}"));
        }
    }

    parts.push(QUALITY_RULES.to_string());
    parts.push(OUTPUT_FORMAT.to_string());
    parts.push(source_block(content));

    parts.join("\n\n")
}

/// Context holding the source text only. Used where question rules would mislead.
pub fn build_source_context(content: &str) -> String {
    source_block(content)
}

fn source_block(content: &str) -> String {
    format!("{CONTEXT_TEXT_HEADER}\n{}", replace_image_references(content.trim()))
}

/// Per-chunk prompt state shared by every task in a run.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub course_id: String,
    pub course_name: String,
    pub section_title: String,
    pub guideline: Option<SubjectGuideline>,
    shared_prompt: String,
}

impl GenerationContext {
    pub fn new(chunk: &Chunk, guideline: Option<SubjectGuideline>) -> Self {
        Self::from_summary(&chunk.summary(), chunk.source_text(), guideline)
    }

    /// Build from chunk identity plus an arbitrary text (for example a single evidence passage).
    pub fn from_summary(
        summary: &ChunkSummary,
        content: &str,
        guideline: Option<SubjectGuideline>,
    ) -> Self {
        let shared_prompt = build_context(
            content,
            Some(&summary.course_name),
            Some(&summary.section_title),
            guideline.as_ref(),
        );
        Self {
            course_id: summary.course_id.clone(),
            course_name: summary.course_name.clone(),
            section_title: summary.section_title.clone(),
            guideline,
            shared_prompt,
        }
    }

    pub fn shared_prompt(&self) -> &str {
        &self.shared_prompt
    }

    pub fn messages(&self, system: &str, task: &str) -> Vec<ChatMessage> {
        assemble(system, &self.shared_prompt, task)
    }
}
