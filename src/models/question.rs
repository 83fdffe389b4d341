use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CognitiveLevel, UsagePhase};
use super::lenient::*;

/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 5;
pub const MIN_STEM_CHARS: usize = 10;
pub const MIN_EXPLANATION_CHARS: usize = 10;
pub const MAX_NOTE_CHARS: usize = 500;

/// Question content as produced by a backend and stored in `question_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBody {
    #[serde(alias = "q", alias = "stem", deserialize_with = "deserialize_string_or_default")]
    pub question: String,
    #[serde(alias = "o", alias = "choices", deserialize_with = "deserialize_string_list")]
    pub options: Vec<String>,
    #[serde(
        alias = "a",
        alias = "answer",
        alias = "correct_index",
        deserialize_with = "deserialize_flexible_u8"
    )]
    pub answer_index: u8,
    #[serde(alias = "exp", default, deserialize_with = "deserialize_string_or_default")]
    pub explanation: String,
    #[serde(default, deserialize_with = "deserialize_string_or_default")]
    pub evidence: String,
    /// Index of a source image the question refers to.
    #[serde(
        alias = "img",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_u32_flexible"
    )]
    pub image_index: Option<u32>,
    /// Misconception a wrong answer reveals.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_nonempty_string"
    )]
    pub diagnosis: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_nonempty_string"
    )]
    pub insight: Option<String>,
}

impl QuestionBody {
    /// Structural problems with this question. Empty means valid.
    pub fn schema_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.question.trim().chars().count() < MIN_STEM_CHARS {
            issues.push(format!("question must be at least {MIN_STEM_CHARS} characters"));
        }
        if self.options.len() != OPTION_COUNT {
            issues.push(format!(
                "options must contain exactly {OPTION_COUNT} entries (got {})",
                self.options.len()
            ));
        }
        if usize::from(self.answer_index) >= OPTION_COUNT {
            issues.push(format!(
                "answer_index must be between 0 and {} (got {})",
                OPTION_COUNT - 1,
                self.answer_index
            ));
        }
        if self.explanation.trim().chars().count() < MIN_EXPLANATION_CHARS {
            issues.push(format!(
                "explanation must be at least {MIN_EXPLANATION_CHARS} characters"
            ));
        }
        if !self.has_evidence() {
            issues.push("evidence must quote or paraphrase the source text".to_string());
        }
        for (name, note) in [("diagnosis", &self.diagnosis), ("insight", &self.insight)] {
            if note.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_CHARS) {
                issues.push(format!("{name} must be at most {MAX_NOTE_CHARS} characters"));
            }
        }

        issues
    }

    pub fn has_evidence(&self) -> bool {
        !self.evidence.trim().is_empty()
    }

    pub fn correct_option(&self) -> Option<&str> {
        self.options
            .get(usize::from(self.answer_index))
            .map(String::as_str)
    }
}

/// A drafted question bound to its concept and cognitive level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub body: QuestionBody,
    pub cognitive_level: CognitiveLevel,
    pub concept_title: String,
}

/// Insert payload for the `questions` table.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub chunk_id: String,
    pub course_id: String,
    pub section_title: String,
    pub usage_phase: UsagePhase,
    pub question: GeneratedQuestion,
    pub parent_question_id: Option<String>,
    pub created_by: Option<String>,
}

impl NewQuestion {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// A persisted question row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredQuestion {
    pub id: String,
    pub chunk_id: String,
    pub course_id: String,
    pub section_title: String,
    pub usage_phase: UsagePhase,
    pub cognitive_level: CognitiveLevel,
    pub body: QuestionBody,
    pub concept_title: Option<String>,
    pub parent_question_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
}
