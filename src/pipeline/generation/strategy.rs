//! Node strategy: which cognitive level a concept's question targets,
//! and the pedagogical instruction that goes with it.
//!
//! A concept's own level wins. Otherwise the level comes from a fixed
//! 10-slot distribution for the course category, indexed by `position % 10`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::enums::CognitiveLevel;
use crate::models::ConceptMapItem;

use crate::models::enums::CognitiveLevel::{Analysis as An, Application as Ap, Recall as Re};

// ═══════════════════════════════════════════════════════════
// Course categories
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseCategory {
    /// Procedural subjects: questions are mostly worked applications.
    SkillBased,
    /// Rule-heavy subjects tested through cases.
    ScenarioBased,
    TheoryBased,
}

impl fmt::Display for CourseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkillBased => write!(f, "skill_based"),
            Self::ScenarioBased => write!(f, "scenario_based"),
            Self::TheoryBased => write!(f, "theory_based"),
        }
    }
}

const SKILL_KEYWORDS: &[&str] = &["math", "statistic", "language", "logic", "grammar"];
const SCENARIO_KEYWORDS: &[&str] = &["law", "accounting", "finance", "procedure"];

impl CourseCategory {
    /// Detect from the course name. Unknown names are theory-based.
    pub fn from_course_name(course_name: &str) -> Self {
        let lower = course_name.to_lowercase();
        if SKILL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::SkillBased
        } else if SCENARIO_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::ScenarioBased
        } else {
            Self::TheoryBased
        }
    }

    pub fn distribution(self) -> &'static [CognitiveLevel; 10] {
        match self {
            Self::SkillBased => &SKILL_DISTRIBUTION,
            Self::ScenarioBased => &SCENARIO_DISTRIBUTION,
            Self::TheoryBased => &THEORY_DISTRIBUTION,
        }
    }
}

const SKILL_DISTRIBUTION: [CognitiveLevel; 10] = [Re, Ap, Ap, Ap, Ap, Ap, Ap, An, An, An];
const SCENARIO_DISTRIBUTION: [CognitiveLevel; 10] = [Re, Re, Ap, Ap, Ap, Ap, Ap, Ap, An, An];
const THEORY_DISTRIBUTION: [CognitiveLevel; 10] = [Re, Re, Ap, Ap, Ap, Ap, Ap, Ap, An, An];

// ═══════════════════════════════════════════════════════════
// Strategy resolution
// ═══════════════════════════════════════════════════════════

/// Resolved target for one concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStrategy {
    pub level: CognitiveLevel,
    pub instruction: &'static str,
}

pub fn level_instruction(level: CognitiveLevel) -> &'static str {
    match level {
        CognitiveLevel::Recall => {
            "Write an instructive question at the recall and comprehension level, in academic language. \
             Focus on definitions, principles or defining properties."
        }
        CognitiveLevel::Application => {
            "Do not ask for a bare definition. Build a concrete case (a short vignette with named people \
             and events) in which the learner must apply the concept."
        }
        CognitiveLevel::Analysis => {
            "Write a reasoning question that contrasts two ideas from the text or probes an exception to a rule. \
             The learner must follow a cause and effect chain such as \"if X happens, how is Y affected?\"."
        }
    }
}

/// Pure function. `position` is the concept's global index in the run.
pub fn node_strategy(position: usize, concept: &ConceptMapItem, course_name: &str) -> NodeStrategy {
    let level = concept.level.unwrap_or_else(|| {
        CourseCategory::from_course_name(course_name).distribution()[position % 10]
    });
    NodeStrategy {
        level,
        instruction: level_instruction(level),
    }
}
