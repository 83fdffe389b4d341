//! Core types for the question generation pipeline.
//!
//! Lifecycle of one run:
//! Chunk → Concept map → Quota → Phases → Batches → Draft/Validate/Revise → Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::enums::{CognitiveLevel, UsagePhase};
use crate::models::{ConceptMapItem, QuestionBody};
use crate::pipeline::structuring::BackendSelection;

// ═══════════════════════════════════════════
// Concept map (output of the analyzer)
// ═══════════════════════════════════════════

/// Default density when the backend omits or mangles it.
pub const DEFAULT_DENSITY_SCORE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMap {
    pub concepts: Vec<ConceptMapItem>,
    /// Information density of the chunk, 1 (sparse) to 5 (dense).
    pub density_score: u8,
}

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// Verdict on one candidate question. Ephemeral: drives the revision loop only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 0–100.
    pub total_score: u8,
    pub decision: Decision,
    pub critical_faults: Vec<String>,
    pub improvement_suggestion: String,
}

impl ValidationResult {
    /// Build a result whose decision agrees with its score.
    /// Approved results never carry faults or suggestions.
    pub fn from_score(
        total_score: u8,
        threshold: u8,
        critical_faults: Vec<String>,
        improvement_suggestion: String,
    ) -> Self {
        let total_score = total_score.min(100);
        if total_score >= threshold {
            Self::approved(total_score)
        } else {
            Self {
                total_score,
                decision: Decision::Rejected,
                critical_faults,
                improvement_suggestion,
            }
        }
    }

    pub fn approved(total_score: u8) -> Self {
        Self {
            total_score: total_score.min(100),
            decision: Decision::Approved,
            critical_faults: Vec::new(),
            improvement_suggestion: String::new(),
        }
    }

    pub fn rejected(fault: &str) -> Self {
        Self {
            total_score: 0,
            decision: Decision::Rejected,
            critical_faults: vec![fault.to_string()],
            improvement_suggestion: String::new(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}

// ═══════════════════════════════════════════
// Progress log stream
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStep {
    Init,
    Quota,
    Mapping,
    Generating,
    Validating,
    Saving,
    Completed,
    Error,
}

impl LogStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Quota => "QUOTA",
            Self::Mapping => "MAPPING",
            Self::Generating => "GENERATING",
            Self::Validating => "VALIDATING",
            Self::Saving => "SAVING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry entry. Write-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLog {
    pub step: LogStep,
    pub message: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl GenerationLog {
    pub fn new(step: LogStep, message: impl Into<String>, details: Value) -> Self {
        Self {
            step,
            message: message.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════
// Quota
// ═══════════════════════════════════════════

/// A count per usage phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub practice: u32,
    pub archive: u32,
    pub exam_simulation: u32,
}

impl PhaseCounts {
    pub fn get(&self, phase: UsagePhase) -> u32 {
        match phase {
            UsagePhase::Practice => self.practice,
            UsagePhase::Archive => self.archive,
            UsagePhase::ExamSimulation => self.exam_simulation,
        }
    }

    pub fn set(&mut self, phase: UsagePhase, count: u32) {
        match phase {
            UsagePhase::Practice => self.practice = count,
            UsagePhase::Archive => self.archive = count,
            UsagePhase::ExamSimulation => self.exam_simulation = count,
        }
    }

    pub fn total(&self) -> u32 {
        self.practice + self.archive + self.exam_simulation
    }
}

/// Targets and existing inventory for one chunk. Recomputed every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Number of concepts the targets were derived from.
    pub concept_count: u32,
    pub targets: PhaseCounts,
    pub existing: PhaseCounts,
}

impl Quota {
    /// `max(0, target − existing)`.
    pub fn remaining(&self, phase: UsagePhase) -> u32 {
        self.targets.get(phase).saturating_sub(self.existing.get(phase))
    }

    /// Practice is the sealing phase: once it is full the chunk is complete.
    pub fn is_sealed(&self) -> bool {
        self.remaining(UsagePhase::Practice) == 0
    }
}

// ═══════════════════════════════════════════
// Run result
// ═══════════════════════════════════════════

/// Terminal summary of one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub chunk_id: String,
    pub success: bool,
    /// Questions persisted by this run.
    pub generated: u32,
    pub quota: Option<Quota>,
    /// Phases that stopped early on the consecutive-failure ceiling.
    pub aborted_phases: Vec<UsagePhase>,
    pub error: Option<String>,
}

impl PipelineRunResult {
    pub fn failed(chunk_id: &str, error: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════

/// Pipeline knobs. Defaults match production behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub analysis: BackendSelection,
    pub drafting: BackendSelection,
    pub validation: BackendSelection,
    pub revision: BackendSelection,
    pub follow_up: BackendSelection,
    /// Used by drafting and revision once fallback mode is active.
    pub fallback: Option<BackendSelection>,
    /// Corrective retries per structured call.
    pub max_retries: u32,
    /// Score at or above which a question is approved.
    pub approval_threshold: u8,
    /// Consecutive failed batches that switch on fallback mode.
    pub fallback_after_failures: u32,
    /// A phase aborts once consecutive failed batches exceed this.
    pub max_consecutive_failures: u32,
    /// A PROCESSING claim older than this may be taken over by a new run.
    pub claim_stale_after_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let local = BackendSelection::default();
        Self {
            analysis: local.clone(),
            drafting: local.clone(),
            validation: local.clone().with_temperature(0.0),
            revision: local.clone(),
            follow_up: local.with_temperature(0.3),
            fallback: None,
            max_retries: 2,
            approval_threshold: 70,
            fallback_after_failures: 3,
            max_consecutive_failures: 5,
            claim_stale_after_secs: 15 * 60,
        }
    }
}

impl GenerationConfig {
    /// Route every task through one backend tag.
    pub fn single_backend(tag: &str) -> Self {
        let mut config = Self::default();
        for selection in [
            &mut config.analysis,
            &mut config.drafting,
            &mut config.validation,
            &mut config.revision,
            &mut config.follow_up,
        ] {
            selection.backend = tag.to_string();
        }
        config
    }
}

// ═══════════════════════════════════════════
// Follow-up input
// ═══════════════════════════════════════════

/// A learner's wrong answer that a remedial question should address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrongAnswerContext {
    pub user_id: String,
    pub question_id: String,
    pub chunk_id: String,
    pub original: QuestionBody,
    pub cognitive_level: Option<CognitiveLevel>,
    pub concept_title: Option<String>,
    pub chosen_index: usize,
    pub correct_index: usize,
    /// Source passage backing the original question. Falls back to the stored question's evidence.
    pub evidence: Option<String>,
}
