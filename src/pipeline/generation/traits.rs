//! Trait definitions for the question generation pipeline.
//!
//! Task traits (one backend-facing step each):
//! - ConceptAnalyzer: chunk text → concept map
//! - QuestionDrafter: concept → candidate question
//! - QuestionValidator: candidate → verdict
//! - QuestionReviser: rejected candidate + verdict → replacement
//!
//! Collaborator traits (storage and telemetry):
//! - ChunkStore, QuestionStore, LearnerHistory, GuidanceProvider
//! - ProgressObserver: the only channel through which incremental progress surfaces

use async_trait::async_trait;
use serde_json::Value;

use super::error::GenerationError;
use super::prompt::GenerationContext;
use super::types::*;
use crate::models::enums::{ChunkStatus, UsagePhase};
use crate::models::{
    Chunk, ChunkMetadata, ChunkSummary, ConceptMapItem, GeneratedQuestion, NewQuestion,
    StoredQuestion, SubjectGuideline,
};

// ═══════════════════════════════════════════
// Telemetry
// ═══════════════════════════════════════════

/// Receives progress from a run. Implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_log(&self, entry: &GenerationLog);

    /// Fires after every successful save with the run's running total.
    fn on_question_saved(&self, _total_so_far: u32) {}

    fn on_complete(&self, _result: &PipelineRunResult) {}

    fn on_error(&self, _message: &str) {}

    fn log(&self, step: LogStep, message: &str, details: Value) {
        self.on_log(&GenerationLog::new(step, message, details));
    }
}

// ═══════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════

#[async_trait]
pub trait ConceptAnalyzer: Send + Sync {
    /// `None` when no schema-valid concept map could be produced.
    async fn analyze(
        &self,
        content: &str,
        word_count: u32,
        observer: &dyn ProgressObserver,
    ) -> Option<ConceptMap>;
}

/// Everything the drafter needs for one concept.
#[derive(Debug, Clone, Copy)]
pub struct DraftRequest<'a> {
    pub concept: &'a ConceptMapItem,
    /// Global position of the concept in the run's selection order.
    pub position: usize,
    pub phase: UsagePhase,
    pub context: &'a GenerationContext,
    pub fallback_active: bool,
    /// Misconceptions the question should probe. Empty for ordinary runs.
    pub previous_diagnoses: &'a [String],
}

#[async_trait]
pub trait QuestionDrafter: Send + Sync {
    async fn draft(
        &self,
        request: &DraftRequest<'_>,
        observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion>;
}

#[async_trait]
pub trait QuestionValidator: Send + Sync {
    /// `None` when no verdict could be obtained; the question is then discarded.
    async fn validate(
        &self,
        question: &GeneratedQuestion,
        context: &GenerationContext,
        observer: &dyn ProgressObserver,
    ) -> Option<ValidationResult>;
}

#[async_trait]
pub trait QuestionReviser: Send + Sync {
    async fn revise(
        &self,
        question: &GeneratedQuestion,
        verdict: &ValidationResult,
        context: &GenerationContext,
        fallback_active: bool,
        observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion>;
}

/// Receives each approved question as soon as it exists.
#[async_trait]
pub trait QuestionSink: Send {
    /// `true` once the question is durably stored.
    async fn accept(&mut self, question: GeneratedQuestion) -> bool;
}

// ═══════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn load_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>, GenerationError>;

    async fn chunk_summary(&self, chunk_id: &str) -> Result<Option<ChunkSummary>, GenerationError>;

    /// Atomically mark the chunk PROCESSING. `false` when another fresh run holds it.
    async fn claim_chunk(&self, chunk_id: &str, stale_after_secs: u64) -> Result<bool, GenerationError>;

    /// Extend the run's own claim. `false` when the chunk is no longer PROCESSING.
    async fn refresh_claim(&self, chunk_id: &str) -> Result<bool, GenerationError>;

    async fn set_status(&self, chunk_id: &str, status: ChunkStatus) -> Result<(), GenerationError>;

    /// Persist metadata (concept map included) and the chunk's target question count.
    async fn save_metadata(
        &self,
        chunk_id: &str,
        metadata: &ChunkMetadata,
        target_count: u32,
    ) -> Result<(), GenerationError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn count_by_phase(&self, chunk_id: &str) -> Result<PhaseCounts, GenerationError>;

    /// Insert and return the new id. Questions without evidence are refused.
    async fn insert_question(&self, question: &NewQuestion) -> Result<String, GenerationError>;

    async fn get_question(&self, question_id: &str) -> Result<Option<StoredQuestion>, GenerationError>;
}

#[async_trait]
pub trait LearnerHistory: Send + Sync {
    async fn consecutive_fails(&self, user_id: &str, question_id: &str) -> Result<u32, GenerationError>;

    /// Most recent distinct diagnoses, newest first, at most `limit`.
    async fn recent_diagnoses(
        &self,
        user_id: &str,
        chunk_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, GenerationError>;
}

#[async_trait]
pub trait GuidanceProvider: Send + Sync {
    async fn guideline_for(&self, course_id: &str) -> Result<Option<SubjectGuideline>, GenerationError>;
}
