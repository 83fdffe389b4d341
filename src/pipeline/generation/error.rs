//! Run-level error types for question generation.
//!
//! Per-item failures (one concept, one batch) never surface here; they are
//! logged and contained. These variants end a run or a follow-up request.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::structuring::StructuringError;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Backend error: {0}")]
    Backend(#[from] StructuringError),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Chunk {0} is already being processed by another run")]
    AlreadyProcessing(String),

    #[error("Chunk {0} is no longer claimed by this run")]
    ClaimLost(String),

    #[error("Concept analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Question has no evidence and cannot be stored")]
    MissingEvidence,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Store task failed: {0}")]
    StoreTask(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
