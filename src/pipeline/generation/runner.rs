//! Run orchestration for one chunk.
//!
//! INIT → MAPPING → QUOTA → phases → COMPLETED. Analysis failure, a lost
//! claim, cancellation and store errors end the run; everything per-item is
//! contained further down.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use super::analyzer::LlmConceptAnalyzer;
use super::drafter::LlmQuestionDrafter;
use super::error::GenerationError;
use super::followup::FollowUpGenerator;
use super::pipeline::GenerationPipeline;
use super::prompt::GenerationContext;
use super::quota::plan_quota;
use super::reviser::LlmQuestionReviser;
use super::scheduler::{ChunkTarget, PhaseScheduler, RunState};
use super::traits::*;
use super::types::{GenerationConfig, LogStep, PipelineRunResult};
use super::validator::LlmQuestionValidator;
use crate::models::enums::ChunkStatus;
use crate::models::{Chunk, ConceptMapItem};
use crate::pipeline::structuring::StructuredGenerator;

/// Everything a run needs. Cheap to clone.
#[derive(Clone)]
pub struct GenerationDeps {
    pub chunks: Arc<dyn ChunkStore>,
    pub questions: Arc<dyn QuestionStore>,
    pub learners: Arc<dyn LearnerHistory>,
    pub guidance: Arc<dyn GuidanceProvider>,
    pub analyzer: Arc<dyn ConceptAnalyzer>,
    pub drafter: Arc<dyn QuestionDrafter>,
    pub validator: Arc<dyn QuestionValidator>,
    pub reviser: Arc<dyn QuestionReviser>,
    pub follow_up: Arc<FollowUpGenerator>,
    pub config: GenerationConfig,
    /// Set to abandon the run at the next batch boundary.
    pub cancel: Arc<AtomicBool>,
}

impl GenerationDeps {
    /// Wire backend-driven tasks over one store that implements every collaborator.
    pub fn with_backends<S>(store: Arc<S>, generator: StructuredGenerator, config: GenerationConfig) -> Self
    where
        S: ChunkStore + QuestionStore + LearnerHistory + GuidanceProvider + 'static,
    {
        Self {
            chunks: store.clone(),
            questions: store.clone(),
            learners: store.clone(),
            guidance: store,
            analyzer: Arc::new(LlmConceptAnalyzer::new(
                generator.clone(),
                config.analysis.clone(),
                config.max_retries,
            )),
            drafter: Arc::new(LlmQuestionDrafter::new(generator.clone(), &config)),
            validator: Arc::new(LlmQuestionValidator::new(generator.clone(), &config)),
            reviser: Arc::new(LlmQuestionReviser::new(generator.clone(), &config)),
            follow_up: Arc::new(FollowUpGenerator::new(generator, &config)),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Generate questions for one chunk until its quota is met.
///
/// Never returns `Err`: failures are reported through `observer.on_error`
/// and an unsuccessful result.
pub async fn generate_questions_for_chunk(
    chunk_id: &str,
    deps: &GenerationDeps,
    observer: &dyn ProgressObserver,
) -> PipelineRunResult {
    tracing::info!(chunk_id = %chunk_id, "Generation run starting");
    observer.log(LogStep::Init, "Loading chunk", json!({ "chunk_id": chunk_id }));

    let chunk = match deps.chunks.load_chunk(chunk_id).await {
        Ok(Some(chunk)) => chunk,
        Ok(None) => return fail(observer, chunk_id, &GenerationError::ChunkNotFound(chunk_id.to_string()), 0),
        Err(e) => return fail(observer, chunk_id, &e, 0),
    };

    match deps
        .chunks
        .claim_chunk(chunk_id, deps.config.claim_stale_after_secs)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return fail(observer, chunk_id, &GenerationError::AlreadyProcessing(chunk_id.to_string()), 0)
        }
        Err(e) => return fail(observer, chunk_id, &e, 0),
    }

    let mut state = RunState::default();
    match run_claimed(&chunk, deps, observer, &mut state).await {
        Ok(result) => {
            observer.on_complete(&result);
            result
        }
        Err(e) => {
            // A lost claim belongs to another run now; its status is not ours to set.
            if !matches!(e, GenerationError::ClaimLost(_)) {
                if let Err(status_err) = deps.chunks.set_status(chunk_id, ChunkStatus::Failed).await {
                    tracing::warn!(chunk_id = %chunk_id, error = %status_err, "Could not mark chunk FAILED");
                }
            }
            fail(observer, chunk_id, &e, state.total_generated)
        }
    }
}

async fn run_claimed(
    chunk: &Chunk,
    deps: &GenerationDeps,
    observer: &dyn ProgressObserver,
    state: &mut RunState,
) -> Result<PipelineRunResult, GenerationError> {
    let concepts = resolve_concepts(chunk, deps, observer).await?;

    let existing = deps.questions.count_by_phase(&chunk.id).await?;
    let quota = plan_quota(concepts.len() as u32, existing);
    observer.log(
        LogStep::Quota,
        "Quota computed",
        json!({ "targets": quota.targets, "existing": quota.existing }),
    );

    if quota.is_sealed() {
        deps.chunks.set_status(&chunk.id, ChunkStatus::Completed).await?;
        observer.log(
            LogStep::Completed,
            "Practice set already complete",
            json!({ "chunk_id": chunk.id }),
        );
        return Ok(PipelineRunResult {
            chunk_id: chunk.id.clone(),
            success: true,
            generated: 0,
            quota: Some(quota),
            aborted_phases: Vec::new(),
            error: None,
        });
    }

    let guideline = match deps.guidance.guideline_for(&chunk.course_id).await {
        Ok(guideline) => guideline,
        Err(e) => {
            tracing::warn!(course_id = %chunk.course_id, error = %e, "Subject guidance unavailable");
            None
        }
    };
    let context = GenerationContext::new(chunk, guideline);
    let target = ChunkTarget {
        chunk_id: chunk.id.clone(),
        course_id: chunk.course_id.clone(),
        section_title: chunk.section_title.clone(),
    };

    let pipeline = GenerationPipeline::new(deps.drafter.clone(), deps.validator.clone(), deps.reviser.clone());
    let scheduler = PhaseScheduler::new(
        pipeline,
        deps.questions.clone(),
        deps.chunks.clone(),
        &deps.config,
        deps.cancel.clone(),
    );
    scheduler
        .run(&concepts, &quota, &target, &context, observer, state)
        .await?;

    deps.chunks.set_status(&chunk.id, ChunkStatus::Completed).await?;
    observer.log(
        LogStep::Completed,
        "Generation complete",
        json!({
            "generated": state.total_generated,
            "aborted_phases": state.aborted_phases,
        }),
    );
    tracing::info!(
        chunk_id = %chunk.id,
        generated = state.total_generated,
        aborted = state.aborted_phases.len(),
        "Generation run complete"
    );

    Ok(PipelineRunResult {
        chunk_id: chunk.id.clone(),
        success: true,
        generated: state.total_generated,
        quota: Some(quota),
        aborted_phases: state.aborted_phases.clone(),
        error: None,
    })
}

/// Stored concept map when present, otherwise a fresh analysis that is persisted.
async fn resolve_concepts(
    chunk: &Chunk,
    deps: &GenerationDeps,
    observer: &dyn ProgressObserver,
) -> Result<Vec<ConceptMapItem>, GenerationError> {
    if let Some(stored) = chunk.metadata.reusable_concepts() {
        observer.log(
            LogStep::Mapping,
            "Reusing stored concept map",
            json!({ "concept_count": stored.len() }),
        );
        return Ok(stored.to_vec());
    }

    let map = deps
        .analyzer
        .analyze(chunk.source_text(), chunk.word_count, observer)
        .await
        .ok_or_else(|| GenerationError::AnalysisFailed(chunk.id.clone()))?;

    let mut metadata = chunk.metadata.clone();
    metadata.concept_map = Some(map.concepts.clone());
    metadata.density_score = Some(map.density_score);
    metadata.concept_map_created_at = Some(Utc::now().to_rfc3339());
    if let Err(e) = deps
        .chunks
        .save_metadata(&chunk.id, &metadata, map.concepts.len() as u32)
        .await
    {
        tracing::warn!(chunk_id = %chunk.id, error = %e, "Concept map not persisted");
        observer.log(LogStep::Error, "Concept map not persisted", json!({ "error": e.to_string() }));
    }

    Ok(map.concepts)
}

fn fail(
    observer: &dyn ProgressObserver,
    chunk_id: &str,
    error: &GenerationError,
    generated: u32,
) -> PipelineRunResult {
    let message = error.to_string();
    tracing::warn!(chunk_id = %chunk_id, error = %message, "Generation run failed");
    observer.log(LogStep::Error, &message, Value::Null);
    observer.on_error(&message);
    PipelineRunResult {
        generated,
        ..PipelineRunResult::failed(chunk_id, message)
    }
}
