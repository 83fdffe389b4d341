//! Phase scheduling: practice → archive → exam simulation.
//!
//! Practice walks the concept list in order, wrapping around. Archive and
//! exam simulation shuffle the list once per phase entry. Each batch asks
//! for the phase's full remaining need; a batch that stores nothing counts
//! as a failure. Fallback mode switches on at `fallback_after_failures`
//! consecutive failures, and a phase aborts once they exceed
//! `max_consecutive_failures`. The run's chunk claim is refreshed at every
//! batch boundary and after every save so a long run never looks stale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::json;

use super::error::GenerationError;
use super::pipeline::{Batch, GenerationPipeline};
use super::prompt::GenerationContext;
use super::traits::{ChunkStore, ProgressObserver, QuestionSink, QuestionStore};
use super::types::{GenerationConfig, LogStep, Quota};
use crate::models::enums::UsagePhase;
use crate::models::{ConceptMapItem, GeneratedQuestion, NewQuestion};

/// Mutable counters of one run. Only the run's own task touches them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// Consecutive batches that stored nothing. Reset by any successful save.
    pub consecutive_failures: u32,
    pub fallback_active: bool,
    /// Questions stored in the current phase.
    pub phase_generated: u32,
    /// Questions stored by the whole run.
    pub total_generated: u32,
    /// Next concept index for the sequential practice phase.
    pub cursor: usize,
    pub aborted_phases: Vec<UsagePhase>,
}

/// Where approved questions of this run are stored.
#[derive(Debug, Clone)]
pub struct ChunkTarget {
    pub chunk_id: String,
    pub course_id: String,
    pub section_title: String,
}

pub struct PhaseScheduler {
    pipeline: GenerationPipeline,
    store: Arc<dyn QuestionStore>,
    claims: Arc<dyn ChunkStore>,
    fallback_after_failures: u32,
    max_consecutive_failures: u32,
    cancel: Arc<AtomicBool>,
}

impl PhaseScheduler {
    pub fn new(
        pipeline: GenerationPipeline,
        store: Arc<dyn QuestionStore>,
        claims: Arc<dyn ChunkStore>,
        config: &GenerationConfig,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pipeline,
            store,
            claims,
            fallback_after_failures: config.fallback_after_failures,
            max_consecutive_failures: config.max_consecutive_failures,
            cancel,
        }
    }

    /// Run every phase with remaining need. Cancellation and a lost claim are
    /// errors; aborted phases are recorded in `state` and the next phase runs.
    pub async fn run(
        &self,
        concepts: &[ConceptMapItem],
        quota: &Quota,
        target: &ChunkTarget,
        context: &GenerationContext,
        observer: &dyn ProgressObserver,
        state: &mut RunState,
    ) -> Result<(), GenerationError> {
        if concepts.is_empty() {
            return Ok(());
        }

        for phase in UsagePhase::ordered() {
            let remaining = quota.remaining(phase);
            if remaining == 0 {
                observer.log(
                    LogStep::Generating,
                    "Phase already complete",
                    json!({ "phase": phase }),
                );
                continue;
            }
            self.run_phase(phase, remaining, concepts, target, context, observer, state)
                .await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        phase: UsagePhase,
        remaining: u32,
        concepts: &[ConceptMapItem],
        target: &ChunkTarget,
        context: &GenerationContext,
        observer: &dyn ProgressObserver,
        state: &mut RunState,
    ) -> Result<(), GenerationError> {
        state.phase_generated = 0;
        let order = phase_order(phase, concepts);
        let mut offset = 0usize;

        observer.log(
            LogStep::Generating,
            "Phase started",
            json!({ "phase": phase, "remaining": remaining }),
        );

        while state.phase_generated < remaining {
            if self.cancel.load(Ordering::SeqCst) {
                observer.log(LogStep::Error, "Run cancelled", json!({ "phase": phase }));
                return Err(GenerationError::Cancelled);
            }
            if !self.claims.refresh_claim(&target.chunk_id).await? {
                observer.log(LogStep::Error, "Chunk claim lost", json!({ "phase": phase }));
                return Err(GenerationError::ClaimLost(target.chunk_id.clone()));
            }

            let need = (remaining - state.phase_generated) as usize;
            let start = if phase == UsagePhase::Practice { state.cursor } else { offset };
            let batch: Vec<ConceptMapItem> = (0..need)
                .map(|i| order[(start + i) % order.len()].clone())
                .collect();

            let fallback_active = state.fallback_active;
            let stored = {
                let mut sink = PhaseSink {
                    store: self.store.as_ref(),
                    claims: self.claims.as_ref(),
                    target,
                    phase,
                    observer,
                    state: &mut *state,
                };
                self.pipeline
                    .run_batch(
                        Batch {
                            concepts: &batch,
                            start_position: start,
                            phase,
                        },
                        context,
                        fallback_active,
                        observer,
                        &mut sink,
                    )
                    .await
            };

            if phase == UsagePhase::Practice {
                state.cursor = (start + need) % order.len();
            } else {
                offset = (start + need) % order.len();
            }

            if stored > 0 {
                continue;
            }

            state.consecutive_failures += 1;
            observer.log(
                LogStep::Generating,
                "Batch produced no questions",
                json!({ "phase": phase, "consecutive_failures": state.consecutive_failures }),
            );

            if state.consecutive_failures >= self.fallback_after_failures && !state.fallback_active {
                state.fallback_active = true;
                observer.log(
                    LogStep::Generating,
                    "Fallback mode enabled",
                    json!({ "consecutive_failures": state.consecutive_failures }),
                );
            }

            if state.consecutive_failures > self.max_consecutive_failures {
                observer.log(
                    LogStep::Error,
                    "Phase aborted after repeated failures",
                    json!({
                        "phase": phase,
                        "generated": state.phase_generated,
                        "remaining": remaining - state.phase_generated,
                    }),
                );
                state.aborted_phases.push(phase);
                return Ok(());
            }
        }

        observer.log(
            LogStep::Generating,
            "Phase finished",
            json!({ "phase": phase, "generated": state.phase_generated }),
        );
        Ok(())
    }
}

/// Concept order for a phase: original order for practice, shuffled otherwise.
fn phase_order(phase: UsagePhase, concepts: &[ConceptMapItem]) -> Vec<&ConceptMapItem> {
    let mut order: Vec<&ConceptMapItem> = concepts.iter().collect();
    if phase != UsagePhase::Practice {
        order.shuffle(&mut rand::thread_rng());
    }
    order
}

/// Stores approved questions as they arrive and keeps the run counters current.
struct PhaseSink<'a> {
    store: &'a dyn QuestionStore,
    claims: &'a dyn ChunkStore,
    target: &'a ChunkTarget,
    phase: UsagePhase,
    observer: &'a dyn ProgressObserver,
    state: &'a mut RunState,
}

#[async_trait]
impl QuestionSink for PhaseSink<'_> {
    async fn accept(&mut self, question: GeneratedQuestion) -> bool {
        let concept = question.concept_title.clone();
        let record = NewQuestion {
            chunk_id: self.target.chunk_id.clone(),
            course_id: self.target.course_id.clone(),
            section_title: self.target.section_title.clone(),
            usage_phase: self.phase,
            question,
            parent_question_id: None,
            created_by: None,
        };

        match self.store.insert_question(&record).await {
            Ok(id) => {
                self.state.phase_generated += 1;
                self.state.total_generated += 1;
                self.state.consecutive_failures = 0;
                self.observer.log(
                    LogStep::Saving,
                    "Question saved",
                    json!({ "id": id, "phase": self.phase, "concept": concept }),
                );
                self.observer.on_question_saved(self.state.total_generated);
                match self.claims.refresh_claim(&self.target.chunk_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(chunk_id = %self.target.chunk_id, "Chunk claim lost mid-batch")
                    }
                    Err(e) => {
                        tracing::warn!(chunk_id = %self.target.chunk_id, error = %e, "Could not refresh chunk claim")
                    }
                }
                true
            }
            Err(e) => {
                tracing::warn!(chunk_id = %self.target.chunk_id, error = %e, "Failed to store approved question");
                self.observer.log(
                    LogStep::Error,
                    "Failed to store approved question",
                    json!({ "phase": self.phase, "concept": concept, "error": e.to_string() }),
                );
                false
            }
        }
    }
}
