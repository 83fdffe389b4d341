//! Per-concept state machine and batch driver.
//!
//! `DRAFTED → VALIDATING → APPROVED`, or `REJECTED → REVISING → VALIDATING`
//! at most [`MAX_REVISION_ATTEMPTS`] times. A concept that never reaches
//! APPROVED is discarded; the batch moves on.

use std::sync::Arc;

use serde_json::json;

use super::prompt::GenerationContext;
use super::traits::{
    DraftRequest, ProgressObserver, QuestionDrafter, QuestionReviser, QuestionSink, QuestionValidator,
};
use super::types::LogStep;
use crate::models::enums::UsagePhase;
use crate::models::{ConceptMapItem, GeneratedQuestion};

pub const MAX_REVISION_ATTEMPTS: u32 = 2;

/// One batch of concepts for a phase.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub concepts: &'a [ConceptMapItem],
    /// Global position of the first concept; positions drive the node strategy.
    pub start_position: usize,
    pub phase: UsagePhase,
}

#[derive(Clone)]
pub struct GenerationPipeline {
    drafter: Arc<dyn QuestionDrafter>,
    validator: Arc<dyn QuestionValidator>,
    reviser: Arc<dyn QuestionReviser>,
}

impl GenerationPipeline {
    pub fn new(
        drafter: Arc<dyn QuestionDrafter>,
        validator: Arc<dyn QuestionValidator>,
        reviser: Arc<dyn QuestionReviser>,
    ) -> Self {
        Self {
            drafter,
            validator,
            reviser,
        }
    }

    /// Draft, validate and revise one concept. `None` means discarded.
    pub async fn process_concept(
        &self,
        request: &DraftRequest<'_>,
        observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion> {
        let title = &request.concept.title;
        let mut candidate = self.drafter.draft(request, observer).await?;
        let mut revisions = 0;

        loop {
            let Some(verdict) = self.validator.validate(&candidate, request.context, observer).await else {
                return None;
            };
            if verdict.is_approved() {
                observer.log(
                    LogStep::Validating,
                    "Question approved",
                    json!({ "concept": title, "score": verdict.total_score, "revisions": revisions }),
                );
                return Some(candidate);
            }
            if revisions >= MAX_REVISION_ATTEMPTS {
                observer.log(
                    LogStep::Validating,
                    "Question discarded after revision limit",
                    json!({ "concept": title, "score": verdict.total_score, "revisions": revisions }),
                );
                return None;
            }

            revisions += 1;
            candidate = self
                .reviser
                .revise(&candidate, &verdict, request.context, request.fallback_active, observer)
                .await?;
        }
    }

    /// Process a batch in order, handing each approved question to `sink`
    /// immediately. Returns how many the sink stored.
    pub async fn run_batch(
        &self,
        batch: Batch<'_>,
        context: &GenerationContext,
        fallback_active: bool,
        observer: &dyn ProgressObserver,
        sink: &mut dyn QuestionSink,
    ) -> u32 {
        let mut stored = 0;
        for (offset, concept) in batch.concepts.iter().enumerate() {
            let request = DraftRequest {
                concept,
                position: batch.start_position + offset,
                phase: batch.phase,
                context,
                fallback_active,
                previous_diagnoses: &[],
            };
            if let Some(question) = self.process_concept(&request, observer).await {
                if sink.accept(question).await {
                    stored += 1;
                }
            }
        }
        stored
    }
}
