//! Fakes and fixtures shared by the generation tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::error::GenerationError;
use super::followup::FollowUpGenerator;
use super::prompt::GenerationContext;
use super::runner::GenerationDeps;
use super::traits::*;
use super::types::*;
use crate::models::enums::{ChunkStatus, CognitiveLevel, UsagePhase};
use crate::models::{
    Chunk, ChunkMetadata, ChunkSummary, GeneratedQuestion, NewQuestion, QuestionBody, StoredQuestion,
    SubjectGuideline,
};
use crate::pipeline::structuring::{BackendRegistry, ScriptedBackend, StructuredGenerator};

pub fn scripted_generator(backend: Arc<ScriptedBackend>) -> StructuredGenerator {
    let mut registry = BackendRegistry::new();
    registry.register(backend);
    StructuredGenerator::new(registry)
}

// ═══════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════

pub const SAMPLE_CONTENT: &str = "The president may veto a bill within fifteen days. \
Parliament may override a veto by an absolute majority of its members. \
The constitutional court reviews whether laws conform to the constitution.";

pub fn sample_chunk(id: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        course_id: "course-1".into(),
        course_name: "Constitutional Law".into(),
        section_title: "Checks and balances".into(),
        content: SAMPLE_CONTENT.into(),
        display_content: None,
        word_count: 34,
        status: None,
        target_count: None,
        metadata: ChunkMetadata::default(),
        updated_at: chrono::Utc::now().naive_utc(),
    }
}

pub fn sample_context() -> GenerationContext {
    GenerationContext::from_summary(&sample_chunk("chunk-1").summary(), SAMPLE_CONTENT, None)
}

fn body_for(stem: &str) -> QuestionBody {
    QuestionBody {
        question: stem.to_string(),
        options: ["first option", "second option", "third option", "fourth option", "fifth option"]
            .map(String::from)
            .to_vec(),
        answer_index: 1,
        explanation: "The passage states this directly.".into(),
        evidence: "Parliament may override a veto by an absolute majority of its members.".into(),
        image_index: None,
        diagnosis: None,
        insight: None,
    }
}

pub fn sample_question(concept: &str) -> GeneratedQuestion {
    GeneratedQuestion {
        body: body_for(&format!("What does the text say about {concept}?")),
        cognitive_level: CognitiveLevel::Application,
        concept_title: concept.to_string(),
    }
}

/// A schema-valid backend reply for a question with the given stem.
pub fn question_reply(stem: &str) -> String {
    let body = body_for(stem);
    serde_json::json!({
        "q": body.question,
        "o": body.options,
        "a": body.answer_index,
        "exp": body.explanation,
        "evidence": body.evidence,
        "img": null,
    })
    .to_string()
}

// ═══════════════════════════════════════════
// Observer
// ═══════════════════════════════════════════

#[derive(Default)]
pub struct RecordingObserver {
    entries: Mutex<Vec<GenerationLog>>,
    saved: Mutex<Vec<u32>>,
    errors: Mutex<Vec<String>>,
    completed: Mutex<Vec<PipelineRunResult>>,
}

impl RecordingObserver {
    pub fn entries(&self) -> Vec<GenerationLog> {
        self.entries.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<LogStep> {
        self.entries().iter().map(|e| e.step).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn saved_totals(&self) -> Vec<u32> {
        self.saved.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<PipelineRunResult> {
        self.completed.lock().unwrap().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_log(&self, entry: &GenerationLog) {
        self.entries.lock().unwrap().push(entry.clone());
    }

    fn on_question_saved(&self, total_so_far: u32) {
        self.saved.lock().unwrap().push(total_so_far);
    }

    fn on_complete(&self, result: &PipelineRunResult) {
        self.completed.lock().unwrap().push(result.clone());
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// ═══════════════════════════════════════════
// Task fakes
// ═══════════════════════════════════════════

pub struct FakeAnalyzer {
    titles: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn with_titles(titles: &[&str]) -> Self {
        Self {
            titles: Some(titles.iter().map(|t| t.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            titles: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConceptAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _content: &str, _word_count: u32, _observer: &dyn ProgressObserver) -> Option<ConceptMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let titles = self.titles.as_ref()?;
        Some(ConceptMap {
            concepts: titles.iter().map(|t| crate::models::ConceptMapItem::new(t)).collect(),
            density_score: DEFAULT_DENSITY_SCORE,
        })
    }
}

enum DraftFailure {
    Never,
    Titles(Vec<String>),
    Phase(UsagePhase),
    FirstCalls(usize),
}

pub struct FakeDrafter {
    failure: DraftFailure,
    calls: AtomicUsize,
    fallback_flags: Mutex<Vec<bool>>,
}

impl Default for FakeDrafter {
    fn default() -> Self {
        Self::with_failure(DraftFailure::Never)
    }
}

impl FakeDrafter {
    fn with_failure(failure: DraftFailure) -> Self {
        Self {
            failure,
            calls: AtomicUsize::new(0),
            fallback_flags: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for<const N: usize>(titles: [&str; N]) -> Self {
        Self::with_failure(DraftFailure::Titles(titles.iter().map(|t| t.to_string()).collect()))
    }

    pub fn failing_in_phase(phase: UsagePhase) -> Self {
        Self::with_failure(DraftFailure::Phase(phase))
    }

    pub fn failing_first(calls: usize) -> Self {
        Self::with_failure(DraftFailure::FirstCalls(calls))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fallback flag seen by each draft call, in order.
    pub fn fallback_flags(&self) -> Vec<bool> {
        self.fallback_flags.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionDrafter for FakeDrafter {
    async fn draft(&self, request: &DraftRequest<'_>, _observer: &dyn ProgressObserver) -> Option<GeneratedQuestion> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.fallback_flags.lock().unwrap().push(request.fallback_active);

        let title = &request.concept.title;
        let fails = match &self.failure {
            DraftFailure::Never => false,
            DraftFailure::Titles(titles) => titles.contains(title),
            DraftFailure::Phase(phase) => *phase == request.phase,
            DraftFailure::FirstCalls(n) => call < *n,
        };
        if fails {
            return None;
        }

        let mut question = sample_question(title);
        question.cognitive_level = request.concept.level.unwrap_or(CognitiveLevel::Recall);
        Some(question)
    }
}

pub struct FakeValidator {
    script: Mutex<VecDeque<Decision>>,
    otherwise: Decision,
    calls: AtomicUsize,
}

impl FakeValidator {
    pub fn always(decision: Decision) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            otherwise: decision,
            calls: AtomicUsize::new(0),
        }
    }

    /// Scripted decisions, then approval once the script runs out.
    pub fn script<const N: usize>(decisions: [Decision; N]) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().collect()),
            otherwise: Decision::Approved,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionValidator for FakeValidator {
    async fn validate(
        &self,
        _question: &GeneratedQuestion,
        _context: &GenerationContext,
        _observer: &dyn ProgressObserver,
    ) -> Option<ValidationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let decision = self.script.lock().unwrap().pop_front().unwrap_or(self.otherwise);
        Some(match decision {
            Decision::Approved => ValidationResult::approved(90),
            Decision::Rejected => {
                ValidationResult::from_score(40, 70, vec!["distractors are weak".into()], "sharpen options".into())
            }
        })
    }
}

#[derive(Default)]
pub struct FakeReviser {
    calls: AtomicUsize,
}

impl FakeReviser {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionReviser for FakeReviser {
    async fn revise(
        &self,
        question: &GeneratedQuestion,
        _verdict: &ValidationResult,
        _context: &GenerationContext,
        _fallback_active: bool,
        _observer: &dyn ProgressObserver,
    ) -> Option<GeneratedQuestion> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut revised = question.clone();
        revised.body.question = format!("{} (revision {n})", question.body.question);
        Some(revised)
    }
}

pub struct VecSink {
    pub questions: Vec<GeneratedQuestion>,
    accepts: bool,
}

impl Default for VecSink {
    fn default() -> Self {
        Self {
            questions: Vec::new(),
            accepts: true,
        }
    }
}

impl VecSink {
    pub fn refusing() -> Self {
        Self {
            questions: Vec::new(),
            accepts: false,
        }
    }
}

#[async_trait]
impl QuestionSink for VecSink {
    async fn accept(&mut self, question: GeneratedQuestion) -> bool {
        if !self.accepts {
            return false;
        }
        self.questions.push(question);
        true
    }
}

// ═══════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════

#[derive(Default)]
struct MemoryState {
    chunks: HashMap<String, Chunk>,
    questions: Vec<(String, NewQuestion)>,
    seeded_counts: HashMap<String, PhaseCounts>,
    insert_calls: usize,
    claim_refreshes: usize,
    consecutive_fails: HashMap<(String, String), u32>,
    /// (user, chunk, diagnosis), oldest first.
    diagnoses: Vec<(String, String, String)>,
}

/// Implements every collaborator trait. Claims ignore staleness: any
/// PROCESSING chunk is held.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_inserts: bool,
}

impl MemoryStore {
    pub fn with_chunk(chunk: Chunk) -> Self {
        let store = Self::default();
        store.add_chunk(chunk);
        store
    }

    pub fn add_chunk(&self, chunk: Chunk) {
        self.state.lock().unwrap().chunks.insert(chunk.id.clone(), chunk);
    }

    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn claim_refreshes(&self) -> usize {
        self.state.lock().unwrap().claim_refreshes
    }

    pub fn questions(&self) -> Vec<NewQuestion> {
        self.state.lock().unwrap().questions.iter().map(|(_, q)| q.clone()).collect()
    }

    pub fn question_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().questions.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn insert_calls(&self) -> usize {
        self.state.lock().unwrap().insert_calls
    }

    pub fn status(&self, chunk_id: &str) -> Option<ChunkStatus> {
        self.state.lock().unwrap().chunks.get(chunk_id).and_then(|c| c.status)
    }

    pub fn metadata(&self, chunk_id: &str) -> Option<ChunkMetadata> {
        self.state.lock().unwrap().chunks.get(chunk_id).map(|c| c.metadata.clone())
    }

    pub fn target_count(&self, chunk_id: &str) -> Option<u32> {
        self.state.lock().unwrap().chunks.get(chunk_id).and_then(|c| c.target_count)
    }

    /// Pretend `count` questions already exist in `phase`.
    pub fn seed_phase_count(&self, chunk_id: &str, phase: UsagePhase, count: u32) {
        let mut state = self.state.lock().unwrap();
        let counts = state.seeded_counts.entry(chunk_id.to_string()).or_default();
        counts.set(phase, count);
    }

    /// Store a practice question without counting it as an insert call.
    pub fn seed_question(&self, chunk_id: &str, question: GeneratedQuestion) -> String {
        let id = NewQuestion::new_id();
        let record = NewQuestion {
            chunk_id: chunk_id.to_string(),
            course_id: "course-1".into(),
            section_title: "Checks and balances".into(),
            usage_phase: UsagePhase::Practice,
            question,
            parent_question_id: None,
            created_by: None,
        };
        self.state.lock().unwrap().questions.push((id.clone(), record));
        id
    }

    /// Simulate another run holding a fresh claim.
    pub fn hold_claim(&self, chunk_id: &str) {
        if let Some(chunk) = self.state.lock().unwrap().chunks.get_mut(chunk_id) {
            chunk.status = Some(ChunkStatus::Processing);
        }
    }

    pub fn set_consecutive_fails(&self, user_id: &str, question_id: &str, fails: u32) {
        self.state
            .lock()
            .unwrap()
            .consecutive_fails
            .insert((user_id.to_string(), question_id.to_string()), fails);
    }

    pub fn push_diagnosis(&self, user_id: &str, chunk_id: &str, diagnosis: &str) {
        self.state.lock().unwrap().diagnoses.push((
            user_id.to_string(),
            chunk_id.to_string(),
            diagnosis.to_string(),
        ));
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn load_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>, GenerationError> {
        Ok(self.state.lock().unwrap().chunks.get(chunk_id).cloned())
    }

    async fn chunk_summary(&self, chunk_id: &str) -> Result<Option<ChunkSummary>, GenerationError> {
        Ok(self.state.lock().unwrap().chunks.get(chunk_id).map(Chunk::summary))
    }

    async fn claim_chunk(&self, chunk_id: &str, _stale_after_secs: u64) -> Result<bool, GenerationError> {
        let mut state = self.state.lock().unwrap();
        let chunk = state
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| GenerationError::ChunkNotFound(chunk_id.to_string()))?;
        if chunk.status == Some(ChunkStatus::Processing) {
            return Ok(false);
        }
        chunk.status = Some(ChunkStatus::Processing);
        Ok(true)
    }

    async fn refresh_claim(&self, chunk_id: &str) -> Result<bool, GenerationError> {
        let mut state = self.state.lock().unwrap();
        state.claim_refreshes += 1;
        Ok(state
            .chunks
            .get(chunk_id)
            .is_some_and(|chunk| chunk.status == Some(ChunkStatus::Processing)))
    }

    async fn set_status(&self, chunk_id: &str, status: ChunkStatus) -> Result<(), GenerationError> {
        let mut state = self.state.lock().unwrap();
        let chunk = state
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| GenerationError::ChunkNotFound(chunk_id.to_string()))?;
        chunk.status = Some(status);
        Ok(())
    }

    async fn save_metadata(
        &self,
        chunk_id: &str,
        metadata: &ChunkMetadata,
        target_count: u32,
    ) -> Result<(), GenerationError> {
        let mut state = self.state.lock().unwrap();
        let chunk = state
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| GenerationError::ChunkNotFound(chunk_id.to_string()))?;
        chunk.metadata = metadata.clone();
        chunk.target_count = Some(target_count);
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn count_by_phase(&self, chunk_id: &str) -> Result<PhaseCounts, GenerationError> {
        let state = self.state.lock().unwrap();
        let mut counts = state.seeded_counts.get(chunk_id).copied().unwrap_or_default();
        let master_set = state
            .questions
            .iter()
            .filter(|(_, q)| q.chunk_id == chunk_id && q.parent_question_id.is_none());
        for (_, question) in master_set {
            let phase = question.usage_phase;
            counts.set(phase, counts.get(phase) + 1);
        }
        Ok(counts)
    }

    async fn insert_question(&self, question: &NewQuestion) -> Result<String, GenerationError> {
        let mut state = self.state.lock().unwrap();
        state.insert_calls += 1;
        if self.fail_inserts {
            return Err(GenerationError::StoreTask("insert refused".into()));
        }
        if !question.question.body.has_evidence() {
            return Err(GenerationError::MissingEvidence);
        }
        let id = NewQuestion::new_id();
        state.questions.push((id.clone(), question.clone()));
        Ok(id)
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<StoredQuestion>, GenerationError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .questions
            .iter()
            .find(|(id, _)| id == question_id)
            .map(|(id, q)| StoredQuestion {
                id: id.clone(),
                chunk_id: q.chunk_id.clone(),
                course_id: q.course_id.clone(),
                section_title: q.section_title.clone(),
                usage_phase: q.usage_phase,
                cognitive_level: q.question.cognitive_level,
                body: q.question.body.clone(),
                concept_title: Some(q.question.concept_title.clone()).filter(|t| !t.is_empty()),
                parent_question_id: q.parent_question_id.clone(),
                created_by: q.created_by.clone(),
                created_at: chrono::Utc::now().naive_utc(),
            }))
    }
}

#[async_trait]
impl LearnerHistory for MemoryStore {
    async fn consecutive_fails(&self, user_id: &str, question_id: &str) -> Result<u32, GenerationError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .consecutive_fails
            .get(&(user_id.to_string(), question_id.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn recent_diagnoses(
        &self,
        user_id: &str,
        chunk_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, GenerationError> {
        let state = self.state.lock().unwrap();
        let mut distinct: Vec<String> = Vec::new();
        for (_, _, diagnosis) in state
            .diagnoses
            .iter()
            .rev()
            .filter(|(u, c, _)| u == user_id && c == chunk_id)
        {
            if distinct.len() >= limit {
                break;
            }
            if !distinct.contains(diagnosis) {
                distinct.push(diagnosis.clone());
            }
        }
        Ok(distinct)
    }
}

#[async_trait]
impl GuidanceProvider for MemoryStore {
    async fn guideline_for(&self, _course_id: &str) -> Result<Option<SubjectGuideline>, GenerationError> {
        Ok(None)
    }
}

/// Dependencies with fake tasks over `store`. The follow-up generator talks to
/// an empty scripted backend; replace it to exercise follow-ups.
pub fn test_deps(store: Arc<MemoryStore>, analyzer: Arc<FakeAnalyzer>, validator: FakeValidator) -> GenerationDeps {
    let config = GenerationConfig::single_backend("fake");
    GenerationDeps {
        chunks: store.clone(),
        questions: store.clone(),
        learners: store.clone(),
        guidance: store,
        analyzer,
        drafter: Arc::new(FakeDrafter::default()),
        validator: Arc::new(validator),
        reviser: Arc::new(FakeReviser::default()),
        follow_up: Arc::new(FollowUpGenerator::new(
            scripted_generator(Arc::new(ScriptedBackend::new("fake"))),
            &config,
        )),
        config,
        cancel: Arc::new(AtomicBool::new(false)),
    }
}
