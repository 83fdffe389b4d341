//! SQLite-backed collaborators.
//!
//! One connection behind a mutex; every call hops onto the blocking pool and
//! runs a repository function there.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use super::error::GenerationError;
use super::traits::{ChunkStore, GuidanceProvider, LearnerHistory, QuestionStore};
use super::types::PhaseCounts;
use crate::db::{self, DatabaseError};
use crate::models::enums::{ChunkStatus, UsagePhase};
use crate::models::{Chunk, ChunkMetadata, ChunkSummary, NewQuestion, StoredQuestion, SubjectGuideline};

#[derive(Clone)]
pub struct SqliteQuestionBank {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQuestionBank {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, GenerationError> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, GenerationError> {
        Ok(Self::new(db::open_memory_database()?))
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, GenerationError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let joined = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| GenerationError::StoreTask(e.to_string()))?;
        Ok(joined?)
    }
}

#[async_trait]
impl ChunkStore for SqliteQuestionBank {
    async fn load_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>, GenerationError> {
        let id = chunk_id.to_string();
        self.with_conn(move |conn| db::get_chunk(conn, &id)).await
    }

    async fn chunk_summary(&self, chunk_id: &str) -> Result<Option<ChunkSummary>, GenerationError> {
        let id = chunk_id.to_string();
        self.with_conn(move |conn| db::get_chunk_summary(conn, &id)).await
    }

    async fn claim_chunk(&self, chunk_id: &str, stale_after_secs: u64) -> Result<bool, GenerationError> {
        let id = chunk_id.to_string();
        self.with_conn(move |conn| db::claim_chunk(conn, &id, stale_after_secs))
            .await
    }

    async fn refresh_claim(&self, chunk_id: &str) -> Result<bool, GenerationError> {
        let id = chunk_id.to_string();
        self.with_conn(move |conn| db::refresh_claim(conn, &id)).await
    }

    async fn set_status(&self, chunk_id: &str, status: ChunkStatus) -> Result<(), GenerationError> {
        let id = chunk_id.to_string();
        self.with_conn(move |conn| db::update_chunk_status(conn, &id, status))
            .await
    }

    async fn save_metadata(
        &self,
        chunk_id: &str,
        metadata: &ChunkMetadata,
        target_count: u32,
    ) -> Result<(), GenerationError> {
        let id = chunk_id.to_string();
        let metadata = metadata.clone();
        self.with_conn(move |conn| db::save_chunk_metadata(conn, &id, &metadata, target_count))
            .await
    }
}

#[async_trait]
impl QuestionStore for SqliteQuestionBank {
    async fn count_by_phase(&self, chunk_id: &str) -> Result<PhaseCounts, GenerationError> {
        let id = chunk_id.to_string();
        let counts = self
            .with_conn(move |conn| db::count_questions_by_phase(conn, &id))
            .await?;

        let mut phases = PhaseCounts::default();
        for phase in UsagePhase::ordered() {
            phases.set(phase, counts.get(&phase).copied().unwrap_or(0));
        }
        Ok(phases)
    }

    async fn insert_question(&self, question: &NewQuestion) -> Result<String, GenerationError> {
        if !question.question.body.has_evidence() {
            return Err(GenerationError::MissingEvidence);
        }
        let question = question.clone();
        self.with_conn(move |conn| db::insert_question(conn, &question))
            .await
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<StoredQuestion>, GenerationError> {
        let id = question_id.to_string();
        self.with_conn(move |conn| db::get_question(conn, &id)).await
    }
}

#[async_trait]
impl LearnerHistory for SqliteQuestionBank {
    async fn consecutive_fails(&self, user_id: &str, question_id: &str) -> Result<u32, GenerationError> {
        let (user, question) = (user_id.to_string(), question_id.to_string());
        self.with_conn(move |conn| db::get_consecutive_fails(conn, &user, &question))
            .await
    }

    async fn recent_diagnoses(
        &self,
        user_id: &str,
        chunk_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, GenerationError> {
        let (user, chunk) = (user_id.to_string(), chunk_id.to_string());
        self.with_conn(move |conn| db::recent_distinct_diagnoses(conn, &user, &chunk, limit))
            .await
    }
}

#[async_trait]
impl GuidanceProvider for SqliteQuestionBank {
    async fn guideline_for(&self, course_id: &str) -> Result<Option<SubjectGuideline>, GenerationError> {
        let id = course_id.to_string();
        let guideline = self
            .with_conn(move |conn| db::get_subject_guideline(conn, &id))
            .await?;
        Ok(guideline.filter(|g| !g.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::CognitiveLevel;
    use crate::pipeline::generation::quota::plan_quota;
    use crate::pipeline::generation::test_support::{sample_chunk, sample_question};

    async fn seeded() -> SqliteQuestionBank {
        let bank = SqliteQuestionBank::open_in_memory().unwrap();
        bank.with_conn(|conn| db::insert_chunk(conn, &sample_chunk("chunk-1")))
            .await
            .unwrap();
        bank
    }

    fn new_question(phase: UsagePhase) -> NewQuestion {
        NewQuestion {
            chunk_id: "chunk-1".into(),
            course_id: "course-1".into(),
            section_title: "Checks and balances".into(),
            usage_phase: phase,
            question: sample_question("Veto"),
            parent_question_id: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let bank = seeded().await;
        assert!(bank.claim_chunk("chunk-1", 900).await.unwrap());
        assert!(!bank.claim_chunk("chunk-1", 900).await.unwrap());

        bank.set_status("chunk-1", ChunkStatus::Completed).await.unwrap();
        assert!(bank.claim_chunk("chunk-1", 900).await.unwrap());
    }

    #[tokio::test]
    async fn active_run_keeps_its_claim_past_the_stale_window() {
        let bank = seeded().await;
        assert!(bank.claim_chunk("chunk-1", 900).await.unwrap());
        bank.with_conn(|conn| {
            conn.execute(
                "UPDATE chunks SET updated_at = datetime('now', '-20 minutes') WHERE id = 'chunk-1'",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(bank.refresh_claim("chunk-1").await.unwrap());
        assert!(!bank.claim_chunk("chunk-1", 900).await.unwrap());
    }

    #[tokio::test]
    async fn counts_cover_every_phase() {
        let bank = seeded().await;
        bank.insert_question(&new_question(UsagePhase::Practice)).await.unwrap();
        bank.insert_question(&new_question(UsagePhase::Practice)).await.unwrap();
        bank.insert_question(&new_question(UsagePhase::ExamSimulation)).await.unwrap();

        let counts = bank.count_by_phase("chunk-1").await.unwrap();
        assert_eq!(counts, PhaseCounts { practice: 2, archive: 0, exam_simulation: 1 });
    }

    #[tokio::test]
    async fn follow_ups_leave_the_master_set_unsealed() {
        let bank = seeded().await;
        let parent = bank.insert_question(&new_question(UsagePhase::Practice)).await.unwrap();
        for _ in 0..2 {
            let mut follow_up = new_question(UsagePhase::Practice);
            follow_up.parent_question_id = Some(parent.clone());
            bank.insert_question(&follow_up).await.unwrap();
        }

        let counts = bank.count_by_phase("chunk-1").await.unwrap();
        assert_eq!(counts, PhaseCounts { practice: 1, archive: 0, exam_simulation: 0 });
        assert!(!plan_quota(3, counts).is_sealed());
    }

    #[tokio::test]
    async fn inserted_question_reads_back() {
        let bank = seeded().await;
        let parent = bank.insert_question(&new_question(UsagePhase::Practice)).await.unwrap();
        let mut record = new_question(UsagePhase::Practice);
        record.parent_question_id = Some(parent.clone());
        record.created_by = Some("user-1".into());
        let id = bank.insert_question(&record).await.unwrap();

        let stored = bank.get_question(&id).await.unwrap().unwrap();
        assert_eq!(stored.cognitive_level, CognitiveLevel::Application);
        assert_eq!(stored.concept_title.as_deref(), Some("Veto"));
        assert_eq!(stored.parent_question_id, Some(parent));
        assert_eq!(stored.created_by.as_deref(), Some("user-1"));
        assert_eq!(stored.body, record.question.body);
    }

    #[tokio::test]
    async fn evidence_is_required() {
        let bank = seeded().await;
        let mut record = new_question(UsagePhase::Practice);
        record.question.body.evidence = " ".into();
        assert!(matches!(
            bank.insert_question(&record).await,
            Err(GenerationError::MissingEvidence)
        ));
    }

    #[tokio::test]
    async fn metadata_round_trips_through_chunk() {
        let bank = seeded().await;
        let mut metadata = ChunkMetadata::default();
        metadata.concept_map = Some(vec![crate::models::ConceptMapItem::new("Veto")]);
        metadata.density_score = Some(4);
        bank.save_metadata("chunk-1", &metadata, 1).await.unwrap();

        let chunk = bank.load_chunk("chunk-1").await.unwrap().unwrap();
        assert_eq!(chunk.target_count, Some(1));
        assert_eq!(chunk.metadata.reusable_concepts().unwrap()[0].title, "Veto");
        assert_eq!(chunk.metadata.density_score, Some(4));
    }

    #[tokio::test]
    async fn blank_guideline_reads_as_none() {
        let bank = seeded().await;
        bank.with_conn(|conn| {
            db::upsert_subject_guideline(conn, "course-1", &SubjectGuideline::default())
        })
        .await
        .unwrap();
        assert!(bank.guideline_for("course-1").await.unwrap().is_none());
        assert!(bank.guideline_for("course-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn learner_history_reads_repository() {
        let bank = seeded().await;
        let id = bank.insert_question(&new_question(UsagePhase::Practice)).await.unwrap();
        let qid = id.clone();
        bank.with_conn(move |conn| {
            db::record_answer(conn, "user-1", &qid, "chunk-1", false, Some("mixes branches"))?;
            db::record_answer(conn, "user-1", &qid, "chunk-1", false, None)
        })
        .await
        .unwrap();

        assert_eq!(bank.consecutive_fails("user-1", &id).await.unwrap(), 2);
        assert_eq!(
            bank.recent_diagnoses("user-1", "chunk-1", 3).await.unwrap(),
            vec!["mixes branches".to_string()]
        );
    }
}
