//! Exam-question generation: concept mapping, drafting, validation,
//! revision, phase scheduling and follow-ups.

pub mod error;
pub mod types;
pub mod traits;
pub mod prompt;
pub mod strategy;
pub mod observer;
pub mod analyzer;
pub mod drafter;
pub mod validator;
pub mod reviser;
pub mod pipeline;
pub mod quota;
pub mod scheduler;
pub mod runner;
pub mod followup;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use analyzer::LlmConceptAnalyzer;
pub use drafter::LlmQuestionDrafter;
pub use error::GenerationError;
pub use followup::{generate_follow_up, FollowUpGenerator};
pub use observer::TracingObserver;
pub use pipeline::{GenerationPipeline, MAX_REVISION_ATTEMPTS};
pub use prompt::GenerationContext;
pub use quota::{phase_targets, plan_quota};
pub use reviser::LlmQuestionReviser;
pub use runner::{generate_questions_for_chunk, GenerationDeps};
pub use scheduler::{PhaseScheduler, RunState};
pub use store::SqliteQuestionBank;
pub use traits::*;
pub use types::*;
pub use validator::LlmQuestionValidator;
