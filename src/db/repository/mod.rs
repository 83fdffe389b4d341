//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`; the async store adapter in
//! `pipeline::generation::store` wraps these for the pipeline.

mod chunk;
mod guideline;
mod learner;
mod question;

/// Timestamp format used by every `datetime('now')` column.
pub(crate) const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub use chunk::*;
pub use guideline::*;
pub use learner::*;
pub use question::*;
