pub mod types;
pub mod sanitize;
pub mod parser;
pub mod schema;
pub mod pacing;
pub mod ollama;
pub mod openai;
pub mod router;
pub mod generator;
#[cfg(test)]
pub mod mock;

pub use types::*;
pub use sanitize::*;
pub use parser::*;
pub use schema::*;
pub use pacing::*;
pub use ollama::*;
pub use openai::*;
pub use router::*;
pub use generator::*;
#[cfg(test)]
pub use mock::*;

use thiserror::Error;

/// Transport and protocol failures of a text-generation backend.
/// Malformed content is not an error at this layer.
#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Backend is not reachable at {0}")]
    Connection(String),

    #[error("Backend returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No backend registered under '{0}'")]
    UnknownBackend(String),
}
