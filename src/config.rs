use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Quizsmith";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "quizsmith=info,warn"
}

/// Get the application data directory
/// ~/Quizsmith/ on all platforms. Falls back to the working directory when
/// no home directory can be determined (containers, CI).
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => PathBuf::from(".").join(APP_NAME),
    }
}

/// Default question bank database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("question_bank.db")
}

/// Base URLs and credentials for the text-generation backends.
///
/// Read from the environment so deployments can point the pipeline at a
/// local Ollama or a hosted OpenAI-compatible gateway without recompiling.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// `QUIZSMITH_OLLAMA_URL` (default `http://localhost:11434`).
    pub ollama_url: String,
    /// `QUIZSMITH_OPENAI_URL` (default `https://api.openai.com`).
    pub openai_url: String,
    /// `QUIZSMITH_OPENAI_KEY`. Hosted backend is not registered without it.
    pub openai_key: Option<String>,
    /// `QUIZSMITH_TIMEOUT_SECS` (default 120).
    pub timeout_secs: u64,
    /// `QUIZSMITH_TOKENS_PER_MINUTE`: pacing budget for the hosted backend.
    pub tokens_per_minute: Option<u32>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            openai_url: "https://api.openai.com".to_string(),
            openai_key: None,
            timeout_secs: 120,
            tokens_per_minute: None,
        }
    }
}

impl Endpoints {
    /// Overlay `QUIZSMITH_*` environment variables on the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            ollama_url: non_empty("QUIZSMITH_OLLAMA_URL").unwrap_or(defaults.ollama_url),
            openai_url: non_empty("QUIZSMITH_OPENAI_URL").unwrap_or(defaults.openai_url),
            openai_key: non_empty("QUIZSMITH_OPENAI_KEY"),
            timeout_secs: non_empty("QUIZSMITH_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            tokens_per_minute: non_empty("QUIZSMITH_TOKENS_PER_MINUTE")
                .and_then(|v| v.parse().ok()),
        }
    }
}
