use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use quizsmith::config::{self, Endpoints};
use quizsmith::pipeline::generation::{
    generate_questions_for_chunk, GenerationConfig, GenerationDeps, SqliteQuestionBank, TracingObserver,
};
use quizsmith::pipeline::structuring::{BackendRegistry, StructuredGenerator};

/// Generate exam questions for one stored chunk.
#[derive(Parser, Debug)]
#[command(name = "quizsmith", version)]
struct Cli {
    /// Id of the chunk to generate questions for.
    chunk_id: String,

    /// Question bank database. Defaults to ~/Quizsmith/question_bank.db.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    quizsmith::init_tracing();
    let cli = Cli::parse();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let db_path = cli.db.unwrap_or_else(config::default_db_path);
    let bank = match SqliteQuestionBank::open(&db_path) {
        Ok(bank) => Arc::new(bank),
        Err(e) => {
            eprintln!("quizsmith: cannot open {}: {e}", db_path.display());
            return ExitCode::FAILURE;
        }
    };

    let registry = match BackendRegistry::from_endpoints(&Endpoints::from_env()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("quizsmith: backend setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let deps = GenerationDeps::with_backends(bank, StructuredGenerator::new(registry), GenerationConfig::default());
    let cancel = deps.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next batch boundary");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let result = generate_questions_for_chunk(&cli.chunk_id, &deps, &TracingObserver).await;
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("quizsmith: cannot render result: {e}"),
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
