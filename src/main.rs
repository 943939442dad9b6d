use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use tutor_core::clock::{Clock, SystemClock};
use tutor_core::ids::SessionId;
use tutor_core::messages::Turn;
use tutor_core::provider::Generator;
use tutor_engine::{LearnerSession, SessionFlags, TranscriptOptions, Tutor, TutorConfig};
use tutor_llm::{ChatCompletionsConfig, ChatCompletionsGenerator, MlxConfig, MlxGenerator};
use tutor_settings::{GenerationBackend, TutorSettings};
use tutor_store::{Database, SessionRepo, TurnRepo};
use tutor_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "tutor", about = "Summary-driven tutoring server")]
struct Cli {
    /// Settings file (defaults to ~/.tutor/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Render a stored session as Markdown.
    Export {
        #[arg(long)]
        session: String,
        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => tutor_settings::load_settings_from_path(path),
        None => tutor_settings::load_settings(),
    }
    .context("failed to load settings")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(settings, port).await,
        Command::Export { session, output } => export(&settings, &session, output.as_deref()),
    }
}

async fn serve(mut settings: TutorSettings, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        settings.server.port = port;
    }

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: TelemetryConfig::parse_level(&settings.logging.level),
        module_levels: Vec::new(),
        log_to_sqlite: settings.logging.log_to_sqlite,
        log_db_path: PathBuf::from(&settings.logging.log_db_path),
    });

    let db = open_database(&settings)?;
    let generator = build_generator(&settings);
    tracing::info!(
        generator = generator.name(),
        model = generator.model(),
        "generator configured"
    );
    if !generator.health_check().await {
        tracing::warn!(generator = generator.name(), "generator is not reachable yet");
    }

    let tutor = Arc::new(Tutor::new(
        generator,
        TutorConfig {
            transcript: transcript_options(&settings),
            interaction_mode_default: settings.tutor.interaction_mode_default,
        },
    ));

    let handle = tutor_server::start(
        tutor_server::ServerConfig {
            host: settings.server.host.clone(),
            port: settings.server.port,
        },
        db,
        tutor,
    )
    .await
    .context("failed to start server")?;

    tracing::info!(port = handle.port, "tutor server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown();
    Ok(())
}

/// Rebuild a stored session offline and print its transcript.
fn export(settings: &TutorSettings, session: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let session_id = SessionId::from_raw(session);

    let row = SessionRepo::new(db.clone())
        .get(&session_id)
        .with_context(|| format!("session {session_id}"))?;
    let turns: Vec<Turn> = TurnRepo::new(db)
        .list(&session_id)?
        .into_iter()
        .map(Turn::from)
        .collect();

    let flags = SessionFlags {
        interaction_mode: row.interaction_mode,
        visual_hint: row.visual_hint,
    };
    let mut learner_session = LearnerSession::from_snapshot(row.snapshot(), flags)?;
    learner_session.load_history(turns);
    let markdown = learner_session.render(&transcript_options(settings), SystemClock.now());

    match output {
        Some(path) => std::fs::write(path, markdown)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{markdown}"),
    }
    Ok(())
}

fn open_database(settings: &TutorSettings) -> anyhow::Result<Database> {
    let db_path = PathBuf::from(&settings.server.database_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(db)
}

fn build_generator(settings: &TutorSettings) -> Arc<dyn Generator> {
    let g = &settings.generation;
    let timeout = Duration::from_millis(g.timeout_ms);
    match g.backend {
        GenerationBackend::Mlx => Arc::new(MlxGenerator::new(MlxConfig {
            binary: g.mlx_binary.clone(),
            model: g.model.clone(),
            max_tokens: g.max_tokens,
            temperature: g.temperature,
            top_p: g.top_p,
            timeout,
        })),
        GenerationBackend::ChatCompletions => {
            Arc::new(ChatCompletionsGenerator::new(ChatCompletionsConfig {
                endpoint: g.endpoint.clone(),
                model: g.model.clone(),
                max_tokens: g.max_tokens,
                temperature: g.temperature,
                top_p: g.top_p,
                timeout,
            }))
        }
    }
}

fn transcript_options(settings: &TutorSettings) -> TranscriptOptions {
    TranscriptOptions {
        title: settings.transcript.title.clone(),
        summary_preview_chars: settings.transcript.summary_preview_chars,
    }
}
