//! ISET assistant console - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Build the backend (HTTP, or scripted with `--offline`)
//! 4. Wire the session store, submission pipeline, voice controller and review workflow
//! 5. Run the console until `:quit`

mod cli;
mod repl;

use std::sync::Arc;

use clap::Parser;

use iset_chat::{SessionStore, SubmissionPipeline};
use iset_client::{HttpBackend, MockBackend};
use iset_core::config::AssistantConfig;
use iset_core::events::EventBus;
use iset_core::remote::ChatBackend;
use iset_core::types::{Category, SessionId, Timestamp};
use iset_core::wire::{LearningStatus, WireBot, WireCandidate, WireMessage, WireSession};
use iset_review::CandidateReviewWorkflow;
use iset_voice::{ScriptedRecognizer, VoiceCaptureController};

use crate::cli::CliArgs;
use crate::repl::Console;

/// Scripted backend for `--offline`: one past conversation and two review
/// candidates.
fn demo_backend() -> MockBackend {
    let asked = Timestamp::now();
    MockBackend::new()
        .with_sessions(vec![WireSession {
            id: SessionId(1),
            date: asked,
            messages: vec![WireMessage {
                user: "Quels sont les horaires de la bibliothèque ?".into(),
                timestamp: asked,
                bot: Some(WireBot {
                    answer: "La bibliothèque est ouverte de 8h à 18h.".into(),
                    method: Some("tfidf".into()),
                    similarity: Some(0.91),
                    ..WireBot::default()
                }),
            }],
        }])
        .with_next_session_id(42)
        .with_status(LearningStatus {
            well_rated_available: 2,
            total_questions: Some(120),
            new_questions: Some(2),
            candidates_ready: Some(true),
        })
        .with_candidates(vec![
            WireCandidate {
                question: "Quand ouvre la bibliothèque ?".into(),
                answer: "La bibliothèque ouvre à 8h.".into(),
                category: Category::Bibliotheque,
                confidence: 0.92,
            },
            WireCandidate {
                question: "Comment s'inscrire en master ?".into(),
                answer: "Les inscriptions se font en ligne.".into(),
                category: Category::Admission,
                confidence: 0.65,
            },
        ])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = AssistantConfig::load_or_default(&config_file);
    config.backend.base_url = args.resolve_base_url(&config.backend.base_url);
    let log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting iset v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");
    config.validate()?;

    // Backend.
    let backend: Arc<dyn ChatBackend> = if args.offline {
        tracing::info!("Offline mode, using the scripted backend");
        Arc::new(demo_backend())
    } else {
        tracing::info!(base_url = %config.backend.base_url, "Using HTTP backend");
        Arc::new(HttpBackend::new(&config.backend)?)
    };

    // Engine.
    let events = EventBus::default();
    let printer_rx = events.subscribe();
    let store = SessionStore::new(Arc::clone(&backend), events.clone(), config.chat.clone());
    let pipeline = SubmissionPipeline::new(store.clone());
    let voice = VoiceCaptureController::new(
        Arc::new(ScriptedRecognizer::new()),
        pipeline.clone(),
        config.voice.clone(),
    );
    let review = CandidateReviewWorkflow::new(backend, events, config.review.clone());

    tokio::spawn(repl::print_events(store.clone(), printer_rx));

    // Console.
    Console {
        store,
        pipeline,
        voice,
        review,
    }
    .run()
    .await?;

    Ok(())
}
