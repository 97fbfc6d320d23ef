use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use ai_digest::config::DigestConfig;
use ai_digest::delivery::{FileArchiver, mailer_from_config};
use ai_digest::llm::create_provider;
use ai_digest::pipeline::{Collaborators, PipelineState, RunOutcome, build_engine};
use ai_digest::sources;

#[derive(Parser)]
#[command(name = "ai-digest", version, about = "Weekly AI agent newsletter pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once.
    Run {
        /// Write the final pipeline state here as JSON.
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
    /// Run the pipeline on the configured cron schedule.
    Schedule,
}

fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("DIGEST_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ai-digest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    guard
}

async fn run_once(config: &DigestConfig, state_out: Option<&Path>) -> anyhow::Result<PipelineState> {
    let llm = create_provider(&config.llm).context("creating LLM provider")?;
    let deps = Collaborators {
        llm,
        sources: sources::from_config(&config.research),
        mailer: mailer_from_config(&config.delivery),
        archiver: Arc::new(FileArchiver::new(config.delivery.archive_dir.clone())),
    };
    let engine = build_engine(config, deps);

    let state = engine
        .run(PipelineState::new(config.delivery.recipients.clone()))
        .await;
    print_summary(&state);

    if let Some(path) = state_out {
        let json = state.to_json().context("serializing pipeline state")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing state to {}", path.display()))?;
        eprintln!("   State written to {}", path.display());
    }
    Ok(state)
}

fn print_summary(state: &PipelineState) {
    let draft = &state.draft;
    eprintln!("\n── Run summary ─────────────────────────────────────");
    eprintln!("   Subject: {}", draft.subject);
    eprintln!("   Approved: {}", state.approved);
    eprintln!("   Approval score: {:.2}", draft.approval_score);
    eprintln!("   Feedback: {}", draft.feedback);
    eprintln!("   Revision attempts: {}", state.revision_attempts);
    eprintln!("   Sent: {}", state.delivery.sent);
    eprintln!("   Delivery report: {}", state.delivery.report);
    for path in &state.delivery.archived {
        eprintln!("   Archived: {}", path.display());
    }
    if !state.notes.is_empty() {
        eprintln!("   Notes:");
        for note in &state.notes {
            eprintln!("     [{}] {}", note.stage, note.message);
        }
    }
    match state.outcome() {
        RunOutcome::Shipped => eprintln!("SUCCESS: newsletter approved and sent."),
        RunOutcome::ShippedDegraded => {
            eprintln!("WARNING: newsletter approved but delivery failed or was skipped.")
        }
        RunOutcome::Rejected => eprintln!("FAILURE: newsletter was not approved."),
    }
}

async fn schedule(config: &DigestConfig) -> anyhow::Result<()> {
    let schedule = config.schedule.parse()?;
    eprintln!("   Schedule: {}", config.schedule.cron);
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::warn!(cron = %config.schedule.cron, "Schedule has no upcoming fire times");
            return Ok(());
        };
        tracing::info!(next = %next, "Waiting for next run");
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = run_once(config, None).await {
            tracing::error!(error = %e, "Scheduled run failed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = DigestConfig::from_env()?;
    eprintln!("📰 AI Digest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Keywords: {}", config.research.keywords.join(", "));
    eprintln!("   Recipients: {}", config.delivery.recipients.len());

    match cli.command {
        Command::Run { state_out } => {
            let state = run_once(&config, state_out.as_deref()).await?;
            Ok(match state.outcome() {
                RunOutcome::Rejected => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            })
        }
        Command::Schedule => {
            schedule(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
