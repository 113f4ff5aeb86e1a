use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CommandTracker, HttpCommandRepository, Intent, IntentOutcome, ResumeOutcome, TrackerSnapshot,
    TrackerView,
};
use futures::StreamExt;
use shared::domain::{AgentId, ScanParams};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;
use render::{exit_status, final_report, progress_line};

#[derive(Parser, Debug)]
#[command(
    name = "scanctl",
    about = "Dispatch remote network scans and follow them to completion"
)]
struct Cli {
    /// Base URL of the agent-command API.
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    agent_id: Option<String>,
    /// Settings file; defaults to ./scanctl.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Create a scan command for the agent and follow it.
    Scan {
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
        #[arg(long)]
        shield: bool,
    },
    /// Follow the agent's most recent command if it is still in flight.
    Resume,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(agent_id) = cli.agent_id {
        settings.agent_id = agent_id;
    }

    let repository = HttpCommandRepository::new(&settings.server_url)
        .with_context(|| format!("cannot use server url {}", settings.server_url))?;
    let tracker = CommandTracker::new_with_options(
        AgentId::new(settings.agent_id.clone()),
        Arc::new(repository),
        settings.tracker_options(),
    );
    let updates = tracker.subscribe();

    let intent = match cli.command {
        CliCommand::Scan { targets, shield } => {
            Intent::TriggerScan(ScanParams::new(targets, shield))
        }
        CliCommand::Resume => Intent::Resume,
    };
    match tracker.handle_intent(intent).await? {
        IntentOutcome::ScanStarted(command_id) => {
            println!("Scan {command_id} created for agent {}", settings.agent_id);
        }
        IntentOutcome::Resume(ResumeOutcome::Resumed(command_id)) => {
            println!("Resumed scan {command_id} for agent {}", settings.agent_id);
        }
        IntentOutcome::Resume(ResumeOutcome::Idle) => {
            println!("No scan in progress for agent {}", settings.agent_id);
            return Ok(ExitCode::SUCCESS);
        }
        IntentOutcome::Resume(ResumeOutcome::AlreadyTracking(command_id)) => {
            println!("Already following scan {command_id}");
        }
        IntentOutcome::Dismissed => {}
    }

    let Some(view) = follow(&tracker, updates).await else {
        println!(
            "Stopped following; the scan continues on the agent. Run `scanctl resume` to pick it up again."
        );
        return Ok(ExitCode::SUCCESS);
    };

    for line in final_report(&view) {
        println!("{line}");
    }
    let outcome = tracker.snapshot().outcome;
    if let Err(err) = tracker.handle_intent(Intent::Dismiss).await {
        warn!("failed to dismiss finished scan: {err}");
    }
    info!(?outcome, "scan finished");
    Ok(ExitCode::from(exit_status(outcome)))
}

/// Prints a line per visible change until the session finishes. `None` when interrupted.
async fn follow(
    tracker: &Arc<CommandTracker>,
    updates: watch::Receiver<TrackerSnapshot>,
) -> Option<TrackerView> {
    let mut stream = WatchStream::new(updates);
    let mut last_line = String::new();
    loop {
        tokio::select! {
            next = stream.next() => {
                let snapshot = next?;
                if !snapshot.is_tracking() {
                    continue;
                }
                let view = TrackerView::from(&snapshot);
                if snapshot.is_done() {
                    return Some(view);
                }
                let line = progress_line(&view);
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(agent_id = %tracker.agent_id(), "interrupted while following scan");
                return None;
            }
        }
    }
}
