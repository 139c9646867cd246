//! CLI entry point for AgentWork.
//!
//! This binary provides the `agentwork` command with subcommands for making a
//! single function-calling decision and for replaying recorded provider
//! streams through the agent state machine.

mod cli;
mod settings;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use agentwork_decision::{
    ConfigStore, DecisionEngine, EnvDefaults, SliderConfig, SqliteConfigStore, TieredConfigCache,
    ToolSpec,
};
use agentwork_stream::{
    DEFAULT_SESSION_CAPACITY, ProviderKind, ProviderStream, SessionUpdate, spawn_session,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::settings::SettingsFile;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env"),
    }

    match cli.command {
        Commands::Decide {
            message,
            tools,
            slider,
            db,
            config,
        } => cmd_decide(&message, tools, slider, db.as_deref(), config.as_deref()).await,
        Commands::Replay {
            provider,
            each,
            file,
        } => cmd_replay(provider, each, &file).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: decide
// ---------------------------------------------------------------------------

async fn cmd_decide(
    message: &str,
    tool_count: usize,
    slider: u8,
    db: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    let store: Option<Arc<dyn ConfigStore>> = match (db, config) {
        (Some(db), _) => {
            let store = SqliteConfigStore::open(db)
                .with_context(|| format!("failed to open configuration database {}", db.display()))?;
            info!(path = %db.display(), "using sqlite configuration store");
            Some(Arc::new(store))
        }
        (None, Some(config)) => {
            let store = SettingsFile::load(config)?.into_store();
            info!(path = %config.display(), "using file configuration");
            Some(Arc::new(store))
        }
        (None, None) => None,
    };

    let engine = DecisionEngine::new(Arc::new(TieredConfigCache::new(
        store,
        EnvDefaults::from_env(),
    )));

    let tools: Vec<ToolSpec> = (0..tool_count)
        .map(|i| ToolSpec::new(format!("tool_{i}"), "placeholder tool"))
        .collect();
    let tools = (!tools.is_empty()).then_some(tools.as_slice());

    let decision = engine
        .decide(message, tools, SliderConfig::new(slider))
        .await;

    println!(
        "{}",
        serde_json::to_string_pretty(&decision).context("failed to serialize decision")?
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: replay
// ---------------------------------------------------------------------------

async fn cmd_replay(provider: ProviderKind, each: bool, file: &Path) -> Result<()> {
    let recording = read_recording(file)?;
    info!(provider = %provider, lines = recording.lines().count(), "replaying stream");

    let (session, mut updates) = spawn_session(file.display().to_string(), DEFAULT_SESSION_CAPACITY);

    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if !each {
                continue;
            }
            if let SessionUpdate::Snapshot(snapshot) = update {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to serialize snapshot"),
                }
            }
        }
    });

    let mut stream = ProviderStream::new(provider);
    for (number, line) in recording.lines().enumerate() {
        let events = match stream.feed_line(line) {
            Ok(events) => events,
            Err(e) => {
                warn!(line = number + 1, error = %e, "skipping unparseable line");
                continue;
            }
        };
        for event in events {
            session.send(event).await.context("session stopped during replay")?;
        }

        let requested = stream.take_tool_calls();
        if !requested.is_empty() {
            info!(
                line = number + 1,
                tools = ?requested.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "model requested tool calls"
            );
        }
    }

    let snapshot = session.close().await.context("failed to close session")?;
    drop(session);
    printer.await.context("snapshot printer failed")?;

    if !each {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?
        );
    }
    Ok(())
}

fn read_recording(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read recording from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with an environment filter.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
