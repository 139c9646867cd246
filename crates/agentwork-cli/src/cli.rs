//! CLI argument definitions for AgentWork.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use agentwork_stream::ProviderKind;
use clap::{Parser, Subcommand};

/// AgentWork -- function-calling decisions and agent stream normalization.
#[derive(Parser)]
#[command(
    name = "agentwork",
    version,
    about = "AgentWork -- function-calling decisions and agent stream normalization",
    long_about = "Decides whether a chat turn needs tool definitions and which model tier \
                  serves it, and replays recorded provider streams through the agent state \
                  machine."
)]
pub struct Cli {
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decide tool inclusion and model tier for one message.
    Decide {
        /// The user message.
        #[arg(long, short)]
        message: String,

        /// Number of tools available to the turn.
        #[arg(long, default_value_t = 0)]
        tools: usize,

        /// Cost/capability slider position (0-100).
        #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
        slider: u8,

        /// SQLite database holding the `system_configuration` table.
        #[arg(long, conflicts_with = "config")]
        db: Option<PathBuf>,

        /// TOML file with a `[function_calling]` section.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Replay a recorded stream through the agent state machine.
    Replay {
        /// Wire format of the recording.
        #[arg(long, default_value = "canonical")]
        provider: ProviderKind,

        /// Print every snapshot, not just the final one.
        #[arg(long)]
        each: bool,

        /// Recording to replay, one line per event or SSE line (`-` for stdin).
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn slider_out_of_range_is_rejected() {
        let result = Cli::try_parse_from(["agentwork", "decide", "-m", "hi", "--slider", "101"]);
        assert!(result.is_err());
    }

    #[test]
    fn replay_parses_provider() {
        let cli =
            Cli::try_parse_from(["agentwork", "replay", "--provider", "openai", "rec.sse"]).unwrap();
        match cli.command {
            Commands::Replay { provider, each, .. } => {
                assert_eq!(provider, ProviderKind::OpenAi);
                assert!(!each);
            }
            Commands::Decide { .. } => panic!("expected replay"),
        }
    }
}
