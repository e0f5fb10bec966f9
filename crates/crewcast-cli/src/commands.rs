//! CLI commands

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Crewcast - real-time event broadcast hub
#[derive(Parser, Debug)]
#[command(name = "crewcast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to crewcast.* in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the hub: WebSocket stream plus HTTP publish endpoint
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Log filter, e.g. "debug" or "crewcast=trace"
        #[arg(long)]
        log_level: Option<String>,

        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,

        /// Mirror every published event into the log
        #[arg(long)]
        log_events: bool,
    },

    /// Publish a single event to a running hub
    Emit {
        /// Base URL of the hub
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,

        /// Event kind (agent_thought, tool_usage, task_update, error, success, ...)
        #[arg(short, long)]
        kind: String,

        /// Event content
        #[arg(long)]
        content: String,

        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,

        /// Bearer token, when the hub requires one
        #[arg(long)]
        token: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
}
