//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    // Format: "0.1.0 (abc1234, 2026-01-29)"
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// jarvisctl - lifecycle control for a Jarvis deployment
#[derive(Parser, Debug)]
#[command(name = "jarvisctl")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Deployment root (default: current directory)
    #[arg(short, long, env = "JARVIS_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the instance unless it is already running
    Start,

    /// Stop the tracked instance (SIGTERM, then SIGKILL after the grace period)
    Stop,

    /// Stop, then start
    Restart,

    /// Show whether the tracked instance is running
    Status,

    /// Stop, clean up leftover instances, start and verify
    RestartClean {
        /// Seconds to wait before stopping anything
        #[arg(long, default_value_t = 0)]
        delay: u64,

        /// Kill leftover instances instead of aborting
        #[arg(long)]
        force: bool,

        /// Describe every action without performing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Render a systemd service unit
    Unit {
        /// Write the unit to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run the service as this user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Launch, watch for a few seconds, then stop
    Smoke {
        /// Seconds the instance must stay alive
        #[arg(short, long, default_value_t = 5)]
        window: u64,
    },
}

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
