//! CLI argument structures and parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config_cmd::ConfigCli;
use crate::list_cmd::ListCli;
use crate::publish_cmd::PublishCli;
use crate::run_cmd::RunCli;

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// githooks - run Git hooks from per-stage directories and publish branches
#[derive(Debug, Parser)]
#[command(name = "githooks")]
#[command(author, version)]
#[command(about = "Polyglot Git hook dispatcher and resilient branch publisher", long_about = None)]
pub struct Cli {
    /// Configuration file (default: .githooks/githooks.toml, then ~/.githooks/config.toml)
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (same as --log-level debug)
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Enable trace-level logging for debugging
    #[arg(long = "trace", global = true)]
    pub trace: bool,

    /// Log level for diagnostics written to stderr [default: warn]
    #[arg(long = "log-level", global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective log level: `--trace` > `-v` > `--log-level` > `GITHOOKS_LOG_LEVEL` > warn.
    pub fn effective_log_level(&self, env_level: Option<&str>) -> LogLevel {
        if self.trace {
            LogLevel::Trace
        } else if self.verbose {
            LogLevel::Debug
        } else if let Some(level) = self.log_level {
            level
        } else {
            env_level
                .and_then(LogLevel::from_str_loose)
                .unwrap_or_default()
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run every hook of a stage
    Run(RunCli),

    /// List the hooks of a stage
    #[command(visible_alias = "ls")]
    List(ListCli),

    /// Create a branch if needed and push it, retrying transient failures
    Publish(PublishCli),

    /// Show the effective configuration
    Config(ConfigCli),
}
