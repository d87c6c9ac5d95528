// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every flag is an override: values from `--config` are read first and the
//! flags given on the command line replace them.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::model::RawRunFile;
use crate::types::StreamMode;

/// Command-line arguments for `runexternal`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "runexternal",
    version,
    about = "Run an external command with log capture, fork retries and restart-on-exit-code.",
    long_about = None
)]
pub struct CliArgs {
    /// Run file (TOML) to read defaults from.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for the `.out` / `.err` log files.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file stem prefix (default: executable name).
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Relay live output instead of writing log files.
    #[arg(long)]
    pub pipe: bool,

    /// Send stderr to the same destination as stdout.
    #[arg(long)]
    pub join: bool,

    /// Run the command through the platform shell.
    #[arg(long)]
    pub shell: bool,

    /// Working directory of the child.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the child, as `KEY=VALUE`. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Process creation attempts per launch (1 to 3).
    #[arg(long, value_name = "N")]
    pub fork_retries: Option<u32>,

    /// Relaunch while the command exits with this code (0 disables).
    #[arg(long, value_name = "CODE", allow_negative_numbers = true)]
    pub restart_code: Option<i32>,

    /// Stop the command if the run takes longer than this (e.g. `30s`, `5m`).
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Remove the log files once the run is over.
    #[arg(long)]
    pub delete_logs: bool,

    /// Parse + validate, print the resolved run, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNEXTERNAL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// The command to run, after `--`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    /// Overlay the flags that were given onto `raw`.
    pub fn apply_to(&self, raw: &mut RawRunFile) {
        let cmd = &mut raw.command;
        if !self.command.is_empty() {
            cmd.args = Some(self.command.clone());
            cmd.line = None;
        }
        if let Some(cwd) = &self.cwd {
            cmd.cwd = Some(cwd.clone());
        }
        cmd.env.extend(self.env.iter().cloned());
        cmd.shell |= self.shell;
        cmd.join_streams |= self.join;

        if let Some(n) = self.fork_retries {
            raw.policy.fork_retries = n;
        }
        if let Some(code) = self.restart_code {
            raw.policy.restart_exit_code = code;
        }

        if self.pipe {
            raw.output.mode = StreamMode::Pipe;
        }
        if let Some(dir) = &self.log_dir {
            raw.output.log_dir = Some(dir.clone());
        }
        if let Some(prefix) = &self.prefix {
            raw.output.prefix = Some(prefix.clone());
        }

        if let Some(timeout) = &self.timeout {
            raw.wait.timeout = Some(timeout.clone());
        }
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
