// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::runner::RunnerConfig;
use crate::types::StreamMode;

/// A run file as read from TOML, before validation.
///
/// ```toml
/// [command]
/// args = ["java", "-version"]
/// join_streams = true
///
/// [policy]
/// fork_retries = 3
///
/// [output]
/// mode = "file"
/// log_dir = "logs"
///
/// [wait]
/// timeout = "10s"
/// ```
///
/// All sections are optional; command-line flags can fill in the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRunFile {
    #[serde(default)]
    pub command: CommandSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub wait: WaitSection,
}

/// `[command]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandSection {
    /// Program followed by its arguments.
    pub args: Option<Vec<String>>,

    /// Whole command as one whitespace-separated line; alternative to `args`.
    pub line: Option<String>,

    pub cwd: Option<PathBuf>,

    /// Run the command through the platform shell.
    #[serde(default)]
    pub shell: bool,

    /// Send stderr to the same destination as stdout.
    #[serde(default)]
    pub join_streams: bool,

    /// Extra environment variables, on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[policy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_fork_retries")]
    pub fork_retries: u32,

    /// Exit code that triggers a relaunch; 0 disables restarts.
    #[serde(default)]
    pub restart_exit_code: i32,
}

fn default_fork_retries() -> u32 {
    1
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            fork_retries: default_fork_retries(),
            restart_exit_code: 0,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSection {
    #[serde(default)]
    pub mode: StreamMode,

    /// Directory for `.out` / `.err` files. Required in file mode.
    pub log_dir: Option<PathBuf>,

    /// Log file stem prefix; defaults to the executable name.
    pub prefix: Option<String>,
}

/// `[wait]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitSection {
    /// How long the binary waits for the run before stopping it,
    /// e.g. `"500ms"`, `"10s"`, `"2m"`. Unbounded if absent.
    pub timeout: Option<String>,
}

/// A validated run file. Build one with `RunFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct RunFile {
    pub runner: RunnerConfig,
    pub timeout: Option<Duration>,
}

impl RunFile {
    pub fn into_runner_config(self) -> RunnerConfig {
        self.runner
    }
}
