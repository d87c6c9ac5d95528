use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

/// Upper bound on process creation attempts per run iteration.
pub const MAX_FORK_RETRIES: u32 = 3;

/// Sentinel stored as the exit code until the process has actually exited.
pub const EXIT_CODE_UNSET: i32 = -1;

/// The command to run: argument vector, working directory, environment
/// overrides merged into the inherited environment, and whether to wrap the
/// whole line in the platform shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub shell: bool,
}

impl CommandSpec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Build from a single command line split on whitespace.
    pub fn parse(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Basename of the executable, cut at its first `.` (`/usr/bin/run.sh`
    /// gives `run`). Names starting with a dot are kept whole.
    pub fn exec_name(&self) -> Option<String> {
        let program = self.program()?;
        let base = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());
        match base.find('.') {
            Some(pos) if pos > 0 => Some(base[..pos].to_string()),
            _ => Some(base),
        }
    }
}

/// Fork-retry bound and restart-on-exit-code policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    fork_retries: u32,
    restart_exit_code: i32,
}

impl RetryPolicy {
    /// `fork_retries` is clamped to `1..=MAX_FORK_RETRIES`;
    /// `restart_exit_code == 0` disables restarts.
    pub fn new(fork_retries: u32, restart_exit_code: i32) -> Self {
        let clamped = fork_retries.clamp(1, MAX_FORK_RETRIES);
        if clamped != fork_retries {
            warn!(
                requested = fork_retries,
                effective = clamped,
                "fork retries out of range; clamped"
            );
        }
        Self {
            fork_retries: clamped,
            restart_exit_code,
        }
    }

    pub fn fork_retries(&self) -> u32 {
        self.fork_retries
    }

    pub fn restart_exit_code(&self) -> i32 {
        self.restart_exit_code
    }

    /// Whether an iteration that exited with `exit_code` should run again.
    pub fn should_restart(&self, exit_code: i32) -> bool {
        self.restart_exit_code != 0 && exit_code == self.restart_exit_code
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            fork_retries: 1,
            restart_exit_code: 0,
        }
    }
}

/// Lifecycle of one run iteration. A restart goes back through `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Finished,
}

impl RunState {
    /// A launch is in progress or the process is alive.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Starting | RunState::Running)
    }
}

/// Where the captured output of one run lives. `stderr` is `None` when
/// stderr is joined into stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilePair {
    pub stdout: PathBuf,
    pub stderr: Option<PathBuf>,
}

impl LogFilePair {
    pub fn stderr_or_stdout(&self) -> &Path {
        self.stderr.as_deref().unwrap_or(&self.stdout)
    }
}

/// Destination of the child's stdout/stderr.
///
/// - `File`: redirect into `<stem>.out` / `<stem>.err` under a log directory.
/// - `Pipe`: keep live pipes that callers can take and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    File,
    Pipe,
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StreamMode::File),
            "pipe" => Ok(StreamMode::Pipe),
            other => Err(format!(
                "invalid output mode: {other} (expected \"file\" or \"pipe\")"
            )),
        }
    }
}
