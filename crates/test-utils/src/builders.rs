#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use runexternal::config::{RawRunFile, RunFile};
use runexternal::fs::FileSystem;
use runexternal::{CommandSpec, RetryPolicy, Runner, RunnerConfig, StreamMode};

/// Builder for `RunnerConfig` to simplify test setup.
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
    fork_retries: u32,
    restart_exit_code: i32,
}

impl RunnerConfigBuilder {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config: RunnerConfig {
                command: CommandSpec::new(args),
                ..RunnerConfig::default()
            },
            fork_retries: 1,
            restart_exit_code: 0,
        }
    }

    /// `sh -c <script>`, for tests that need a tiny shell program.
    pub fn shell_script(script: &str) -> Self {
        Self::new(["sh", "-c", script])
    }

    pub fn log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.mode = StreamMode::File;
        self.config.log_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.config.log_prefix = Some(prefix.to_string());
        self
    }

    pub fn pipe(mut self) -> Self {
        self.config.mode = StreamMode::Pipe;
        self
    }

    pub fn join_streams(mut self) -> Self {
        self.config.join_streams = true;
        self
    }

    /// Run the command through the platform shell.
    pub fn shell(mut self) -> Self {
        self.config.command = self.config.command.shell(true);
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.command = self.config.command.cwd(dir.as_ref());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.command = self.config.command.env(key, value);
        self
    }

    pub fn fork_retries(mut self, n: u32) -> Self {
        self.fork_retries = n;
        self
    }

    pub fn restart_on(mut self, exit_code: i32) -> Self {
        self.restart_exit_code = exit_code;
        self
    }

    pub fn build(mut self) -> RunnerConfig {
        self.config.policy = RetryPolicy::new(self.fork_retries, self.restart_exit_code);
        self.config
    }

    pub fn build_runner(self) -> Runner {
        Runner::new(self.build()).expect("Failed to build runner from builder")
    }

    pub fn build_runner_with_fs(self, fs: Arc<dyn FileSystem>) -> Runner {
        Runner::with_fs(self.build(), fs).expect("Failed to build runner from builder")
    }
}

/// Builder for `RunFile`, going through the same validation as a TOML file.
pub struct RunFileBuilder {
    raw: RawRunFile,
}

impl RunFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawRunFile::default(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.raw.command.args = Some(args.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn line(mut self, line: &str) -> Self {
        self.raw.command.line = Some(line.to_string());
        self
    }

    pub fn log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.raw.output.log_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn pipe(mut self) -> Self {
        self.raw.output.mode = StreamMode::Pipe;
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.raw.wait.timeout = Some(timeout.to_string());
        self
    }

    pub fn raw(self) -> RawRunFile {
        self.raw
    }

    pub fn build(self) -> RunFile {
        RunFile::try_from(self.raw).expect("Failed to build valid run file from builder")
    }
}

impl Default for RunFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
