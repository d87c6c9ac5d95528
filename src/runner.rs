// src/runner.rs

//! `Runner`: a process controller bundled with one of the two built-in
//! capture strategies, plus the output accessors that only make sense for
//! that strategy.
//!
//! File accessors on a pipe-mode runner, and pipe accessors on a file-mode
//! runner, fail with `RunnerError::Configuration`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin};
use tracing::{debug, warn};

use crate::capture::{FileCapture, OutputCapture, PipeCapture, PipeReader};
use crate::errors::{Result, RunnerError};
use crate::exec::{ControllerConfig, ProcessController};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{CommandSpec, LogFilePair, RetryPolicy, RunState, StreamMode};

/// Complete description of a run.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub command: CommandSpec,
    pub join_streams: bool,
    pub policy: RetryPolicy,
    pub mode: StreamMode,
    /// Required in file mode.
    pub log_dir: Option<PathBuf>,
    /// Log file stem prefix; defaults to the executable name.
    pub log_prefix: Option<String>,
}

#[derive(Debug, Clone)]
enum Capture {
    File(Arc<FileCapture>),
    Pipe(Arc<PipeCapture>),
}

pub struct Runner {
    controller: ProcessController,
    capture: Capture,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        Self::with_fs(config, Arc::new(RealFileSystem))
    }

    pub fn with_fs(config: RunnerConfig, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let capture = match config.mode {
            StreamMode::File => {
                let log_dir = config
                    .log_dir
                    .as_ref()
                    .ok_or_else(|| RunnerError::config("file output requires a log directory"))?;
                let mut file = FileCapture::with_fs(fs, log_dir)?;
                if let Some(prefix) = &config.log_prefix {
                    file = file.prefix(prefix.clone());
                }
                Capture::File(Arc::new(file))
            }
            StreamMode::Pipe => Capture::Pipe(Arc::new(PipeCapture::new())),
        };

        let hooks: Arc<dyn OutputCapture> = match &capture {
            Capture::File(f) => Arc::clone(f) as Arc<dyn OutputCapture>,
            Capture::Pipe(p) => Arc::clone(p) as Arc<dyn OutputCapture>,
        };
        let mut controller = ProcessController::new(hooks);
        controller.configure(ControllerConfig {
            command: config.command,
            join_streams: config.join_streams,
            policy: config.policy,
        });

        Ok(Self {
            controller,
            capture,
        })
    }

    pub fn controller(&self) -> &ProcessController {
        &self.controller
    }

    pub fn mode(&self) -> StreamMode {
        match self.capture {
            Capture::File(_) => StreamMode::File,
            Capture::Pipe(_) => StreamMode::Pipe,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.controller.config().join_streams
    }

    pub fn start(&self) -> Result<()> {
        self.controller.start()
    }

    pub async fn stop(&self) -> Result<()> {
        self.controller.stop().await
    }

    pub async fn join(&self) {
        self.controller.join().await
    }

    pub async fn wait_started(&self, timeout: Option<Duration>) -> Result<()> {
        self.controller.wait_started(timeout).await
    }

    pub async fn wait_finished(&self, timeout: Option<Duration>) -> Result<i32> {
        self.controller.wait_finished(timeout).await
    }

    pub async fn exit_code(&self) -> Result<i32> {
        self.controller.exit_code().await
    }

    pub fn is_started(&self) -> bool {
        self.controller.is_started()
    }

    pub fn is_finished(&self) -> bool {
        self.controller.is_finished()
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    pub fn state(&self) -> RunState {
        self.controller.state()
    }

    pub fn last_error(&self) -> Option<RunnerError> {
        self.controller.last_error()
    }

    pub fn duration(&self) -> Duration {
        self.controller.duration()
    }

    // ---- file mode ----------------------------------------------------------

    fn file_capture(&self) -> Result<&FileCapture> {
        match &self.capture {
            Capture::File(f) => Ok(f),
            Capture::Pipe(_) => Err(RunnerError::config(
                "process streams are live pipes; no recorded log files",
            )),
        }
    }

    /// The log files chosen for the most recent launch.
    pub fn log_files(&self) -> Result<LogFilePair> {
        self.file_capture()?
            .files()
            .ok_or_else(|| RunnerError::NotStarted("no log files have been chosen yet".to_string()))
    }

    pub fn stdout_path(&self) -> Result<PathBuf> {
        Ok(self.log_files()?.stdout)
    }

    /// Same as [`Runner::stdout_path`] when streams are joined.
    pub fn stderr_path(&self) -> Result<PathBuf> {
        Ok(self.log_files()?.stderr_or_stdout().to_path_buf())
    }

    /// Full contents of the recorded stdout file.
    pub fn recorded_stdout(&self) -> Result<String> {
        self.read_recorded(&self.stdout_path()?)
    }

    /// Full contents of the recorded stderr file (the stdout file if joined).
    pub fn recorded_stderr(&self) -> Result<String> {
        self.read_recorded(&self.stderr_path()?)
    }

    pub fn recorded_stdout_lines(&self) -> Result<Vec<String>> {
        Ok(self.recorded_stdout()?.lines().map(str::to_string).collect())
    }

    pub fn recorded_stderr_lines(&self) -> Result<Vec<String>> {
        Ok(self.recorded_stderr()?.lines().map(str::to_string).collect())
    }

    fn read_recorded(&self, path: &Path) -> Result<String> {
        let file = self.file_capture()?;
        self.verify_recorded(file, path)?;
        let bytes = file.fs().read(path).map_err(|e| {
            RunnerError::Io(Arc::new(io::Error::other(format!("{e:#}"))))
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads are only allowed once the process started and the file exists;
    /// reading before it finished works but may see partial output.
    fn verify_recorded(&self, file: &FileCapture, path: &Path) -> Result<()> {
        if !self.controller.is_started() {
            return Err(RunnerError::NotStarted(format!(
                "attempting to read from file {path:?} before process started"
            )));
        }
        if !file.fs().exists(path) {
            return Err(RunnerError::MissingLog {
                path: path.to_path_buf(),
            });
        }
        if !self.controller.is_finished() {
            warn!(path = ?path, "reading from file before process is finished");
        }
        Ok(())
    }

    /// Remove the recorded log files.
    ///
    /// Fails while the run is in flight, including the gap between restart
    /// iterations; otherwise returns whether every
    /// file was deleted. Not atomic: one file may go while the other stays.
    pub fn delete_logs(&self) -> Result<bool> {
        let file = self.file_capture()?;
        if self.controller.is_in_flight() || self.controller.state().is_active() {
            return Err(RunnerError::config(
                "cannot delete logs while process is still running",
            ));
        }
        Ok(file.delete_files())
    }

    // ---- pipe mode ----------------------------------------------------------

    fn pipe_capture(&self, stream: &str) -> Result<&PipeCapture> {
        match &self.capture {
            Capture::Pipe(p) => Ok(p),
            Capture::File(_) => Err(RunnerError::config(format!(
                "process streams are redirected to file; cannot get {stream} stream"
            ))),
        }
    }

    /// Wait for the process to start, then hand out a parked pipe.
    ///
    /// Output readers are still handed out after the process finished as
    /// long as nobody took them; stdin is not.
    async fn take_pipe<T>(
        &self,
        timeout: Option<Duration>,
        stream: &str,
        take: impl FnOnce(&PipeCapture) -> Option<T>,
        usable_after_exit: bool,
    ) -> Result<T> {
        let pipes = self.pipe_capture(stream)?;
        self.controller.wait_started(timeout).await?;
        let finished = self.controller.is_finished();
        if finished && !usable_after_exit {
            return Err(RunnerError::AlreadyFinished);
        }
        match take(pipes) {
            Some(pipe) => Ok(pipe),
            None if finished => Err(RunnerError::AlreadyFinished),
            None => Err(RunnerError::config(format!("{stream} pipe was already taken"))),
        }
    }

    /// Writer end of the child's stdin. Dropping it closes the stream.
    pub async fn take_stdin(&self, timeout: Option<Duration>) -> Result<ChildStdin> {
        self.take_pipe(timeout, "stdin", PipeCapture::take_stdin, false)
            .await
    }

    /// Reader for the child's stdout, merged with stderr if streams are joined.
    pub async fn take_stdout(&self, timeout: Option<Duration>) -> Result<PipeReader> {
        self.take_pipe(timeout, "stdout", PipeCapture::take_stdout, true)
            .await
    }

    pub async fn take_stderr(&self, timeout: Option<Duration>) -> Result<ChildStderr> {
        self.pipe_capture("stderr")?;
        if self.is_joined() {
            return Err(RunnerError::config(
                "stderr is joined with stdout; read it from the stdout stream",
            ));
        }
        self.take_pipe(timeout, "stderr", PipeCapture::take_stderr, true)
            .await
    }

    /// Read the child's stdout to EOF and return it line by line.
    pub async fn command_output(&self, timeout: Option<Duration>) -> Result<Vec<String>> {
        let stdout = self.take_stdout(timeout).await?;
        let mut lines = BufReader::new(stdout).lines();
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await? {
            out.push(line);
        }
        debug!(lines = out.len(), "collected command output");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(dir: &Path) -> RunnerConfig {
        RunnerConfig {
            command: CommandSpec::new(["echo", "hi"]),
            log_dir: Some(dir.to_path_buf()),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn file_mode_without_log_dir_is_rejected() {
        let cfg = RunnerConfig {
            command: CommandSpec::new(["echo"]),
            ..RunnerConfig::default()
        };
        assert!(matches!(Runner::new(cfg), Err(RunnerError::Configuration(_))));
    }

    #[tokio::test]
    async fn pipe_accessors_fail_in_file_mode() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new(file_config(dir.path())).unwrap();
        let t = Some(Duration::from_millis(10));

        assert!(matches!(runner.take_stdout(t).await, Err(RunnerError::Configuration(_))));
        assert!(matches!(runner.take_stderr(t).await, Err(RunnerError::Configuration(_))));
        assert!(matches!(runner.take_stdin(t).await, Err(RunnerError::Configuration(_))));
    }

    #[test]
    fn file_accessors_fail_in_pipe_mode() {
        let runner = Runner::new(RunnerConfig {
            command: CommandSpec::new(["echo"]),
            mode: StreamMode::Pipe,
            ..RunnerConfig::default()
        })
        .unwrap();

        assert!(matches!(runner.stdout_path(), Err(RunnerError::Configuration(_))));
        assert!(matches!(runner.recorded_stderr(), Err(RunnerError::Configuration(_))));
        assert!(matches!(runner.delete_logs(), Err(RunnerError::Configuration(_))));
    }

    #[test]
    fn recorded_output_before_start_is_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new(file_config(dir.path())).unwrap();
        assert!(matches!(runner.recorded_stdout(), Err(RunnerError::NotStarted(_))));
    }
}
