// src/capture/file.rs

//! Redirect the child's output into `<stem>.out` / `<stem>.err` files.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace, warn};

use crate::capture::naming::find_next_stem;
use crate::capture::{OutputCapture, StdioSet};
use crate::errors::{Result, RunnerError};
use crate::exec::LaunchRequest;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::LogFilePair;

pub const STDOUT_EXTENSION: &str = "out";
pub const STDERR_EXTENSION: &str = "err";

#[derive(Debug)]
pub struct FileCapture {
    fs: Arc<dyn FileSystem>,
    log_dir: PathBuf,
    prefix: Option<String>,
    files: Mutex<Option<LogFilePair>>,
}

impl FileCapture {
    /// Capture into `log_dir`, creating it if absent.
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_fs(Arc::new(RealFileSystem), log_dir)
    }

    pub fn with_fs(fs: Arc<dyn FileSystem>, log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = std::path::absolute(log_dir.as_ref())?;
        if !fs.exists(&log_dir) {
            fs.create_dir_all(&log_dir).map_err(|e| {
                RunnerError::config(format!("cannot create log directory {log_dir:?}: {e:#}"))
            })?;
        }
        Ok(Self {
            fs,
            log_dir,
            prefix: None,
            files: Mutex::new(None),
        })
    }

    /// Use `prefix` instead of the executable name for log file stems.
    /// An empty prefix means "use the default".
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// The files chosen for the most recent launch, if any.
    pub fn files(&self) -> Option<LogFilePair> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_files(&self, pair: LogFilePair) {
        *self.files.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair);
    }

    /// Pick the stem for the next launch of `request`.
    pub fn next_stem(&self, request: &LaunchRequest) -> Result<String> {
        let prefix = match (&self.prefix, &request.exec_name) {
            (Some(p), _) => p.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => return Err(RunnerError::config("exec command is null or empty")),
        };
        Ok(find_next_stem(
            self.fs.as_ref(),
            &self.log_dir,
            &prefix,
            &[STDOUT_EXTENSION, STDERR_EXTENSION],
        ))
    }

    fn create(&self, path: &Path) -> Result<File> {
        self.fs.create_file(path).map_err(|e| {
            RunnerError::Io(Arc::new(std::io::Error::other(format!("{e:#}"))))
        })
    }

    /// Delete the files of the most recent launch, best effort.
    ///
    /// Returns `true` only if every file that was chosen got removed.
    pub fn delete_files(&self) -> bool {
        let Some(pair) = self.files() else {
            return true;
        };
        let mut all_deleted = true;
        for path in [pair.stderr.as_deref(), Some(pair.stdout.as_path())]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.fs.remove_file(path) {
                warn!(path = ?path, error = %e, "failed to delete log file");
                all_deleted = false;
            }
        }
        all_deleted
    }
}

impl OutputCapture for FileCapture {
    fn prepare(&self, request: &LaunchRequest) -> Result<StdioSet> {
        trace!(cmd = %request.program(), log_dir = ?self.log_dir, "configuring log files");
        let stem = self.next_stem(request)?;

        let stdout_path = self.log_dir.join(format!("{stem}.{STDOUT_EXTENSION}"));
        let stdout = self.create(&stdout_path)?;
        debug!(path = ?stdout_path, "redirecting stdout to file");

        let (stderr, stderr_path) = if request.join_streams {
            debug!("joining stderr with stdout");
            (Stdio::from(stdout.try_clone()?), None)
        } else {
            let path = self.log_dir.join(format!("{stem}.{STDERR_EXTENSION}"));
            let file = self.create(&path)?;
            debug!(path = ?path, "redirecting stderr to file");
            (Stdio::from(file), Some(path))
        };

        self.set_files(LogFilePair {
            stdout: stdout_path,
            stderr: stderr_path,
        });

        Ok(StdioSet {
            stdin: Stdio::null(),
            stdout: Stdio::from(stdout),
            stderr,
        })
    }
}
