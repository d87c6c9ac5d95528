// src/capture/mod.rs

//! Where a child's stdio goes.
//!
//! The controller talks to an `OutputCapture` instead of deciding stdio
//! itself. Two implementations ship with the crate:
//!
//! - [`FileCapture`] redirects stdout/stderr into uniquely named log files.
//! - [`PipeCapture`] keeps live pipes that callers can take and read.
//!
//! Tests can provide their own implementation, e.g. one that rejects the
//! launch request or records which hooks were called.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Child;

use crate::errors::Result;
use crate::exec::LaunchRequest;

pub mod file;
pub mod naming;
pub mod pipe;

pub use file::FileCapture;
pub use naming::{MAX_UNIQUE_FILENAME, can_use_stem, find_next_stem};
pub use pipe::{PipeCapture, PipeReader};

/// Stdio handles for one launch.
#[derive(Debug)]
pub struct StdioSet {
    pub stdin: Stdio,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

impl StdioSet {
    pub fn null() -> Self {
        Self {
            stdin: Stdio::null(),
            stdout: Stdio::null(),
            stderr: Stdio::null(),
        }
    }

    pub fn piped() -> Self {
        Self {
            stdin: Stdio::piped(),
            stdout: Stdio::piped(),
            stderr: Stdio::piped(),
        }
    }
}

/// Hooks the background execution task calls around each launch.
///
/// Call order per iteration: `prepare` once, then (if a fork attempt
/// succeeded) `attach`, then after exit `drain`, and finally `close` on every
/// path that got past `prepare`.
pub trait OutputCapture: Send + Sync + Debug {
    /// Inspect the request and decide the child's stdio.
    ///
    /// Returning an error aborts the iteration before anything is spawned.
    fn prepare(&self, request: &LaunchRequest) -> Result<StdioSet>;

    /// Take ownership of whatever pipes the freshly spawned child exposes.
    fn attach(&self, _child: &mut Child) {}

    /// Finish consuming output after the process has exited.
    fn drain(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }

    /// Release stream resources held for the iteration.
    fn close(&self) {}
}
