// src/capture/pipe.rs

//! Keep the child's stdio as live pipes.
//!
//! Pipes are parked here right after spawn and handed out once to whoever
//! asks first. When the iteration closes, an untaken stdin is dropped so the
//! child sees EOF; untaken output readers stay parked until the next launch
//! so output buffered before exit can still be read.
//! Nothing drains the pipes on the caller's behalf, so a child producing
//! more output than the pipe buffer holds blocks until someone reads it.

use std::io::PipeReader as OsPipeReader;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr, ChildStdin};
use tracing::{debug, trace, warn};

use crate::capture::{OutputCapture, StdioSet};
use crate::errors::Result;
use crate::exec::LaunchRequest;

/// Buffer size of the bridge used when the merged pipe cannot be polled
/// natively.
pub const STREAM_BUFFER_SIZE: usize = 10_000;

/// A readable child output stream: the raw stdout pipe, or the single pipe
/// shared by stdout and stderr when streams are joined.
pub type PipeReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Default)]
struct Slots {
    joined: bool,
    /// Read end of the shared pipe, between `prepare` and `attach`.
    merged: Option<OsPipeReader>,
    stdin: Option<ChildStdin>,
    stdout: Option<PipeReader>,
    stderr: Option<ChildStderr>,
}

#[derive(Default)]
pub struct PipeCapture {
    slots: Mutex<Slots>,
}

impl std::fmt::Debug for PipeCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.lock();
        f.debug_struct("PipeCapture")
            .field("joined", &slots.joined)
            .field("stdin", &slots.stdin.is_some())
            .field("stdout", &slots.stdout.is_some())
            .field("stderr", &slots.stderr.is_some())
            .finish()
    }
}

impl PipeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the current iteration merges stderr into stdout.
    pub fn is_joined(&self) -> bool {
        self.lock().joined
    }

    pub fn take_stdin(&self) -> Option<ChildStdin> {
        self.lock().stdin.take()
    }

    pub fn take_stdout(&self) -> Option<PipeReader> {
        self.lock().stdout.take()
    }

    /// Always `None` in joined mode; stderr arrives through stdout then.
    pub fn take_stderr(&self) -> Option<ChildStderr> {
        self.lock().stderr.take()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputCapture for PipeCapture {
    fn prepare(&self, request: &LaunchRequest) -> Result<StdioSet> {
        debug!(cmd = %request.program(), "log files disabled; exposing live pipes");
        let mut slots = self.lock();
        *slots = Slots {
            joined: request.join_streams,
            ..Slots::default()
        };
        if !request.join_streams {
            return Ok(StdioSet::piped());
        }

        // One pipe, written by both descriptors, keeps the child's write order.
        let (reader, writer) = std::io::pipe()?;
        let stderr = writer.try_clone()?;
        slots.merged = Some(reader);
        debug!("joining stderr with stdout on one pipe");
        Ok(StdioSet {
            stdin: Stdio::piped(),
            stdout: Stdio::from(writer),
            stderr: Stdio::from(stderr),
        })
    }

    fn attach(&self, child: &mut Child) {
        let mut slots = self.lock();
        slots.stdin = child.stdin.take();

        if let Some(reader) = slots.merged.take() {
            match async_reader(reader) {
                Ok(reader) => slots.stdout = Some(reader),
                Err(e) => warn!(error = %e, "cannot read merged output pipe"),
            }
            return;
        }
        slots.stdout = child.stdout.take().map(|o| Box::new(o) as PipeReader);
        slots.stderr = child.stderr.take();
    }

    fn close(&self) {
        let mut slots = self.lock();
        slots.merged = None;
        if slots.stdin.take().is_some() {
            trace!("closing untaken stdin pipe");
        }
    }
}

#[cfg(unix)]
fn async_reader(reader: OsPipeReader) -> std::io::Result<PipeReader> {
    use std::os::fd::OwnedFd;
    use tokio::net::unix::pipe::Receiver;

    let receiver = Receiver::from_owned_fd(OwnedFd::from(reader))?;
    Ok(Box::new(receiver))
}

/// Without a pollable pipe type, bridge the blocking reader into a duplex
/// stream from a blocking thread.
#[cfg(not(unix))]
fn async_reader(mut reader: OsPipeReader) -> std::io::Result<PipeReader> {
    use std::io::Read;
    use tokio::io::AsyncWriteExt;

    let (async_side, mut sink) = tokio::io::duplex(STREAM_BUFFER_SIZE);
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; 4096];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let chunk = buf.get(..n).unwrap_or_default();
            if handle.block_on(sink.write_all(chunk)).is_err() {
                trace!("merged stream reader dropped; stopping bridge");
                return;
            }
        }
        let _ = handle.block_on(sink.shutdown());
    });
    Ok(Box::new(async_side))
}
