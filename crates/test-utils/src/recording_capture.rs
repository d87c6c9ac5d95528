use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use runexternal::errors::Result;
use runexternal::{LaunchRequest, OutputCapture, RunnerError, StdioSet};
use tokio::process::Child;

/// One hook invocation seen by [`RecordingCapture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Prepare(Vec<String>),
    Attach,
    Drain,
    Close,
}

/// A capture strategy that:
/// - records every hook call, in order
/// - discards the child's output (`Stdio::null()`)
/// - optionally rejects every launch request in `prepare`.
#[derive(Debug, Clone, Default)]
pub struct RecordingCapture {
    calls: Arc<Mutex<Vec<Hook>>>,
    reject: Option<String>,
}

impl RecordingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `prepare` with a configuration error carrying `reason`.
    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Hook> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, hook: fn(&Hook) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|h| hook(h)).count()
    }

    fn record(&self, hook: Hook) {
        self.calls.lock().unwrap().push(hook);
    }
}

impl OutputCapture for RecordingCapture {
    fn prepare(&self, request: &LaunchRequest) -> Result<StdioSet> {
        self.record(Hook::Prepare(request.argv.clone()));
        match &self.reject {
            Some(reason) => Err(RunnerError::Configuration(reason.clone())),
            None => Ok(StdioSet::null()),
        }
    }

    fn attach(&self, _child: &mut Child) {
        self.record(Hook::Attach);
    }

    fn drain(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.record(Hook::Drain);
        Box::pin(async {})
    }

    fn close(&self) {
        self.record(Hook::Close);
    }
}
