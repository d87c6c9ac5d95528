// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`controller`] owns the lifecycle of one external process: launch with
//!   fork retry, exit wait, restart on exit code, forced stop.
//! - [`request`] turns a `CommandSpec` into the concrete launch request.
//! - [`platform`] picks the shell used for shell-wrapped commands.

pub mod controller;
pub mod platform;
pub mod request;

pub use controller::{ControllerConfig, EXIT_CODE_GRACE, ProcessController};
pub use platform::Platform;
pub use request::LaunchRequest;
