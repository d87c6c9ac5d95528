// src/config/mod.rs

//! Run files: a TOML description of one command run.
//!
//! - `model.rs`: the serde data model.
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: turning a raw file into a checked [`RunFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{CommandSection, OutputSection, PolicySection, RawRunFile, RunFile, WaitSection};
pub use validate::parse_duration;
