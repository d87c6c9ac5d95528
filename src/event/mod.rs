// src/event/mod.rs

//! Cross-task signalling used to observe "process started" / "process
//! finished" without polling.

pub mod sync_event;

pub use sync_event::SyncEvent;
