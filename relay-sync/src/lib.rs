//! # relay-sync
//!
//! Bulk synchronization engine: drains unsynced records from a
//! [`relay_core::RecordStore`] into an [`relay_publish::EventPublisher`] and
//! flags them as synced, one run at a time.
//!
//! Build a [`SyncEngine`] once per process, drive it with
//! [`SyncEngine::run_scheduled`] from a timer and
//! [`SyncEngine::trigger_manual`] from operator commands, and observe it
//! through [`SyncEngine::status`].

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod status;

pub use engine::{EngineSettings, SyncEngine};
pub use error::{SyncError, TriggerError};
pub use status::{SyncJob, SyncStatus};
