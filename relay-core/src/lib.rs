//! Relay core library: record types, record stores, configuration, errors.
//!
//! - [`types`]: newtypes and the [`Employee`] record
//! - [`store`]: the [`RecordStore`] contract plus memory and file backends
//! - [`config`]: [`RelayConfig`] load / save
//! - [`error`]: [`StoreError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::RelayConfig;
pub use error::{ConfigError, StoreError};
pub use store::{FileStore, MemoryStore, RecordStore};
pub use types::{Employee, NewEmployee, RecordId};
