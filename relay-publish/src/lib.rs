//! # relay-publish
//!
//! Turns records into broker events and hands them off without waiting.
//!
//! [`EventPublisher::publish`] builds an [`EmployeeEvent`], derives its
//! routing key from the department, enqueues it on a [`BrokerClient`], and
//! logs the delivery result from a detached task. Publishing never returns
//! an error: a send the broker refuses at enqueue comes back as
//! [`PublishOutcome::Rejected`], everything after enqueue is only logged.

pub mod broker;
pub mod error;
pub mod event;
pub mod publisher;
pub mod spool;

pub use broker::{BrokerClient, BrokerRecord, DeliveryHandle, DeliveryReceipt, MemoryBroker};
pub use error::BrokerError;
pub use event::{routing_key, EmployeeEvent, EmployeePayload, EventKind};
pub use publisher::{EventPublisher, PublishOutcome};
pub use spool::SpoolBroker;
