//! Event publisher: fire-and-forget handoff to a broker client.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use relay_core::config::TopicsConfig;
use relay_core::{Employee, RelayConfig};

use crate::broker::{BrokerClient, BrokerRecord};
use crate::error::BrokerError;
use crate::event::{routing_key, EmployeeEvent, EventKind};

/// What happened at enqueue time. Delivery is only ever logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Broker accepted the event; delivery is in flight.
    Enqueued { event_id: Uuid, key: String },
    /// Event never reached the broker.
    Rejected { reason: String },
}

impl PublishOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, PublishOutcome::Enqueued { .. })
    }
}

pub struct EventPublisher {
    broker: Arc<dyn BrokerClient>,
    topics: TopicsConfig,
    source_service: String,
    send_timeout: Duration,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerClient>, config: &RelayConfig) -> Self {
        Self {
            broker,
            topics: config.broker.topics.clone(),
            source_service: config.service_name.clone(),
            send_timeout: config.send_timeout(),
        }
    }

    /// Send a "created" event to the single-entity topic.
    pub fn publish_created(&self, employee: &Employee) -> PublishOutcome {
        self.publish(employee, EventKind::EmployeeCreated, &self.topics.created.name)
    }

    /// Send a "bulk-sync" event to the drain-loop topic.
    pub fn publish_bulk_sync(&self, employee: &Employee) -> PublishOutcome {
        self.publish(employee, EventKind::EmployeeBulkSync, &self.topics.bulk_sync.name)
    }

    /// Build, key, and enqueue one event on `topic`.
    ///
    /// Never blocks on delivery and never fails: a refused enqueue is logged
    /// and reported as [`PublishOutcome::Rejected`]; the delivery result is
    /// logged by a detached task.
    pub fn publish(&self, employee: &Employee, kind: EventKind, topic: &str) -> PublishOutcome {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.rejected(employee, kind, "no async runtime to track delivery".to_string());
        };

        let event = EmployeeEvent::new(employee, kind, &self.source_service);
        let payload = match event.to_bytes() {
            Ok(payload) => payload,
            Err(err) => return self.rejected(employee, kind, BrokerError::from(err).to_string()),
        };
        let key = routing_key(&employee.department);

        let handle = match self.broker.send(BrokerRecord {
            topic: topic.to_string(),
            key: key.clone(),
            payload,
        }) {
            Ok(handle) => handle,
            Err(err) => return self.rejected(employee, kind, err.to_string()),
        };

        let record_id = employee.id;
        let event_id = event.event_id;
        let timeout = self.send_timeout;
        runtime.spawn(async move {
            match tokio::time::timeout(timeout, handle.wait()).await {
                Ok(Ok(receipt)) => tracing::info!(
                    event_type = %kind,
                    record_id = %record_id,
                    %event_id,
                    topic = %receipt.topic,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "event delivered",
                ),
                Ok(Err(err)) => tracing::error!(
                    event_type = %kind,
                    record_id = %record_id,
                    %event_id,
                    error = %err,
                    "event delivery failed",
                ),
                Err(_) => tracing::error!(
                    event_type = %kind,
                    record_id = %record_id,
                    %event_id,
                    error = %BrokerError::Timeout(timeout.as_millis()),
                    "event delivery failed",
                ),
            }
        });

        PublishOutcome::Enqueued { event_id, key }
    }

    fn rejected(&self, employee: &Employee, kind: EventKind, reason: String) -> PublishOutcome {
        tracing::error!(
            event_type = %kind,
            record_id = %employee.id,
            error = %reason,
            "event not enqueued",
        );
        PublishOutcome::Rejected { reason }
    }
}
