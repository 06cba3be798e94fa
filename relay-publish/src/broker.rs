//! Broker client contract and the in-process broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;

use relay_core::config::TopicConfig;

use crate::error::BrokerError;

/// One message handed to a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Where a message landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// Pending delivery result of an accepted send.
#[derive(Debug)]
pub struct DeliveryHandle {
    rx: oneshot::Receiver<Result<DeliveryReceipt, BrokerError>>,
}

impl DeliveryHandle {
    /// Handle plus the sender the broker completes it through.
    pub fn pending() -> (oneshot::Sender<Result<DeliveryReceipt, BrokerError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Handle that is already complete.
    pub fn ready(result: Result<DeliveryReceipt, BrokerError>) -> Self {
        let (tx, handle) = Self::pending();
        let _ = tx.send(result);
        handle
    }

    /// Wait for the broker to report the outcome.
    ///
    /// A broker that drops the sender without answering reports `Closed`.
    pub async fn wait(self) -> Result<DeliveryReceipt, BrokerError> {
        self.rx.await.unwrap_or(Err(BrokerError::Closed))
    }
}

/// Broker client used by the publisher.
///
/// `send` only enqueues: it returns as soon as the broker accepted or refused
/// the record. The returned handle resolves once delivery is known.
pub trait BrokerClient: Send + Sync {
    fn send(&self, record: BrokerRecord) -> Result<DeliveryHandle, BrokerError>;
}

/// Partition for `key` on a topic with `partitions` lanes.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % partitions
}

pub(crate) fn topic_table(topics: &[TopicConfig]) -> HashMap<String, u32> {
    topics
        .iter()
        .map(|topic| (topic.name.clone(), topic.partitions.max(1)))
        .collect()
}

// ---------------------------------------------------------------------------
// In-process broker
// ---------------------------------------------------------------------------

/// A message retained by [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub key: String,
    pub partition: u32,
    pub offset: u64,
    pub payload: Vec<u8>,
    pub delivered_at: DateTime<Utc>,
}

/// Broker that delivers synchronously into memory.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: HashMap<String, u32>,
    log: Mutex<HashMap<String, Vec<DeliveredMessage>>>,
    closed: AtomicBool,
}

impl MemoryBroker {
    pub fn new(topics: &[TopicConfig]) -> Self {
        Self {
            topics: topic_table(topics),
            log: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Refuse every later send with [`BrokerError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Messages delivered to `topic`, in delivery order.
    pub fn delivered(&self, topic: &str) -> Vec<DeliveredMessage> {
        self.log
            .lock()
            .map(|log| log.get(topic).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl BrokerClient for MemoryBroker {
    fn send(&self, record: BrokerRecord) -> Result<DeliveryHandle, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        let partitions = *self
            .topics
            .get(&record.topic)
            .ok_or_else(|| BrokerError::UnknownTopic(record.topic.clone()))?;
        let partition = partition_for(&record.key, partitions);

        let mut log = self.log.lock().map_err(|_| BrokerError::Closed)?;
        let messages = log.entry(record.topic.clone()).or_default();
        let offset = messages.iter().filter(|m| m.partition == partition).count() as u64;
        messages.push(DeliveredMessage {
            key: record.key,
            partition,
            offset,
            payload: record.payload,
            delivered_at: Utc::now(),
        });

        Ok(DeliveryHandle::ready(Ok(DeliveryReceipt {
            topic: record.topic,
            partition,
            offset,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Vec<TopicConfig> {
        vec![TopicConfig::new("employee-bulk-sync", 5)]
    }

    fn record(key: &str) -> BrokerRecord {
        BrokerRecord {
            topic: "employee-bulk-sync".to_string(),
            key: key.to_string(),
            payload: b"{}".to_vec(),
        }
    }

    #[test]
    fn partition_is_stable_and_in_range() {
        for key in ["default", "a1b2c3d4e5f60718", "x"] {
            let first = partition_for(key, 5);
            assert!(first < 5);
            assert_eq!(first, partition_for(key, 5));
        }
        assert_eq!(partition_for("anything", 1), 0);
        assert_eq!(partition_for("anything", 0), 0);
    }

    #[tokio::test]
    async fn memory_broker_assigns_per_partition_offsets() {
        let broker = MemoryBroker::new(&topics());
        let first = broker.send(record("k")).unwrap().wait().await.unwrap();
        let second = broker.send(record("k")).unwrap().wait().await.unwrap();
        assert_eq!(first.partition, second.partition);
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
        assert_eq!(broker.delivered("employee-bulk-sync").len(), 2);
    }

    #[test]
    fn memory_broker_rejects_unknown_topic_and_closed() {
        let broker = MemoryBroker::new(&topics());
        let mut stray = record("k");
        stray.topic = "nope".to_string();
        assert!(matches!(
            broker.send(stray),
            Err(BrokerError::UnknownTopic(name)) if name == "nope"
        ));

        broker.close();
        assert!(matches!(broker.send(record("k")), Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn dropped_sender_reports_closed() {
        let (tx, handle) = DeliveryHandle::pending();
        drop(tx);
        assert!(matches!(handle.wait().await, Err(BrokerError::Closed)));
    }
}
