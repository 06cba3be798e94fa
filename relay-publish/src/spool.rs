//! Spool broker: a local, durable stand-in for a remote message broker.
//!
//! # Storage layout
//!
//! ```text
//! <spool_dir>/
//!   <topic>/
//!     partition-<n>.jsonl   (one SpooledMessage per line; offset = line index)
//! ```
//!
//! `send` pushes onto a bounded queue and returns at once; a single writer
//! task appends messages in queue order and completes each delivery handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use relay_core::config::TopicConfig;

use crate::broker::{partition_for, topic_table, BrokerClient, BrokerRecord, DeliveryHandle, DeliveryReceipt};
use crate::error::{io_err, BrokerError};

/// On-disk line format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpooledMessage {
    pub offset: u64,
    pub key: String,
    pub written_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

struct Pending {
    record: BrokerRecord,
    partition: u32,
    respond_to: oneshot::Sender<Result<DeliveryReceipt, BrokerError>>,
}

pub struct SpoolBroker {
    tx: mpsc::Sender<Pending>,
    topics: HashMap<String, u32>,
    capacity: usize,
}

impl SpoolBroker {
    /// Start the writer task. Must be called inside a tokio runtime.
    ///
    /// The writer exits once every clone of the broker is dropped and the
    /// queue is drained.
    pub fn start(
        dir: impl Into<PathBuf>,
        topics: &[TopicConfig],
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let writer = tokio::spawn(writer_task(dir.into(), rx));
        (
            Self {
                tx,
                topics: topic_table(topics),
                capacity,
            },
            writer,
        )
    }

    /// `<dir>/<topic>/partition-<n>.jsonl`
    pub fn partition_path(dir: &Path, topic: &str, partition: u32) -> PathBuf {
        dir.join(topic).join(format!("partition-{partition}.jsonl"))
    }
}

impl BrokerClient for SpoolBroker {
    fn send(&self, record: BrokerRecord) -> Result<DeliveryHandle, BrokerError> {
        let partitions = *self
            .topics
            .get(&record.topic)
            .ok_or_else(|| BrokerError::UnknownTopic(record.topic.clone()))?;
        let partition = partition_for(&record.key, partitions);
        let (respond_to, handle) = DeliveryHandle::pending();

        self.tx
            .try_send(Pending {
                record,
                partition,
                respond_to,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => BrokerError::QueueFull {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => BrokerError::Closed,
            })?;
        Ok(handle)
    }
}

async fn writer_task(dir: PathBuf, mut rx: mpsc::Receiver<Pending>) {
    let mut offsets = HashMap::<(String, u32), u64>::new();
    while let Some(pending) = rx.recv().await {
        let result = append(&dir, &mut offsets, &pending.record, pending.partition).await;
        if let Err(err) = &result {
            tracing::warn!(topic = %pending.record.topic, error = %err, "spool append failed");
        }
        let _ = pending.respond_to.send(result);
    }
    tracing::debug!(dir = %dir.display(), "spool writer stopped");
}

async fn append(
    dir: &Path,
    offsets: &mut HashMap<(String, u32), u64>,
    record: &BrokerRecord,
    partition: u32,
) -> Result<DeliveryReceipt, BrokerError> {
    let path = SpoolBroker::partition_path(dir, &record.topic, partition);
    let slot = (record.topic.clone(), partition);
    let offset = match offsets.get(&slot) {
        Some(next) => *next,
        None => existing_lines(&path).await?,
    };

    let payload = serde_json::from_slice(&record.payload).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&record.payload).into_owned())
    });
    let mut line = serde_json::to_vec(&SpooledMessage {
        offset,
        key: record.key.clone(),
        written_at: Utc::now(),
        payload,
    })?;
    line.push(b'\n');

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| io_err(&path, e))?;
    file.write_all(&line).await.map_err(|e| io_err(&path, e))?;
    file.flush().await.map_err(|e| io_err(&path, e))?;

    offsets.insert(slot, offset + 1);
    Ok(DeliveryReceipt {
        topic: record.topic.clone(),
        partition,
        offset,
    })
}

async fn existing_lines(path: &Path) -> Result<u64, BrokerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes.iter().filter(|b| **b == b'\n').count() as u64),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(io_err(path, err)),
    }
}
