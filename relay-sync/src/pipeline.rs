//! Shared wiring entrypoint used by CLI and daemon.
//!
//! Builds the file-backed store, the spool broker, the publisher and the
//! engine from one [`RelayConfig`], so both front ends run the exact same
//! stack.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use relay_core::{FileStore, RelayConfig};
use relay_publish::{EventPublisher, SpoolBroker};

use crate::engine::{EngineSettings, SyncEngine};
use crate::error::TriggerError;
use crate::status::SyncJob;

/// Upper bound on waiting for the spool writer to flush during `close`.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fully wired engine plus the handles needed to shut it down cleanly.
pub struct Pipeline {
    pub engine: Arc<SyncEngine>,
    pub store: Arc<FileStore>,
    pub publisher: Arc<EventPublisher>,
    writer: JoinHandle<()>,
}

/// Wire the stack for `home`. Must be called inside a tokio runtime.
pub fn assemble(home: &Path, config: &RelayConfig) -> Pipeline {
    let store = Arc::new(FileStore::open(
        config.store_path(home),
        config.store.batch_size,
    ));
    let topics = [
        config.broker.topics.created.clone(),
        config.broker.topics.bulk_sync.clone(),
    ];
    let (broker, writer) = SpoolBroker::start(
        config.spool_dir(home),
        &topics,
        config.broker.queue_capacity,
    );
    let publisher = Arc::new(EventPublisher::new(Arc::new(broker), config));
    let engine = SyncEngine::new(
        store.clone(),
        publisher.clone(),
        EngineSettings::from_config(config),
    );
    tracing::debug!(
        store = %store.path().display(),
        spool = %config.spool_dir(home).display(),
        "sync pipeline assembled",
    );
    Pipeline {
        engine,
        store,
        publisher,
        writer,
    }
}

impl Pipeline {
    /// Stop the engine, release the broker and wait for queued messages to
    /// reach the spool.
    pub async fn close(self) {
        let Pipeline {
            engine,
            store,
            publisher,
            writer,
        } = self;
        engine.shutdown().await;
        drop(engine);
        drop(publisher);
        drop(store);
        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "spool writer join failure"),
            Err(_) => tracing::warn!("spool writer still busy at shutdown"),
        }
    }
}

/// One drain in the foreground: assemble, run, close.
pub async fn run_once(home: &Path, config: &RelayConfig) -> Result<SyncJob, TriggerError> {
    let pipeline = assemble(home, config);
    let result = pipeline.engine.run_now().await;
    pipeline.close().await;
    result
}
