//! Sync orchestrator: single-flight drain of unsynced records.
//!
//! One [`SyncEngine`] exists per process. A run is admitted only by winning
//! the `running` compare-exchange; the resulting [`RunGuard`] is the one
//! thing that clears the flag again, on every exit path including panics.
//! Each run gets its own cancellation token, so a stop aimed at one run
//! never reaches the next.
//!
//! Job state is published through a `watch` channel, so [`SyncEngine::status`]
//! never waits on the drain loop.
//!
//! Each run:
//! 1. counts unsynced records (zero → `NO_DATA`),
//! 2. fetches a batch past the cursor, publishes each record with a short
//!    pause between records, marks the enqueued ones synced in one write,
//! 3. stops once the store reports nothing left or no batch remains past
//!    the cursor.
//!
//! Records are marked *after* they are handed to the broker. A crash between
//! publish and mark re-sends them on the next run; a rejected publish leaves
//! the record unsynced for the next run. Nothing is ever flagged synced
//! without having been enqueued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use relay_core::{RecordId, RecordStore, RelayConfig, StoreError};
use relay_publish::{EventPublisher, PublishOutcome};

use crate::error::{SyncError, TriggerError};
use crate::status::{SyncJob, SyncStatus};

/// How often (in records) the progress message is refreshed.
const PROGRESS_EVERY: u64 = 5;

/// Knobs the engine reads; everything else comes from its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub enabled: bool,
    pub record_delay: Duration,
    pub store_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            record_delay: Duration::from_millis(10),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            enabled: config.bulk_sync.enabled,
            record_delay: config.bulk_sync.record_delay(),
            store_timeout: config.store_timeout(),
        }
    }
}

struct Shared {
    running: AtomicBool,
    /// Token of the current (or last) run. Admission and `stop` both take
    /// this lock, so a stop is either refused or lands on the live run.
    cancel: Mutex<CancellationToken>,
    state: watch::Sender<SyncJob>,
}

impl Shared {
    fn cancel_slot(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clear the flag and publish the terminal snapshot under the watch lock:
    /// once an observer sees `running: false`, a new run can be admitted.
    fn release(&self, status: SyncStatus, message: String) {
        self.state.send_modify(|job| {
            self.running.store(false, Ordering::Release);
            job.finish(status, message);
        });
    }
}

/// Proof of holding the single-flight slot.
struct RunGuard {
    shared: Arc<Shared>,
    token: CancellationToken,
    released: bool,
}

impl RunGuard {
    fn finish(mut self, status: SyncStatus, message: String) {
        self.released = true;
        self.shared.release(status, message);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.released {
            // Unwound before recording an outcome.
            self.shared
                .release(SyncStatus::Failed, "run aborted before completion".to_string());
        }
    }
}

enum DrainOutcome {
    NoData,
    Completed {
        processed: u64,
        total: u64,
        remaining: u64,
        elapsed: Duration,
    },
    Stopped {
        processed: u64,
        total: u64,
    },
}

pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    publisher: Arc<EventPublisher>,
    settings: EngineSettings,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<EventPublisher>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SyncJob::default());
        Arc::new(Self {
            store,
            publisher,
            settings,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
                state,
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Latest job snapshot. A snapshot with `running: false` means the
    /// single-flight slot is already free.
    pub fn status(&self) -> SyncJob {
        self.shared.state.borrow().clone()
    }

    /// Receiver that observes every job state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncJob> {
        self.shared.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Timer hook. Disabled and already-running are silent no-ops.
    pub async fn run_scheduled(&self) {
        if !self.settings.enabled {
            tracing::info!("scheduled bulk sync skipped: disabled in configuration");
            self.mark_disabled();
            return;
        }
        let Some(guard) = self.try_acquire() else {
            tracing::debug!("scheduled bulk sync skipped: job already running");
            return;
        };
        tracing::info!("scheduled bulk sync starting");
        self.execute(guard).await;
    }

    /// Operator hook. Starts the drain on a background task and returns at
    /// once; refuses with [`TriggerError::AlreadyRunning`] while a run is live.
    pub fn trigger_manual(self: &Arc<Self>) -> Result<(), TriggerError> {
        tracing::info!("manual bulk sync requested");
        if !self.settings.enabled {
            self.mark_disabled();
            return Err(TriggerError::Disabled);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TriggerError::NoRuntime)?;
        let Some(guard) = self.try_acquire() else {
            tracing::warn!("manual bulk sync refused: job already running");
            return Err(TriggerError::AlreadyRunning);
        };

        let engine = Arc::clone(self);
        let handle = runtime.spawn(async move { engine.execute(guard).await });
        *self.worker_slot() = Some(handle);
        tracing::info!("manual bulk sync started in background");
        Ok(())
    }

    /// Run a drain in the caller's task and return the final snapshot.
    pub async fn run_now(&self) -> Result<SyncJob, TriggerError> {
        if !self.settings.enabled {
            self.mark_disabled();
            return Err(TriggerError::Disabled);
        }
        let guard = self.try_acquire().ok_or(TriggerError::AlreadyRunning)?;
        self.execute(guard).await;
        Ok(self.status())
    }

    /// Ask the live run to stop at its next check point.
    ///
    /// Returns `false` when no run is active.
    pub fn stop(&self) -> bool {
        let token = self.shared.cancel_slot();
        if !self.is_running() {
            return false;
        }
        token.cancel();
        self.shared.state.send_if_modified(|job| {
            if job.running && job.status == SyncStatus::Running {
                job.status = SyncStatus::Stopping;
                job.message = "stopping synchronization".to_string();
                true
            } else {
                false
            }
        });
        tracing::info!("bulk sync stop requested");
        true
    }

    /// Wait for the background worker started by `trigger_manual`, if any.
    pub async fn wait_idle(&self) {
        let handle = self.worker_slot().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "bulk sync worker join failure");
            }
        }
    }

    /// Stop any live run and wait for the background worker to exit.
    pub async fn shutdown(&self) {
        self.stop();
        self.wait_idle().await;
    }

    // -----------------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------------

    fn try_acquire(&self) -> Option<RunGuard> {
        let mut slot = self.shared.cancel_slot();
        self.shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let token = CancellationToken::new();
        *slot = token.clone();
        self.shared.state.send_replace(SyncJob::started());
        Some(RunGuard {
            shared: Arc::clone(&self.shared),
            token,
            released: false,
        })
    }

    async fn execute(&self, guard: RunGuard) {
        let started = Instant::now();
        let (status, message) = match self.drain(&guard.token, started).await {
            Ok(DrainOutcome::NoData) => {
                tracing::info!("bulk sync found no unsynced records");
                (SyncStatus::NoData, "no unsynced records".to_string())
            }
            Ok(DrainOutcome::Completed {
                processed,
                total,
                remaining,
                elapsed,
            }) => {
                tracing::info!(
                    processed,
                    total,
                    remaining,
                    duration_ms = elapsed.as_millis() as u64,
                    "bulk sync completed",
                );
                let mut message = format!(
                    "synchronization completed: {processed}/{total} records in {} ms",
                    elapsed.as_millis()
                );
                if remaining > 0 {
                    message.push_str(&format!("; {remaining} left unsynced for the next run"));
                }
                (SyncStatus::Completed, message)
            }
            Ok(DrainOutcome::Stopped { processed, total }) => {
                tracing::info!(processed, total, "bulk sync stopped on request");
                (
                    SyncStatus::Stopped,
                    format!("synchronization stopped: {processed}/{total} records"),
                )
            }
            Err(err) => {
                tracing::error!(error = %err, "bulk sync failed");
                (SyncStatus::Failed, format!("synchronization failed: {err}"))
            }
        };
        guard.finish(status, message);
    }

    async fn drain(
        &self,
        token: &CancellationToken,
        started: Instant,
    ) -> Result<DrainOutcome, SyncError> {
        let total = self
            .store_call("count_unsynced", self.store.count_unsynced())
            .await?;
        self.update(|job| {
            job.total = total;
            job.message = format!("found {total} unsynced records");
        });
        if total == 0 {
            return Ok(DrainOutcome::NoData);
        }

        let mut processed = 0u64;
        let mut cursor: Option<RecordId> = None;
        let remaining = loop {
            if token.is_cancelled() {
                return Ok(DrainOutcome::Stopped { processed, total });
            }

            let batch = self
                .store_call(
                    "fetch_unsynced_batch",
                    self.store.fetch_unsynced_batch(cursor),
                )
                .await?;
            if batch.is_empty() {
                break self
                    .store_call("count_unsynced", self.store.count_unsynced())
                    .await?;
            }
            cursor = batch.last().map(|record| record.id);
            tracing::debug!(size = batch.len(), cursor = ?cursor, "bulk sync batch fetched");
            self.update(|job| job.message = format!("processing batch of {} records", batch.len()));

            let mut enqueued = Vec::with_capacity(batch.len());
            let mut interrupted = false;
            for record in &batch {
                if token.is_cancelled() {
                    interrupted = true;
                    break;
                }
                match self.publisher.publish_bulk_sync(record) {
                    PublishOutcome::Enqueued { .. } => {
                        enqueued.push(record.id);
                        processed += 1;
                        self.update(|job| {
                            job.processed = processed;
                            if processed % PROGRESS_EVERY == 0 {
                                job.message = progress_message(processed, total);
                            }
                        });
                    }
                    PublishOutcome::Rejected { reason } => {
                        tracing::warn!(
                            record_id = %record.id,
                            error = %reason,
                            "record skipped, stays unsynced",
                        );
                    }
                }
                self.pause(token).await;
            }

            if !enqueued.is_empty() {
                let marked = self
                    .store_call(
                        "mark_synced_by_ids",
                        self.store.mark_synced_by_ids(&enqueued),
                    )
                    .await?;
                tracing::debug!(marked, requested = enqueued.len(), "batch marked synced");
            }
            if interrupted || token.is_cancelled() {
                return Ok(DrainOutcome::Stopped { processed, total });
            }

            let remaining = self
                .store_call("count_unsynced", self.store.count_unsynced())
                .await?;
            if remaining == 0 {
                break 0;
            }
        };

        Ok(DrainOutcome::Completed {
            processed,
            total,
            remaining,
            elapsed: started.elapsed(),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SyncError> {
        let after = self.settings.store_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout { operation, after }),
        }
    }

    /// Inter-record pause; returns early when a stop is requested.
    async fn pause(&self, token: &CancellationToken) {
        if self.settings.record_delay.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.settings.record_delay) => {}
            _ = token.cancelled() => {}
        }
    }

    fn update(&self, modify: impl FnOnce(&mut SyncJob)) {
        self.shared.state.send_modify(modify);
    }

    fn mark_disabled(&self) {
        self.shared.state.send_if_modified(|job| {
            if job.running {
                return false;
            }
            job.status = SyncStatus::Disabled;
            job.message = "bulk sync is disabled in configuration".to_string();
            true
        });
    }

    fn worker_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn progress_message(processed: u64, total: u64) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        processed as f64 / total as f64 * 100.0
    };
    format!("processed {processed} of {total} ({percent:.1}%)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_message_formats_percent() {
        assert_eq!(progress_message(5, 20), "processed 5 of 20 (25.0%)");
        assert_eq!(progress_message(0, 0), "processed 0 of 0 (100.0%)");
    }

    #[test]
    fn settings_follow_config() {
        let mut config = RelayConfig::default();
        config.bulk_sync.enabled = false;
        config.bulk_sync.record_delay_ms = 0;
        config.store.timeout_ms = 250;
        let settings = EngineSettings::from_config(&config);
        assert!(!settings.enabled);
        assert!(settings.record_delay.is_zero());
        assert_eq!(settings.store_timeout, Duration::from_millis(250));
    }
}
