//! Drive an in-process daemon through its control socket.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

use relay_core::config::{self, RelayConfig};
use relay_core::{FileStore, NewEmployee, RecordStore};
use relay_daemon::{request_status, request_stop, request_stop_sync, request_sync, DaemonError};

fn write_config(home: &Path, record_delay_ms: u64) {
    let mut config = RelayConfig::default();
    // Keep the scheduler out of the way; runs are started over the socket.
    config.bulk_sync.initial_delay_ms = 3_600_000;
    config.bulk_sync.record_delay_ms = record_delay_ms;
    config::save_at(home, &config).unwrap();
}

async fn seed(home: &Path, count: usize) -> FileStore {
    let config = config::load_at(home).unwrap();
    let store = FileStore::open(config.store_path(home), 0);
    for n in 0..count {
        store
            .insert(NewEmployee {
                first_name: format!("Emp{n}"),
                last_name: "Volkov".to_string(),
                age: 30,
                department: if n % 2 == 0 { "IT" } else { "Sales" }.to_string(),
                ..NewEmployee::default()
            })
            .await
            .unwrap();
    }
    store
}

async fn blocking<T: Send + 'static>(
    home: &Path,
    call: fn(&Path) -> Result<T, DaemonError>,
) -> Result<T, DaemonError> {
    let home: PathBuf = home.to_path_buf();
    tokio::task::spawn_blocking(move || call(&home)).await.unwrap()
}

/// Poll until the daemon answers on its socket.
async fn wait_for_daemon(home: &Path) -> Value {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match blocking(home, request_status).await {
            Ok(status) => return status,
            Err(DaemonError::DaemonNotRunning { .. }) if Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(err) => panic!("daemon never came up: {err}"),
        }
    }
}

async fn wait_for_job(home: &Path, done: impl Fn(&Value) -> bool) -> Value {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = blocking(home, request_status).await.unwrap();
        if done(&status["job"]) {
            return status;
        }
        assert!(Instant::now() < deadline, "job never settled: {status}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_over_socket_drains_the_store() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), 0);
    let store = seed(home.path(), 6).await;

    let daemon = tokio::spawn(relay_daemon::run(home.path().to_path_buf()));

    let status = wait_for_daemon(home.path()).await;
    assert_eq!(status["running"], true);
    assert_eq!(status["job"]["status"], "NOT_STARTED");

    let started = blocking(home.path(), request_sync).await.unwrap();
    assert_eq!(started["started"], true);

    let status = wait_for_job(home.path(), |job| job["running"] == false).await;
    assert_eq!(status["job"]["status"], "COMPLETED");
    assert_eq!(status["job"]["processed"], 6);
    assert_eq!(store.count_unsynced().await.unwrap(), 0);

    blocking(home.path(), request_stop).await.unwrap();
    daemon.await.unwrap().unwrap();
    assert!(!relay_daemon::paths::socket_path(home.path()).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_sync_is_refused_and_stop_sync_cancels() {
    let home = TempDir::new().unwrap();
    // Slow enough that the run is still live when the next requests land.
    write_config(home.path(), 200);
    let store = seed(home.path(), 20).await;

    let daemon = tokio::spawn(relay_daemon::run(home.path().to_path_buf()));
    wait_for_daemon(home.path()).await;

    blocking(home.path(), request_sync).await.unwrap();
    match blocking(home.path(), request_sync).await {
        Err(DaemonError::Protocol(message)) => assert_eq!(message, "job already running"),
        other => panic!("expected refusal, got {other:?}"),
    }

    let stopping = blocking(home.path(), request_stop_sync).await.unwrap();
    assert_eq!(stopping["stopping"], true);

    let status = wait_for_job(home.path(), |job| job["running"] == false).await;
    assert_eq!(status["job"]["status"], "STOPPED");
    let processed = status["job"]["processed"].as_u64().unwrap();
    assert!(processed < 20);
    assert_eq!(store.count_unsynced().await.unwrap(), 20 - processed);

    blocking(home.path(), request_stop).await.unwrap();
    daemon.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_daemon_refuses_manual_sync() {
    let home = TempDir::new().unwrap();
    let mut config = RelayConfig::default();
    config.bulk_sync.enabled = false;
    config::save_at(home.path(), &config).unwrap();

    let daemon = tokio::spawn(relay_daemon::run(home.path().to_path_buf()));
    let status = wait_for_daemon(home.path()).await;
    assert_eq!(status["bulk_sync_enabled"], false);

    match blocking(home.path(), request_sync).await {
        Err(DaemonError::Protocol(message)) => assert_eq!(message, "bulk sync is disabled"),
        other => panic!("expected refusal, got {other:?}"),
    }
    let status = blocking(home.path(), request_status).await.unwrap();
    assert_eq!(status["job"]["status"], "DISABLED");

    blocking(home.path(), request_stop).await.unwrap();
    daemon.await.unwrap().unwrap();
}
