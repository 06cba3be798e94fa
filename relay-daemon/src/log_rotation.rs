//! Size-based rotation for the daemon's log files.
//!
//! `daemon.log` and `daemon-err.log` roll over once they pass the size cap:
//!   daemon.log → daemon.log.1 → daemon.log.2 → … → daemon.log.<max_files>

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for LogPolicy {
    /// 10 MiB per file, 5 rotated copies.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Roll `log_path` when it is at least `policy.max_bytes` long.
///
/// The oldest copy is dropped, the rest shift up by one, the live file
/// becomes `.1` and an empty live file is recreated. Returns `true` when a
/// rotation happened; a missing live file is not an error.
pub fn rotate_if_needed(log_path: &Path, policy: LogPolicy) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < policy.max_bytes || policy.max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, policy.max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..policy.max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    fs::File::create(log_path)?;
    Ok(true)
}

/// Rotate both daemon logs under `home`; failures are logged, never fatal.
pub fn rotate_logs(home: &Path) {
    let policy = LogPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match rotate_if_needed(&log_path, policy) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `daemon.log` + 2 → `daemon.log.2`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("daemon.log");
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: LogPolicy = LogPolicy {
        max_bytes: 64,
        max_files: 3,
    };

    fn write_bytes(path: &Path, fill: u8, len: usize) {
        fs::write(path, vec![fill; len]).unwrap();
    }

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        write_bytes(&log, b'a', 10);
        assert!(!rotate_if_needed(&log, SMALL).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_moves_to_first_copy() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        write_bytes(&log, b'a', 100);

        assert!(rotate_if_needed(&log, SMALL).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap().len(), 100);
    }

    #[test]
    fn copies_shift_and_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon-err.log");
        for round in 0..5u8 {
            write_bytes(&log, b'0' + round, 100);
            rotate_if_needed(&log, SMALL).unwrap();
        }

        // Newest round in .1, older ones behind it, nothing beyond the cap.
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap()[0], b'4');
        assert_eq!(fs::read(numbered_path(&log, 3)).unwrap()[0], b'2');
        assert!(!numbered_path(&log, 4).exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("absent.log");
        assert!(!rotate_if_needed(&log, LogPolicy::default()).unwrap());
    }

    #[test]
    fn default_policy_matches_daemon_limits() {
        let policy = LogPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.max_files, 5);
    }
}
