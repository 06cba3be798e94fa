//! Record store: the persistent side of the sync engine.
//!
//! # Storage layout (file backend)
//!
//! ```text
//! ~/.relay/
//!   store/
//!     records.json   ({ "next_id": n, "records": [ ... ] }, ascending id)
//! ```
//!
//! Writes use the `.tmp` + rename pattern so a crash mid-write never leaves
//! a truncated document behind. Every operation re-reads the document, so
//! records inserted by another process are visible on the next call.
//!
//! Both backends share [`StoreDocument`], which holds the query and flag
//! semantics; the backends only differ in where the document lives.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{store_io, StoreError};
use crate::types::{Employee, NewEmployee, RecordId};

/// Contract the sync engine consumes.
///
/// `fetch_unsynced_batch` and `mark_synced_by_ids` must observe each other's
/// effects: once a mark returns, the marked ids never appear in a later
/// fetch or count until they are reset.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of records whose `synced` flag is false.
    async fn count_unsynced(&self) -> Result<u64, StoreError>;

    /// Unsynced records in ascending id order, strictly after `after` when
    /// given, at most one batch. Empty only when none remain past the cursor.
    async fn fetch_unsynced_batch(
        &self,
        after: Option<RecordId>,
    ) -> Result<Vec<Employee>, StoreError>;

    /// Flag every listed record as synced in one write. Returns the number
    /// of records that flipped from unsynced to synced.
    async fn mark_synced_by_ids(&self, ids: &[RecordId]) -> Result<u64, StoreError>;

    async fn insert(&self, new: NewEmployee) -> Result<Employee, StoreError>;

    async fn list(&self) -> Result<Vec<Employee>, StoreError>;

    /// Clear the synced flag so records are offered again. `None` resets all.
    async fn reset_synced(&self, ids: Option<&[RecordId]>) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn count_unsynced(&self) -> Result<u64, StoreError> {
        (**self).count_unsynced().await
    }

    async fn fetch_unsynced_batch(
        &self,
        after: Option<RecordId>,
    ) -> Result<Vec<Employee>, StoreError> {
        (**self).fetch_unsynced_batch(after).await
    }

    async fn mark_synced_by_ids(&self, ids: &[RecordId]) -> Result<u64, StoreError> {
        (**self).mark_synced_by_ids(ids).await
    }

    async fn insert(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        (**self).insert(new).await
    }

    async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        (**self).list().await
    }

    async fn reset_synced(&self, ids: Option<&[RecordId]>) -> Result<u64, StoreError> {
        (**self).reset_synced(ids).await
    }
}

// ---------------------------------------------------------------------------
// 1. Shared document
// ---------------------------------------------------------------------------

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default = "first_id")]
    pub next_id: u64,
    #[serde(default)]
    pub records: Vec<Employee>,
}

fn first_id() -> u64 {
    1
}

impl StoreDocument {
    pub fn new() -> Self {
        Self {
            next_id: first_id(),
            records: Vec::new(),
        }
    }

    fn count_unsynced(&self) -> u64 {
        self.records.iter().filter(|r| !r.synced).count() as u64
    }

    fn fetch_unsynced_batch(&self, after: Option<RecordId>, batch_size: usize) -> Vec<Employee> {
        let limit = if batch_size == 0 {
            usize::MAX
        } else {
            batch_size
        };
        self.records
            .iter()
            .filter(|r| !r.synced)
            .filter(|r| after.map_or(true, |cursor| r.id > cursor))
            .take(limit)
            .cloned()
            .collect()
    }

    fn mark_synced(&mut self, ids: &[RecordId]) -> u64 {
        let now = Utc::now();
        let mut affected = 0;
        for record in self.records.iter_mut() {
            if !record.synced && ids.contains(&record.id) {
                record.mark_synced(now);
                affected += 1;
            }
        }
        affected
    }

    fn insert(&mut self, new: NewEmployee) -> Employee {
        let id = RecordId(self.next_id.max(first_id()));
        self.next_id = id.0 + 1;
        let employee = Employee::from_new(id, new, Utc::now());
        self.records.push(employee.clone());
        employee
    }

    fn reset_synced(&mut self, ids: Option<&[RecordId]>) -> u64 {
        let now = Utc::now();
        let mut affected = 0;
        for record in self.records.iter_mut() {
            let selected = ids.map_or(true, |ids| ids.contains(&record.id));
            if selected && record.synced {
                record.reset_synced(now);
                affected += 1;
            }
        }
        affected
    }
}

// ---------------------------------------------------------------------------
// 2. Memory backend
// ---------------------------------------------------------------------------

/// In-process store. Cheap to construct, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
    batch_size: usize,
}

impl MemoryStore {
    /// A store that returns every unsynced record in a single batch.
    pub fn new() -> Self {
        Self::with_batch_size(0)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            doc: Mutex::new(StoreDocument::new()),
            batch_size,
        }
    }

    fn doc(&self) -> Result<std::sync::MutexGuard<'_, StoreDocument>, StoreError> {
        self.doc
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count_unsynced(&self) -> Result<u64, StoreError> {
        Ok(self.doc()?.count_unsynced())
    }

    async fn fetch_unsynced_batch(
        &self,
        after: Option<RecordId>,
    ) -> Result<Vec<Employee>, StoreError> {
        Ok(self.doc()?.fetch_unsynced_batch(after, self.batch_size))
    }

    async fn mark_synced_by_ids(&self, ids: &[RecordId]) -> Result<u64, StoreError> {
        Ok(self.doc()?.mark_synced(ids))
    }

    async fn insert(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        Ok(self.doc()?.insert(new))
    }

    async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        Ok(self.doc()?.records.clone())
    }

    async fn reset_synced(&self, ids: Option<&[RecordId]>) -> Result<u64, StoreError> {
        Ok(self.doc()?.reset_synced(ids))
    }
}

// ---------------------------------------------------------------------------
// 3. File backend
// ---------------------------------------------------------------------------

/// JSON-document store on disk.
///
/// Calls within one process are serialized by an async mutex; the document
/// itself is the only shared state between processes.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    batch_size: usize,
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&StoreDocument) -> T + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_document(&path).map(|doc| query(&doc)))
            .await
            .map_err(|err| StoreError::Unavailable(format!("store task join error: {err}")))?
    }

    /// Load, mutate, and save atomically when the mutation reports a change.
    async fn write<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreDocument) -> (T, bool) + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut doc = load_document(&path)?;
            let (value, changed) = mutate(&mut doc);
            if changed {
                save_document(&path, &doc)?;
            }
            Ok(value)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("store task join error: {err}")))?
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn count_unsynced(&self) -> Result<u64, StoreError> {
        self.read(StoreDocument::count_unsynced).await
    }

    async fn fetch_unsynced_batch(
        &self,
        after: Option<RecordId>,
    ) -> Result<Vec<Employee>, StoreError> {
        let batch_size = self.batch_size;
        self.read(move |doc| doc.fetch_unsynced_batch(after, batch_size))
            .await
    }

    async fn mark_synced_by_ids(&self, ids: &[RecordId]) -> Result<u64, StoreError> {
        let ids = ids.to_vec();
        self.write(move |doc| {
            let affected = doc.mark_synced(&ids);
            (affected, affected > 0)
        })
        .await
    }

    async fn insert(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        self.write(move |doc| (doc.insert(new), true)).await
    }

    async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        self.read(|doc| doc.records.clone()).await
    }

    async fn reset_synced(&self, ids: Option<&[RecordId]>) -> Result<u64, StoreError> {
        let ids = ids.map(<[RecordId]>::to_vec);
        self.write(move |doc| {
            let affected = doc.reset_synced(ids.as_deref());
            (affected, affected > 0)
        })
        .await
    }
}

/// Load the store document at `path`.
///
/// Returns an empty document if the file does not yet exist.
pub fn load_document(path: &Path) -> Result<StoreDocument, StoreError> {
    if !path.exists() {
        return Ok(StoreDocument::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| store_io(path, e))?;
    let mut doc: StoreDocument =
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    doc.records.sort_by_key(|r| r.id);
    // Never hand out an id that is already taken, whatever next_id says.
    if let Some(max) = doc.records.last().map(|r| r.id.0) {
        doc.next_id = doc.next_id.max(max + 1);
    }
    Ok(doc)
}

/// Save the store document atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_document(path: &Path, doc: &StoreDocument) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(store_io(
            path,
            std::io::Error::other("invalid record store path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| store_io(dir, e))?;

    let json = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| store_io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| store_io(path, e))?;
    tracing::debug!(path = %path.display(), records = doc.records.len(), "record store saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn employee(first: &str, department: &str) -> NewEmployee {
        NewEmployee {
            first_name: first.to_string(),
            last_name: "Test".to_string(),
            age: 30,
            department: department.to_string(),
            ..NewEmployee::default()
        }
    }

    #[test]
    fn empty_document_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let doc = load_document(&tmp.path().join("records.json")).unwrap();
        assert!(doc.records.is_empty());
        assert_eq!(doc.next_id, 1);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store").join("records.json");
        save_document(&path, &StoreDocument::new()).unwrap();
        assert!(path.exists());
        assert!(
            !path.with_extension("json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn load_repairs_stale_next_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        let mut doc = StoreDocument::new();
        doc.insert(employee("a", "IT"));
        doc.insert(employee("b", "IT"));
        doc.next_id = 1;
        save_document(&path, &doc).unwrap();

        let mut loaded = load_document(&path).unwrap();
        assert_eq!(loaded.next_id, 3);
        assert_eq!(loaded.insert(employee("c", "IT")).id, RecordId(3));
    }

    #[test]
    fn corrupt_document_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("records.json"));
    }

    #[test]
    fn fetch_respects_cursor_and_batch_size() {
        let mut doc = StoreDocument::new();
        for name in ["a", "b", "c", "d"] {
            doc.insert(employee(name, "IT"));
        }
        let first = doc.fetch_unsynced_batch(None, 2);
        assert_eq!(
            first.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![RecordId(1), RecordId(2)]
        );
        let second = doc.fetch_unsynced_batch(Some(RecordId(2)), 2);
        assert_eq!(
            second.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![RecordId(3), RecordId(4)]
        );
        assert!(doc.fetch_unsynced_batch(Some(RecordId(4)), 2).is_empty());
    }

    #[test]
    fn mark_counts_only_flipped_records() {
        let mut doc = StoreDocument::new();
        doc.insert(employee("a", "IT"));
        doc.insert(employee("b", "HR"));
        assert_eq!(doc.mark_synced(&[RecordId(1), RecordId(99)]), 1);
        assert_eq!(doc.mark_synced(&[RecordId(1)]), 0);
        assert_eq!(doc.count_unsynced(), 1);
        assert!(doc.records[0].synced_at.is_some());
    }
}
