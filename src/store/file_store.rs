//! # File Request Store
//!
//! Durable CRUD over [`RequestRecord`]s, one JSON file per record.
//!
//! ## Layout
//!
//! ```text
//! <base_directory>/
//! ├── IngestRequest.<uuid>.json
//! ├── DipRequest.<uuid>.json
//! └── <work_subdirectory>/
//!     ├── IngestRequest.<uuid>.json.accepted.json
//!     ├── IngestRequest.<uuid>.json.result
//!     └── IngestRequest.<uuid>.json.error.json
//! ```
//!
//! ## Concurrency
//!
//! Create, update, remove and list are serialized by one async mutex per store.
//! Every write goes to a temporary sibling first and is renamed into place, so a
//! reader never observes a half-written record. Temporary files never match the
//! record naming convention and are ignored by [`FileRequestStore::list_pending`].

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::models::{RequestKind, RequestRecord};

const RECORD_SUFFIX: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";
const RESULT_EXTENSION: &str = ".result";
const ERROR_EXTENSION: &str = ".error.json";
const ACCEPTED_EXTENSION: &str = ".accepted.json";

const KINDS: [RequestKind; 2] = [RequestKind::Ingest, RequestKind::Dip];

#[derive(Debug)]
pub struct FileRequestStore {
    base_directory: PathBuf,
    work_directory: PathBuf,
    config: StoreConfig,
    lock: Mutex<()>,
}

impl FileRequestStore {
    /// Open the store, creating the base and work directories when missing
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let base_directory = config.base_directory.clone();
        let work_directory = base_directory.join(&config.work_subdirectory);

        tokio::fs::create_dir_all(&work_directory)
            .await
            .map_err(|e| StoreError::persistence(&work_directory, e))?;

        info!(
            base_directory = %base_directory.display(),
            work_directory = %work_directory.display(),
            "📁 Request store opened"
        );

        Ok(Self {
            base_directory,
            work_directory,
            config,
            lock: Mutex::new(()),
        })
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn work_directory(&self) -> &Path {
        &self.work_directory
    }

    /// Path of the persisted record file
    pub fn record_path(&self, record: &RequestRecord) -> PathBuf {
        self.base_directory.join(record.file_name())
    }

    pub fn result_artifact_path(&self, record: &RequestRecord) -> PathBuf {
        self.artifact_path(record, RESULT_EXTENSION)
    }

    pub fn error_artifact_path(&self, record: &RequestRecord) -> PathBuf {
        self.artifact_path(record, ERROR_EXTENSION)
    }

    pub fn accepted_notice_path(&self, record: &RequestRecord) -> PathBuf {
        self.artifact_path(record, ACCEPTED_EXTENSION)
    }

    fn artifact_path(&self, record: &RequestRecord, extension: &str) -> PathBuf {
        self.work_directory
            .join(format!("{}{}", record.file_name(), extension))
    }

    /// Persist a new record under a fresh key and return that key
    #[instrument(skip(self, record), fields(kind = %record.kind))]
    pub async fn create_new(&self, record: &mut RequestRecord) -> StoreResult<Uuid> {
        let _guard = self.lock.lock().await;

        let mut id = Uuid::new_v4();
        record.id = id;
        while path_exists(&self.record_path(record)).await? {
            id = Uuid::new_v4();
            record.id = id;
        }

        let path = self.record_path(record);
        write_atomically(&path, record).await?;

        debug!(request_id = %id, path = %path.display(), "Request record created");
        Ok(id)
    }

    /// Overwrite an existing record; `NotFound` when it was removed in the meantime
    pub async fn update(&self, record: &RequestRecord) -> StoreResult<()> {
        if !record.has_id() {
            return Err(StoreError::InvalidKey(
                "record has no store key yet".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;

        let path = self.record_path(record);
        if !path_exists(&path).await? {
            return Err(StoreError::NotFound { id: record.id });
        }
        write_atomically(&path, record).await
    }

    /// Read one record back from disk
    pub async fn load(&self, kind: RequestKind, id: Uuid) -> StoreResult<RequestRecord> {
        let _guard = self.lock.lock().await;

        let path = self
            .base_directory
            .join(format!("{}{}{}", kind.file_prefix(), id, RECORD_SUFFIX));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id })
            }
            Err(e) => return Err(StoreError::persistence(&path, e)),
        };

        let mut record: RequestRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
                id,
                reason: e.to_string(),
            })?;
        record.reconcile_step();
        Ok(record)
    }

    /// Whether the record file still exists
    pub async fn contains(&self, record: &RequestRecord) -> StoreResult<bool> {
        path_exists(&self.record_path(record)).await
    }

    /// Every record currently stored, whatever its step.
    ///
    /// Files that cannot be parsed are skipped with a warning; a concurrent
    /// writer may be replacing them.
    #[instrument(skip(self))]
    pub async fn list_pending(&self) -> StoreResult<Vec<RequestRecord>> {
        let _guard = self.lock.lock().await;

        let mut entries = tokio::fs::read_dir(&self.base_directory)
            .await
            .map_err(|e| StoreError::persistence(&self.base_directory, e))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::persistence(&self.base_directory, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some((kind, id)) = parse_record_name(name) else {
                continue;
            };

            let path = entry.path();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable request file");
                    continue;
                }
            };

            match serde_json::from_slice::<RequestRecord>(&bytes) {
                Ok(mut record) if record.kind == kind && record.id == id => {
                    record.reconcile_step();
                    records.push(record);
                }
                Ok(_) => {
                    warn!(path = %path.display(), "Skipping request file whose content does not match its name");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed request file");
                }
            }
        }

        records.sort_by_key(|record| record.created_at);
        debug!(count = records.len(), "Listed stored requests");
        Ok(records)
    }

    /// Delete the record file and every artifact derived from it.
    ///
    /// Returns true only when every deletion succeeded and the record file is
    /// confirmed gone. Files that are already absent count as deleted, so calling
    /// this twice is harmless.
    #[instrument(skip(self, record), fields(request_id = %record.id, kind = %record.kind))]
    pub async fn remove(&self, record: &RequestRecord) -> bool {
        let _guard = self.lock.lock().await;

        let record_path = self.record_path(record);
        let mut targets = vec![
            record_path.clone(),
            self.result_artifact_path(record),
            self.error_artifact_path(record),
            self.accepted_notice_path(record),
        ];
        if let Some(result_path) = &record.result_path {
            if !targets.contains(result_path) {
                targets.push(result_path.clone());
            }
        }
        // A DIP source is the caller's query file and is never ours to delete
        if self.config.delete_source_on_cleanup
            && record.kind == RequestKind::Ingest
            && !record.source_path.as_os_str().is_empty()
        {
            targets.push(record.source_path.clone());
        }

        let mut all_deleted = true;
        for target in &targets {
            if let Err(e) = remove_if_present(target).await {
                warn!(path = %target.display(), error = %e, "Failed to delete request file");
                all_deleted = false;
            }
        }

        let gone = self.wait_until_gone(&record_path).await;
        if !gone {
            warn!(path = %record_path.display(), "Request file still visible after deletion");
        }
        all_deleted && gone
    }

    /// Bounded wait with doubling delay for the medium to stop reporting the file
    async fn wait_until_gone(&self, path: &Path) -> bool {
        let mut delay = self.config.removal_wait_initial();
        for _ in 0..self.config.removal_wait_attempts {
            match tokio::fs::try_exists(path).await {
                Ok(false) => return true,
                Ok(true) | Err(_) => {
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
        matches!(tokio::fs::try_exists(path).await, Ok(false))
    }
}

fn parse_record_name(name: &str) -> Option<(RequestKind, Uuid)> {
    let stem = name.strip_suffix(RECORD_SUFFIX)?;
    KINDS.iter().find_map(|kind| {
        stem.strip_prefix(kind.file_prefix())
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(|id| (*kind, id))
    })
}

async fn path_exists(path: &Path) -> StoreResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| StoreError::persistence(path, e))
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn write_atomically(path: &Path, record: &RequestRecord) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialization {
        id: record.id,
        reason: e.to_string(),
    })?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    tokio::fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| StoreError::persistence(&temp_path, e))?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StoreError::persistence(path, e));
    }
    Ok(())
}
