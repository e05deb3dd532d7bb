//! Session Registry — canonical mapping of session handle → session record.
//!
//! Follows the same file-backed, DashMap-cached shape as a bridge/config
//! store: an in-memory map is the read path, and every mutation is also
//! flushed to disk with an atomic write-then-rename so a crash can never
//! observe a half-written record. A per-handle lock (the DashMap shard
//! lock plus an explicit `tokio::sync::Mutex` for the update closure)
//! gives single-writer discipline without holding anything across I/O.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{CoordinatorError, Result};
use crate::model::{SessionHandle, SessionRecord, SessionStatus};

/// Crash-safe, single-writer-per-handle session store.
#[derive(Clone)]
pub struct SessionRegistry {
    records: Arc<DashMap<SessionHandle, SessionRecord>>,
    /// One mutex per handle's mutation path would be ideal; in practice a
    /// single map-wide mutex guarding the read-modify-write sequence is
    /// sufficient because DashMap's own shard locks already serialize
    /// concurrent access to the *same* shard, and mutations never await
    /// while holding this lock.
    write_lock: Arc<tokio::sync::Mutex<()>>,
    sessions_dir: Option<PathBuf>,
}

impl SessionRegistry {
    pub fn new(upload_dir: Option<&str>) -> Self {
        let sessions_dir = upload_dir.map(|d| PathBuf::from(d).join("sessions"));
        Self {
            records: Arc::new(DashMap::new()),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            sessions_dir,
        }
    }

    /// Repopulate the in-memory map from persisted session files. Called
    /// once at startup; restores every session whose last mutation was
    /// durably written.
    pub fn load_from_disk(&self) -> usize {
        let dir = match &self.sessions_dir {
            Some(d) => d,
            None => return 0,
        };
        if !dir.exists() {
            return 0;
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read sessions directory");
                return 0;
            }
        };

        let mut count = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<SessionRecord>(&contents) {
                    Ok(record) => {
                        self.records.insert(record.handle, record);
                        count += 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, path = %path.display(), "failed to parse session record, skipping");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "failed to read session file");
                }
            }
        }

        tracing::info!(count, "loaded session records from disk");
        count
    }

    fn persist(&self, record: &SessionRecord) {
        let dir = match &self.sessions_dir {
            Some(d) => d,
            None => return,
        };
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(error = %e, "failed to create sessions directory");
            return;
        }
        let path = dir.join(format!("{}.json", record.handle));
        let json = match serde_json::to_string_pretty(record) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize session record");
                return;
            }
        };
        let tmp_path = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp_path, &json) {
            tracing::error!(error = %e, "failed to write temp session file");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            tracing::error!(error = %e, "failed to rename temp session file");
            let _ = std::fs::remove_file(&tmp_path);
        }
    }

    fn remove_file(&self, handle: SessionHandle) {
        let dir = match &self.sessions_dir {
            Some(d) => d,
            None => return,
        };
        let path = dir.join(format!("{}.json", handle));
        let _ = std::fs::remove_file(path);
    }

    pub async fn create(&self, record: SessionRecord) {
        let _guard = self.write_lock.lock().await;
        self.persist(&record);
        self.records.insert(record.handle, record);
    }

    pub fn get(&self, handle: SessionHandle) -> Option<SessionRecord> {
        self.records.get(&handle).map(|r| r.value().clone())
    }

    /// Applies `mutator` atomically. The closure returns `Ok(())` to commit
    /// the in-place mutation, or an error to abort the transition and
    /// leave the stored record unchanged.
    pub async fn update<F>(&self, handle: SessionHandle, mutator: F) -> Result<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord) -> Result<()>,
    {
        let _guard = self.write_lock.lock().await;

        let mut entry = self
            .records
            .get_mut(&handle)
            .ok_or(CoordinatorError::NotFound)?;

        let mut candidate = entry.clone();
        mutator(&mut candidate)?;
        candidate.last_activity_at = Utc::now();

        *entry.value_mut() = candidate.clone();
        drop(entry);

        self.persist(&candidate);
        Ok(candidate)
    }

    /// Snapshot of sessions whose `last_activity_at` predates `before`.
    /// The Reaper must re-read each handle under `update` before acting —
    /// this is a point-in-time scan, not a lock.
    pub fn scan_by_last_activity_before(&self, before: DateTime<Utc>) -> Vec<SessionRecord> {
        self.records
            .iter()
            .filter(|entry| entry.last_activity_at < before)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of completed sessions whose `completed_at` predates `before`.
    pub fn scan_completed_before(&self, before: DateTime<Utc>) -> Vec<SessionRecord> {
        self.records
            .iter()
            .filter(|entry| {
                entry.status == SessionStatus::Completed
                    && entry.completed_at.map(|t| t < before).unwrap_or(false)
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub async fn delete(&self, handle: SessionHandle) -> bool {
        let _guard = self.write_lock.lock().await;
        let removed = self.records.remove(&handle).is_some();
        if removed {
            self.remove_file(handle);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> Vec<SessionRecord> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }
}
