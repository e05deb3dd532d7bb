//! Periodic sweep reclaiming stale in-progress sessions and expired
//! completed artifacts. Mirrors the teacher's periodic `cleanup_expired`
//! task spawned from `main.rs`, just pointed at the Registry/Blob Store
//! instead of the asset cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use crate::blobstore::BlobStore;
use crate::model::SessionStatus;
use crate::registry::SessionRegistry;

pub struct Reaper {
    registry: SessionRegistry,
    blobstore: BlobStore,
    stale_threshold_minutes: i64,
    retention_days: i64,
}

impl Reaper {
    pub fn new(
        registry: SessionRegistry,
        blobstore: BlobStore,
        stale_threshold_minutes: i64,
        retention_days: i64,
    ) -> Self {
        Self {
            registry,
            blobstore,
            stale_threshold_minutes,
            retention_days,
        }
    }

    /// Aborts sessions inactive past the stale threshold and purges
    /// artifacts for completed sessions past their retention window.
    /// Returns `(aborted_count, purged_count)`.
    pub async fn sweep(&self) -> (usize, usize) {
        let stale_before = Utc::now() - ChronoDuration::minutes(self.stale_threshold_minutes);
        let stale = self.registry.scan_by_last_activity_before(stale_before);

        let mut aborted = 0;
        for record in stale {
            if record.status.is_terminal() {
                continue;
            }
            let handle = record.handle;
            let result = self
                .registry
                .update(handle, |r| {
                    r.status = SessionStatus::Aborted;
                    Ok(())
                })
                .await;
            if result.is_ok() {
                self.blobstore
                    .delete_session_artifacts(handle, record.declared.total_chunks, None)
                    .await;
                aborted += 1;
                tracing::info!(handle = %handle, "reaped stale session");
            }
        }

        let retention_before = Utc::now() - ChronoDuration::days(self.retention_days);
        let expired = self.registry.scan_completed_before(retention_before);

        let mut purged = 0;
        for record in expired {
            let final_name = record.final_object.as_ref().map(|f| f.name.as_str());
            self.blobstore
                .delete_session_artifacts(record.handle, record.declared.total_chunks, final_name)
                .await;
            self.registry.delete(record.handle).await;
            purged += 1;
            tracing::info!(handle = %record.handle, "purged expired session artifacts");
        }

        (aborted, purged)
    }

    /// Spawns the periodic sweep task, running every `interval_secs`
    /// seconds until the process exits.
    pub fn spawn(self: Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let (aborted, purged) = self.sweep().await;
                if aborted > 0 || purged > 0 {
                    tracing::info!(aborted, purged, "reaper sweep complete");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Declared, SessionRecord};
    use chrono::Duration as ChronoDuration2;

    fn declared() -> Declared {
        Declared {
            file_name: "a.jpg".into(),
            file_size: 1024,
            file_type: "image/jpeg".into(),
            total_chunks: 1,
        }
    }

    #[tokio::test]
    async fn test_sweep_aborts_stale_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(Some(dir.path().to_str().unwrap()));
        let blobstore = BlobStore::new(dir.path());

        let mut record = SessionRecord::new(declared(), 1024);
        record.last_activity_at = Utc::now() - ChronoDuration2::hours(2);
        let handle = record.handle;
        registry.create(record).await;

        let reaper = Reaper::new(registry.clone(), blobstore, 30, 30);
        let (aborted, purged) = reaper.sweep().await;

        assert_eq!(aborted, 1);
        assert_eq!(purged, 0);
        assert_eq!(registry.get(handle).unwrap().status, SessionStatus::Aborted);
    }

    #[tokio::test]
    async fn test_sweep_ignores_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(Some(dir.path().to_str().unwrap()));
        let blobstore = BlobStore::new(dir.path());

        let record = SessionRecord::new(declared(), 1024);
        let handle = record.handle;
        registry.create(record).await;

        let reaper = Reaper::new(registry.clone(), blobstore, 30, 30);
        let (aborted, _) = reaper.sweep().await;

        assert_eq!(aborted, 0);
        assert_eq!(registry.get(handle).unwrap().status, SessionStatus::Initialized);
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_completed_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(Some(dir.path().to_str().unwrap()));
        let blobstore = BlobStore::new(dir.path());

        let mut record = SessionRecord::new(declared(), 1024);
        record.status = SessionStatus::Completed;
        record.completed_at = Some(Utc::now() - ChronoDuration2::days(60));
        let handle = record.handle;
        registry.create(record).await;

        let reaper = Reaper::new(registry.clone(), blobstore, 30, 30);
        let (_, purged) = reaper.sweep().await;

        assert_eq!(purged, 1);
        assert!(registry.get(handle).is_none());
    }
}
