//! Append-only chunk persistence and atomic assembly (§4.1).
//!
//! Chunks are staged under `<UPLOAD_DIR>/chunks/<handle>-<index>`; the
//! assembled object lands under `<UPLOAD_DIR>/final/<sanitized-name>` via
//! write-to-temp-then-rename, the same atomic-publish idiom the teacher's
//! asset and bridge stores use for every durable write.

use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{CoordinatorError, Result};
use crate::model::SessionHandle;

/// Bytes of headroom required beyond the incoming write before it is
/// accepted — guards against a write that lands exactly on the limit and
/// leaves the filesystem with zero free space for metadata operations.
const DISK_HEADROOM_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: upload_dir.into(),
        }
    }

    fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    fn final_dir(&self) -> PathBuf {
        self.root.join("final")
    }

    fn chunk_path(&self, handle: SessionHandle, index: u32) -> PathBuf {
        self.chunks_dir().join(format!("{}-{}", handle, index))
    }

    /// Probes available free space on the filesystem backing `path`'s
    /// nearest existing ancestor. Returns `None` if no disk could be
    /// matched (fails open — callers then skip the space check rather
    /// than block uploads on a broken probe).
    fn available_space(path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();

        let mut probe = path.to_path_buf();
        while !probe.exists() {
            probe = probe.parent()?.to_path_buf();
        }

        disks
            .iter()
            .filter(|disk| probe.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    fn ensure_space_for(&self, additional_bytes: u64) -> Result<()> {
        if let Some(available) = Self::available_space(&self.root) {
            if available < additional_bytes + DISK_HEADROOM_BYTES {
                return Err(CoordinatorError::Exhausted);
            }
        }
        Ok(())
    }

    /// Writes one chunk's payload to staging, flushing before returning so
    /// the write is durable by the time the caller acknowledges it.
    pub async fn write_chunk(
        &self,
        handle: SessionHandle,
        index: u32,
        bytes: &[u8],
    ) -> Result<()> {
        self.ensure_space_for(bytes.len() as u64)?;

        let dir = self.chunks_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;

        let path = self.chunk_path(handle, index);
        let tmp_path = path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
        file.write_all(bytes)
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
        drop(file);

        // Last-writer-wins: a rename overwrites any prior staged payload
        // for this (handle, index), resolving concurrent duplicate writes
        // to exactly one persisted chunk.
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;

        Ok(())
    }

    pub async fn read_chunk(&self, handle: SessionHandle, index: u32) -> Result<Vec<u8>> {
        tokio::fs::read(self.chunk_path(handle, index))
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))
    }

    /// Concatenates chunks in ascending index order into a temporary file
    /// under the final namespace, then performs an atomic rename so a
    /// partially assembled object never becomes visible under its final
    /// name. Buffers at most one chunk in memory at a time.
    pub async fn assemble(
        &self,
        handle: SessionHandle,
        ordered_indices: &[u32],
        out_name: &str,
    ) -> Result<PathBuf> {
        let dir = self.final_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;

        let final_path = dir.join(out_name);
        let tmp_path = dir.join(format!("{}.assembling", handle));

        {
            let mut out = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;

            for &index in ordered_indices {
                let mut chunk = tokio::fs::File::open(self.chunk_path(handle, index))
                    .await
                    .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
                let mut buffer = Vec::new();
                chunk
                    .read_to_end(&mut buffer)
                    .await
                    .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
                out.write_all(&buffer)
                    .await
                    .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
            }
            out.flush()
                .await
                .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
            out.sync_all()
                .await
                .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;
        }

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| CoordinatorError::IOFailure(e.to_string()))?;

        Ok(final_path)
    }

    /// Removes staging chunks first, then the final object if requested.
    /// Failures are logged but never propagated — cleanup must not block
    /// a Registry state change.
    pub async fn delete_session_artifacts(
        &self,
        handle: SessionHandle,
        total_chunks: u32,
        final_name: Option<&str>,
    ) {
        for index in 0..total_chunks {
            let path = self.chunk_path(handle, index);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, handle = %handle, index, "failed to remove staged chunk");
                }
            }
        }

        if let Some(name) = final_name {
            let path = self.final_dir().join(name);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, handle = %handle, "failed to remove final object");
                }
            }
        }
    }
}
