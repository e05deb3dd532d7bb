//! Session Manager — orchestrates the Validator, Scheduler, Blob Store and
//! Registry across the upload session state machine (§4.5, §3).

use std::sync::Arc;

use chrono::Utc;

use crate::blobstore::BlobStore;
use crate::config::Config;
use crate::error::{CoordinatorError, Result};
use crate::model::{Declared, FailureReason, FinalObject, SessionHandle, SessionRecord, SessionStatus};
use crate::registry::SessionRegistry;
use crate::scheduler::Scheduler;
use crate::validator::{expected_total_chunks, Validator};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub handle: SessionHandle,
    pub status: SessionStatus,
    pub received_count: u32,
    pub total_count: u32,
    pub percentage: f64,
    pub final_object: Option<FinalObject>,
    pub failure_reason: Option<FailureReason>,
}

impl StatusSnapshot {
    pub fn to_progress(&self) -> crate::model::Progress {
        crate::model::Progress {
            received_count: self.received_count,
            total_count: self.total_count,
            percentage: self.percentage,
        }
    }
}

/// Result of a successful `complete()` call, carrying the throughput
/// figure the external `/complete` contract reports alongside the object.
#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    pub final_object: FinalObject,
    pub average_bytes_per_sec: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInfo {
    pub received_indices: Vec<u32>,
    pub total_count: u32,
    pub chunk_size: u64,
}

pub struct SessionManager {
    registry: SessionRegistry,
    validator: Validator,
    scheduler: Scheduler,
    blobstore: BlobStore,
    config: Config,
}

impl SessionManager {
    pub fn new(
        registry: SessionRegistry,
        validator: Validator,
        scheduler: Scheduler,
        blobstore: BlobStore,
        config: Config,
    ) -> Self {
        Self {
            registry,
            validator,
            scheduler,
            blobstore,
            config,
        }
    }

    /// Validates and records a new upload's declared intent, returning the
    /// handle the client will use for every subsequent call. If the client
    /// declares a `total_chunks`, it must agree with the server's own
    /// `⌈size/chunkSize⌉` computation.
    pub async fn init(
        &self,
        file_name: &str,
        file_size: u64,
        file_type: &str,
        declared_total_chunks: Option<u32>,
    ) -> Result<SessionHandle> {
        let sanitized_name =
            self.validator
                .validate_init(file_name, file_size, file_type, self.config.max_file_size)?;

        let computed_total_chunks = expected_total_chunks(
            &Declared {
                file_name: String::new(),
                file_size,
                file_type: String::new(),
                total_chunks: 0,
            },
            self.config.chunk_size,
        );

        if let Some(declared) = declared_total_chunks {
            if declared != computed_total_chunks {
                return Err(CoordinatorError::BadRequest(format!(
                    "declared totalChunks {} does not match expected {} for chunkSize {}",
                    declared, computed_total_chunks, self.config.chunk_size
                )));
            }
        }

        let declared = Declared {
            file_name: sanitized_name,
            file_size,
            file_type: file_type.to_string(),
            total_chunks: computed_total_chunks,
        };

        let record = SessionRecord::new(declared, self.config.chunk_size);
        let handle = record.handle;
        self.registry.create(record).await;
        Ok(handle)
    }

    /// Accepts one chunk: structural + magic-number validation, a
    /// scheduled durable write, then a Registry update marking the index
    /// received. Duplicate chunks for an already-marked index are
    /// accepted idempotently without rewriting storage.
    pub async fn put_chunk(
        &self,
        handle: SessionHandle,
        index: u32,
        declared_total_chunks: u32,
        declared_file_type: &str,
        payload: Vec<u8>,
    ) -> Result<StatusSnapshot> {
        let record = self.registry.get(handle).ok_or(CoordinatorError::NotFound)?;

        self.validator.validate_chunk_structural(
            &record,
            index,
            payload.len(),
            declared_total_chunks,
            declared_file_type,
        )?;

        if record.received.contains(index) {
            return self.status(handle);
        }

        self.validator
            .validate_magic_number(&record.declared.file_type, index, &payload)?;

        if record.status == SessionStatus::Initialized {
            self.registry
                .update(handle, |r| {
                    r.status = SessionStatus::Receiving;
                    Ok(())
                })
                .await?;
        }

        let payload_len = payload.len() as u64;
        let blobstore = self.blobstore.clone();
        self.scheduler
            .schedule(handle, move || async move {
                blobstore.write_chunk(handle, index, &payload).await
            })
            .await?;

        let updated = self
            .registry
            .update(handle, move |r| {
                if r.received.mark(index) {
                    r.bytes_received += payload_len;
                }
                Ok(())
            })
            .await?;

        Ok(self.snapshot(&updated))
    }

    /// Idempotent completion: if the session is already `Completed`,
    /// returns the existing final object rather than reassembling.
    pub async fn complete(&self, handle: SessionHandle) -> Result<CompleteOutcome> {
        let record = self.registry.get(handle).ok_or(CoordinatorError::NotFound)?;

        if record.status == SessionStatus::Completed {
            let final_object = record.final_object.clone().ok_or(CoordinatorError::NotFound)?;
            return Ok(CompleteOutcome {
                average_bytes_per_sec: Self::average_speed(&record),
                final_object,
            });
        }
        if record.status.is_terminal() {
            return Err(CoordinatorError::Cancelled);
        }
        if !record.received.is_complete() {
            return Err(CoordinatorError::BadRequest(
                "not all chunks have been received".into(),
            ));
        }

        self.registry
            .update(handle, |r| {
                r.status = SessionStatus::Assembling;
                Ok(())
            })
            .await?;

        let ordered_indices: Vec<u32> = (0..record.declared.total_chunks).collect();
        let assemble_result = self
            .blobstore
            .assemble(handle, &ordered_indices, &record.declared.file_name)
            .await;

        let storage_path = match assemble_result {
            Ok(path) => path,
            Err(e) => {
                self.registry
                    .update(handle, |r| {
                        r.status = SessionStatus::Failed;
                        r.failure_reason = Some(FailureReason::new("IOFailure", e.to_string()));
                        Ok(())
                    })
                    .await?;
                return Err(e);
            }
        };

        let final_object = FinalObject {
            handle,
            name: record.declared.file_name.clone(),
            size: record.declared.file_size,
            mime_type: record.declared.file_type.clone(),
            assembled_at: Utc::now(),
            storage_path: storage_path.display().to_string(),
        };

        self.scheduler.forget_session(handle).await;
        self.blobstore
            .delete_session_artifacts(handle, record.declared.total_chunks, None)
            .await;

        let final_object_for_registry = final_object.clone();
        let completed = self
            .registry
            .update(handle, move |r| {
                r.status = SessionStatus::Completed;
                r.completed_at = Some(Utc::now());
                r.final_object = Some(final_object_for_registry.clone());
                Ok(())
            })
            .await?;

        Ok(CompleteOutcome {
            average_bytes_per_sec: Self::average_speed(&completed),
            final_object,
        })
    }

    /// Bytes received divided by the wall-clock span from session creation
    /// to completion; `0.0` for a sub-millisecond upload to avoid dividing
    /// by zero.
    fn average_speed(record: &SessionRecord) -> f64 {
        let completed_at = record.completed_at.unwrap_or_else(Utc::now);
        let elapsed_secs = (completed_at - record.created_at).num_milliseconds() as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            0.0
        } else {
            record.bytes_received as f64 / elapsed_secs
        }
    }

    pub fn status(&self, handle: SessionHandle) -> Result<StatusSnapshot> {
        let record = self.registry.get(handle).ok_or(CoordinatorError::NotFound)?;
        Ok(self.snapshot(&record))
    }

    pub fn resume(&self, handle: SessionHandle) -> Result<ResumeInfo> {
        let record = self.registry.get(handle).ok_or(CoordinatorError::NotFound)?;
        Ok(ResumeInfo {
            received_indices: record.received.received_indices(),
            total_count: record.received.total(),
            chunk_size: record.chunk_size,
        })
    }

    /// Idempotent abort: a second call on an already-terminal session is a
    /// no-op success rather than an error.
    pub async fn abort(&self, handle: SessionHandle) -> Result<()> {
        let record = self.registry.get(handle).ok_or(CoordinatorError::NotFound)?;
        if record.status.is_terminal() {
            return Ok(());
        }

        self.registry
            .update(handle, |r| {
                r.status = SessionStatus::Aborted;
                Ok(())
            })
            .await?;

        self.scheduler.forget_session(handle).await;
        self.blobstore
            .delete_session_artifacts(
                handle,
                record.declared.total_chunks,
                record.final_object.as_ref().map(|f| f.name.as_str()),
            )
            .await;

        Ok(())
    }

    fn snapshot(&self, record: &SessionRecord) -> StatusSnapshot {
        let progress = record.progress();
        StatusSnapshot {
            handle: record.handle,
            status: record.status,
            received_count: progress.received_count,
            total_count: progress.total_count,
            percentage: progress.percentage,
            final_object: record.final_object.clone(),
            failure_reason: record.failure_reason.clone(),
        }
    }
}

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub validator: Arc<Validator>,
    pub registry: SessionRegistry,
    pub config: Config,
}
