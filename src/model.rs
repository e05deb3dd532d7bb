//! Session Record, Chunk Object, and Final Object types (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unforgeable session identifier — a v4 UUID carries 122 bits of
/// entropy, comfortably above the ≥128-bit-equivalent unguessability bar.
pub type SessionHandle = Uuid;

/// Fields the client declares at `init` time, sanitized and validated
/// before a [`SessionRecord`] is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declared {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Initialized,
    Receiving,
    Assembling,
    Completed,
    Failed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Aborted
        )
    }
}

/// An error-kind tag plus a bounded message, recorded when a session
/// transitions to `Failed` or `Aborted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub kind: String,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        const MAX_MESSAGE_LEN: usize = 512;
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            message.truncate(MAX_MESSAGE_LEN);
        }
        Self {
            kind: kind.into(),
            message,
        }
    }
}

/// A dense bitmap of received chunk indices, bounded by `declared.total_chunks`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReceivedBitmap {
    bits: Vec<bool>,
}

impl ReceivedBitmap {
    pub fn new(total_chunks: u32) -> Self {
        Self {
            bits: vec![false; total_chunks as usize],
        }
    }

    /// Marks `index` received. Returns `true` if this is the first time
    /// this index was marked (i.e. not a duplicate acknowledgement).
    pub fn mark(&mut self, index: u32) -> bool {
        let idx = index as usize;
        if idx >= self.bits.len() {
            return false;
        }
        if self.bits[idx] {
            return false;
        }
        self.bits[idx] = true;
        true
    }

    pub fn contains(&self, index: u32) -> bool {
        self.bits.get(index as usize).copied().unwrap_or(false)
    }

    pub fn count(&self) -> u32 {
        self.bits.iter().filter(|b| **b).count() as u32
    }

    pub fn total(&self) -> u32 {
        self.bits.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        !self.bits.is_empty() && self.bits.iter().all(|b| *b)
    }

    pub fn received_indices(&self) -> Vec<u32> {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, received)| received.then_some(i as u32))
            .collect()
    }
}

/// The unit of state persisted per upload (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub handle: SessionHandle,
    pub declared: Declared,
    pub chunk_size: u64,
    pub received: ReceivedBitmap,
    pub bytes_received: u64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
    pub final_object: Option<FinalObject>,
}

impl SessionRecord {
    pub fn new(declared: Declared, chunk_size: u64) -> Self {
        let now = Utc::now();
        Self {
            handle: Uuid::new_v4(),
            received: ReceivedBitmap::new(declared.total_chunks),
            declared,
            chunk_size,
            bytes_received: 0,
            status: SessionStatus::Initialized,
            created_at: now,
            last_activity_at: now,
            completed_at: None,
            failure_reason: None,
            final_object: None,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            received_count: self.received.count(),
            total_count: self.received.total(),
            percentage: if self.received.total() == 0 {
                0.0
            } else {
                (self.received.count() as f64 / self.received.total() as f64) * 100.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub received_count: u32,
    pub total_count: u32,
    pub percentage: f64,
}

/// `{handle, name, size, mimeType, assembledAt, storagePath}` — created
/// atomically from the concatenation of chunks in index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalObject {
    pub handle: SessionHandle,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub assembled_at: DateTime<Utc>,
    pub storage_path: String,
}
