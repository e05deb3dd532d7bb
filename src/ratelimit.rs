//! Token-bucket rate limiting, keyed per client identity (best-effort: IP
//! address when no stronger identity is available).
//!
//! Generalizes the single fixed-window counter the teacher's asset store
//! used per-uploader-DID into a proper token bucket with continuous
//! refill, and gives each of the three named buckets (general, upload,
//! monitoring) independent state per client.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

/// One caller's bucket: `tokens` available, last refreshed at `updated_at`.
struct Bucket {
    tokens: f64,
    updated_at_millis: i64,
}

/// A single named token bucket (capacity + refill rate) shared across all
/// client identities, each tracked independently.
#[derive(Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_milli: f64,
    buckets: Arc<DashMap<String, Bucket>>,
}

impl TokenBucket {
    /// `capacity` tokens refill fully every `window_secs` seconds.
    pub fn new(capacity: u32, window_secs: u64) -> Self {
        let capacity = capacity as f64;
        Self {
            capacity,
            refill_per_milli: capacity / (window_secs as f64 * 1000.0),
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Attempts to consume one token for `identity`. Returns `Ok(())` if
    /// admitted, or `Err(retry_after_secs)` if denied.
    pub fn try_consume(&self, identity: &str) -> Result<(), u64> {
        let now = Utc::now().timestamp_millis();
        let mut entry = self.buckets.entry(identity.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            updated_at_millis: now,
        });

        let elapsed = (now - entry.updated_at_millis).max(0) as f64;
        entry.tokens = (entry.tokens + elapsed * self.refill_per_milli).min(self.capacity);
        entry.updated_at_millis = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - entry.tokens;
            let millis_needed = (deficit / self.refill_per_milli).ceil() as u64;
            Err((millis_needed / 1000).max(1))
        }
    }
}

/// The three independent buckets named in the validator contract.
#[derive(Clone)]
pub struct RateLimiters {
    pub general: TokenBucket,
    pub upload: TokenBucket,
    pub monitoring: TokenBucket,
}

impl RateLimiters {
    pub fn new(general_capacity: u32, upload_capacity: u32, monitoring_capacity: u32) -> Self {
        Self {
            general: TokenBucket::new(general_capacity, 60),
            upload: TokenBucket::new(upload_capacity, 60),
            monitoring: TokenBucket::new(monitoring_capacity, 60),
        }
    }
}
