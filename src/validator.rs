//! Pre-acceptance checks on declared and observed chunk properties (§4.3).
//!
//! Four layers applied in order, short-circuiting on the first rejection:
//! structural bounds, declared MIME allow-list, magic-number sniff on the
//! first chunk, and per-client rate limiting.

use crate::error::{CoordinatorError, Result};
use crate::model::{Declared, SessionRecord, SessionStatus};
use crate::ratelimit::RateLimiters;

/// MIME types accepted for a declared upload.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "video/mp4",
    "video/webm",
    "application/pdf",
    "text/plain",
    "application/octet-stream",
];

/// Leading bytes a chunk-0 payload must match for its declared MIME type.
/// MIME types absent from this table (pdf, text/plain, octet-stream) have
/// no magic-number rule and are accepted unconditionally.
fn magic_number_for(mime: &str) -> Option<&'static [u8]> {
    match mime {
        "image/jpeg" => Some(&[0xFF, 0xD8, 0xFF]),
        "image/png" => Some(&[0x89, 0x50, 0x4E, 0x47]),
        "image/gif" => Some(&[0x47, 0x49, 0x46, 0x38]),
        "video/mp4" => Some(&[0x00, 0x00, 0x00, 0x20, 0x66, 0x74, 0x79, 0x70]),
        "video/webm" => Some(&[0x1A, 0x45, 0xDF, 0xA3]),
        _ => None,
    }
}

#[derive(Clone)]
pub struct Validator {
    rate_limiters: RateLimiters,
}

impl Validator {
    pub fn new(rate_limiters: RateLimiters) -> Self {
        Self { rate_limiters }
    }

    /// Validates declared fields at `init` time.
    pub fn validate_init(
        &self,
        file_name: &str,
        file_size: u64,
        file_type: &str,
        max_file_size: u64,
    ) -> Result<String> {
        let sanitized = sanitize_file_name(file_name)?;

        if file_size == 0 {
            return Err(CoordinatorError::BadRequest(
                "declared file size must be greater than zero".into(),
            ));
        }
        if file_size > max_file_size {
            return Err(CoordinatorError::BadRequest(format!(
                "declared file size {} exceeds maximum {}",
                file_size, max_file_size
            )));
        }
        if !ALLOWED_MIME_TYPES.contains(&file_type) {
            return Err(CoordinatorError::BadRequest(format!(
                "unsupported MIME type '{}'",
                file_type
            )));
        }

        Ok(sanitized)
    }

    /// Structural + declared-type layers for an incoming chunk, plus the
    /// consistency check (`Conflict`) against the record's declared fields.
    pub fn validate_chunk_structural(
        &self,
        record: &SessionRecord,
        index: u32,
        chunk_len: usize,
        declared_total_chunks: u32,
        declared_file_type: &str,
    ) -> Result<()> {
        if !matches!(
            record.status,
            SessionStatus::Initialized | SessionStatus::Receiving
        ) {
            return Err(CoordinatorError::Cancelled);
        }

        if declared_total_chunks != record.declared.total_chunks {
            return Err(CoordinatorError::Conflict(
                "totalChunks does not match the session's declared value".into(),
            ));
        }
        if declared_file_type != record.declared.file_type {
            return Err(CoordinatorError::Conflict(
                "fileType does not match the session's declared value".into(),
            ));
        }

        if index >= record.declared.total_chunks {
            return Err(CoordinatorError::BadRequest(format!(
                "chunk index {} out of range [0, {})",
                index, record.declared.total_chunks
            )));
        }

        let is_final_chunk = index == record.declared.total_chunks - 1;
        if chunk_len as u64 > record.chunk_size {
            return Err(CoordinatorError::BadRequest(format!(
                "chunk size {} exceeds maximum {}",
                chunk_len, record.chunk_size
            )));
        }
        if !is_final_chunk && (chunk_len as u64) < record.chunk_size {
            return Err(CoordinatorError::BadRequest(
                "only the final chunk may be smaller than the chunk size".into(),
            ));
        }

        if !ALLOWED_MIME_TYPES.contains(&declared_file_type) {
            return Err(CoordinatorError::BadRequest(format!(
                "unsupported MIME type '{}'",
                declared_file_type
            )));
        }

        Ok(())
    }

    /// Magic-number sniff, applied only to chunk index 0.
    pub fn validate_magic_number(&self, mime: &str, index: u32, payload: &[u8]) -> Result<()> {
        if index != 0 {
            return Ok(());
        }
        let Some(expected) = magic_number_for(mime) else {
            return Ok(());
        };
        if payload.len() < expected.len() || &payload[..expected.len()] != expected {
            return Err(CoordinatorError::BadRequest(format!(
                "chunk 0 does not begin with the magic bytes expected for '{}'",
                mime
            )));
        }
        Ok(())
    }

    pub fn check_general_rate(&self, identity: &str) -> Result<()> {
        self.rate_limiters
            .general
            .try_consume(identity)
            .map_err(|retry_after_secs| CoordinatorError::RateLimited { retry_after_secs })
    }

    pub fn check_upload_rate(&self, identity: &str) -> Result<()> {
        self.rate_limiters
            .upload
            .try_consume(identity)
            .map_err(|retry_after_secs| CoordinatorError::RateLimited { retry_after_secs })
    }

    pub fn check_monitoring_rate(&self, identity: &str) -> Result<()> {
        self.rate_limiters
            .monitoring
            .try_consume(identity)
            .map_err(|retry_after_secs| CoordinatorError::RateLimited { retry_after_secs })
    }
}

/// Strips path separators and parent-directory references from a
/// client-declared file name; rejects empty or still-unsafe results.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let candidate = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(CoordinatorError::BadRequest(
            "file name is empty after sanitization".into(),
        ));
    }

    Ok(candidate.to_string())
}

/// `totalChunks = ⌈size / chunkSize⌉`.
pub fn expected_total_chunks(declared: &Declared, chunk_size: u64) -> u32 {
    ((declared.file_size + chunk_size - 1) / chunk_size) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionRecord;

    fn limiters() -> RateLimiters {
        RateLimiters::new(100, 1000, 500)
    }

    fn declared() -> Declared {
        Declared {
            file_name: "a.jpg".into(),
            file_size: 1_048_576,
            file_type: "image/jpeg".into(),
            total_chunks: 1,
        }
    }

    #[test]
    fn test_sanitize_strips_path_separators() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("a/b/c.jpg").unwrap(), "c.jpg");
        assert_eq!(sanitize_file_name("plain.png").unwrap(), "plain.png");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("/").is_err());
    }

    #[test]
    fn test_validate_init_rejects_zero_size() {
        let validator = Validator::new(limiters());
        let result = validator.validate_init("a.jpg", 0, "image/jpeg", 2_000_000_000);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_init_rejects_oversize() {
        let validator = Validator::new(limiters());
        let result = validator.validate_init("a.jpg", 10_000, "image/jpeg", 5_000);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_init_rejects_unknown_mime() {
        let validator = Validator::new(limiters());
        let result = validator.validate_init("a.exe", 100, "application/x-executable", 2_000_000_000);
        assert!(result.is_err());
    }

    #[test]
    fn test_magic_number_jpeg_matches() {
        let validator = Validator::new(limiters());
        let payload = [0xFF, 0xD8, 0xFF, 0x00];
        assert!(validator
            .validate_magic_number("image/jpeg", 0, &payload)
            .is_ok());
    }

    #[test]
    fn test_magic_number_mismatch_rejected() {
        let validator = Validator::new(limiters());
        // declares png but sends jpeg bytes
        let payload = [0xFF, 0xD8, 0xFF, 0x00];
        assert!(validator
            .validate_magic_number("image/png", 0, &payload)
            .is_err());
    }

    #[test]
    fn test_magic_number_only_checked_on_first_chunk() {
        let validator = Validator::new(limiters());
        let payload = [0x00, 0x00, 0x00, 0x00];
        assert!(validator
            .validate_magic_number("image/png", 1, &payload)
            .is_ok());
    }

    #[test]
    fn test_magic_number_skipped_for_untabled_mime() {
        let validator = Validator::new(limiters());
        let payload = [0x00, 0x00];
        assert!(validator
            .validate_magic_number("text/plain", 0, &payload)
            .is_ok());
    }

    #[test]
    fn test_structural_rejects_out_of_range_index() {
        let validator = Validator::new(limiters());
        let record = SessionRecord::new(declared(), 1_048_576);
        let result = validator.validate_chunk_structural(&record, 5, 100, 1, "image/jpeg");
        assert!(result.is_err());
    }

    #[test]
    fn test_structural_rejects_oversize_chunk() {
        let validator = Validator::new(limiters());
        let mut d = declared();
        d.total_chunks = 2;
        d.file_size = 2_097_152;
        let record = SessionRecord::new(d, 1_048_576);
        let result =
            validator.validate_chunk_structural(&record, 0, 2_000_000, 2, "image/jpeg");
        assert!(result.is_err());
    }

    #[test]
    fn test_structural_allows_smaller_final_chunk() {
        let validator = Validator::new(limiters());
        let mut d = declared();
        d.total_chunks = 2;
        d.file_size = 1_500_000;
        let record = SessionRecord::new(d, 1_048_576);
        let result = validator.validate_chunk_structural(&record, 1, 451_424, 2, "image/jpeg");
        assert!(result.is_ok());
    }

    #[test]
    fn test_structural_rejects_non_final_short_chunk() {
        let validator = Validator::new(limiters());
        let mut d = declared();
        d.total_chunks = 2;
        d.file_size = 1_500_000;
        let record = SessionRecord::new(d, 1_048_576);
        let result = validator.validate_chunk_structural(&record, 0, 500_000, 2, "image/jpeg");
        assert!(result.is_err());
    }

    #[test]
    fn test_structural_rejects_terminal_session() {
        let validator = Validator::new(limiters());
        let mut record = SessionRecord::new(declared(), 1_048_576);
        record.status = SessionStatus::Aborted;
        let result = validator.validate_chunk_structural(&record, 0, 1_048_576, 1, "image/jpeg");
        assert!(matches!(result, Err(CoordinatorError::Cancelled)));
    }

    #[test]
    fn test_structural_rejects_mismatched_declared_fields() {
        let validator = Validator::new(limiters());
        let record = SessionRecord::new(declared(), 1_048_576);
        let result = validator.validate_chunk_structural(&record, 0, 1_048_576, 99, "image/jpeg");
        assert!(matches!(result, Err(CoordinatorError::Conflict(_))));
    }

    #[test]
    fn test_expected_total_chunks_rounds_up() {
        let declared = Declared {
            file_name: "a".into(),
            file_size: 1_500_000,
            file_type: "image/jpeg".into(),
            total_chunks: 0,
        };
        assert_eq!(expected_total_chunks(&declared, 1_048_576), 2);
    }
}
