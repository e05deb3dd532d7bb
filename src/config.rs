//! Process-wide configuration, parsed once at startup.

use clap::Parser;

/// Default server-imposed chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Authoritative server-side max file size. The source material caps at
/// 100 MiB (web) or 2 GiB (mobile); the larger of the two is authoritative
/// here, and is explicit and configurable rather than inconsistent.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "upload-coordinator", version, about = "Resumable chunked upload coordinator")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "COORDINATOR_PORT")]
    pub port: u16,

    /// Root directory for on-disk chunk staging, final objects, and session persistence
    #[arg(long, default_value = "./data", env = "UPLOAD_DIR")]
    pub upload_dir: String,

    /// Server-imposed maximum chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "CHUNK_SIZE")]
    pub chunk_size: u64,

    /// Maximum accepted declared file size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE, env = "MAX_FILE_SIZE")]
    pub max_file_size: u64,

    /// Retention period for completed sessions' artifacts, in days
    #[arg(long, default_value_t = 30, env = "RETENTION_DAYS")]
    pub retention_days: i64,

    /// Minutes of inactivity before a non-terminal session is reaped
    #[arg(long, default_value_t = 30, env = "STALE_THRESHOLD_MINUTES")]
    pub stale_threshold_minutes: i64,

    /// Seconds between reaper sweeps
    #[arg(long, default_value_t = 300, env = "REAPER_INTERVAL_SECS")]
    pub reaper_interval_secs: u64,

    /// Maximum chunk writes in flight across all sessions
    #[arg(long, default_value_t = 16, env = "MAX_PARALLEL_WRITES")]
    pub max_parallel_writes: usize,

    /// Maximum chunk writes in flight per session
    #[arg(long, default_value_t = 3, env = "MAX_PARALLEL_PER_SESSION")]
    pub max_parallel_per_session: usize,

    /// Maximum queued (not yet admitted) chunk requests per session
    #[arg(long, default_value_t = 16, env = "MAX_QUEUE_PER_SESSION")]
    pub max_queue_per_session: usize,

    /// Wall-clock deadline for an admitted chunk write, in seconds
    #[arg(long, default_value_t = 30, env = "WRITE_TIMEOUT_SECS")]
    pub write_timeout_secs: u64,

    /// General-purpose token bucket capacity per client identity (per 60s window)
    #[arg(long, default_value_t = 100, env = "RATE_LIMIT_GENERAL")]
    pub rate_limit_general: u32,

    /// Upload token bucket capacity per client identity (per 60s window)
    #[arg(long, default_value_t = 1000, env = "RATE_LIMIT_UPLOAD")]
    pub rate_limit_upload: u32,

    /// Monitoring-endpoint token bucket capacity per client identity (per 60s window)
    #[arg(long, default_value_t = 500, env = "RATE_LIMIT_MONITORING")]
    pub rate_limit_monitoring: u32,
}

/// Resolved, process-wide configuration. Read once at startup and shared
/// behind an `Arc` by every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upload_dir: String,
    pub chunk_size: u64,
    pub max_file_size: u64,
    pub retention_days: i64,
    pub stale_threshold_minutes: i64,
    pub reaper_interval_secs: u64,
    pub max_parallel_writes: usize,
    pub max_parallel_per_session: usize,
    pub max_queue_per_session: usize,
    pub write_timeout_secs: u64,
    pub rate_limit_general: u32,
    pub rate_limit_upload: u32,
    pub rate_limit_monitoring: u32,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            upload_dir: args.upload_dir,
            chunk_size: args.chunk_size,
            max_file_size: args.max_file_size,
            retention_days: args.retention_days,
            stale_threshold_minutes: args.stale_threshold_minutes,
            reaper_interval_secs: args.reaper_interval_secs,
            max_parallel_writes: args.max_parallel_writes,
            max_parallel_per_session: args.max_parallel_per_session,
            max_queue_per_session: args.max_queue_per_session,
            write_timeout_secs: args.write_timeout_secs,
            rate_limit_general: args.rate_limit_general,
            rate_limit_upload: args.rate_limit_upload,
            rate_limit_monitoring: args.rate_limit_monitoring,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            upload_dir: "./data".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            retention_days: 30,
            stale_threshold_minutes: 30,
            reaper_interval_secs: 300,
            max_parallel_writes: 16,
            max_parallel_per_session: 3,
            max_queue_per_session: 16,
            write_timeout_secs: 30,
            rate_limit_general: 100,
            rate_limit_upload: 1000,
            rate_limit_monitoring: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_parallel_writes, 16);
        assert_eq!(config.max_parallel_per_session, 3);
        assert_eq!(config.stale_threshold_minutes, 30);
    }
}
