//! `GET /api/monitoring/stats` — aggregate counters derived from the
//! Registry. Mirrors the teacher's `stats_handler`/`info_handler` pattern
//! of assembling a response straight from state accessor methods, rather
//! than maintaining a separate metrics struct.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::error::Result;
use crate::model::SessionStatus;
use crate::session_manager::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_uploads: usize,
    pub active_uploads: usize,
    pub failed_uploads: usize,
    pub total_size: u64,
    pub average_speed: f64,
}

/// GET /api/monitoring/stats
pub async fn get_stats(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse> {
    state
        .validator
        .check_monitoring_rate(&crate::api::identity(&addr))?;

    let records = state.registry.all();

    let total_uploads = records.len();
    let active_uploads = records
        .iter()
        .filter(|r| matches!(r.status, SessionStatus::Initialized | SessionStatus::Receiving | SessionStatus::Assembling))
        .count();
    let failed_uploads = records
        .iter()
        .filter(|r| matches!(r.status, SessionStatus::Failed | SessionStatus::Aborted))
        .count();
    let total_size: u64 = records
        .iter()
        .filter(|r| r.status == SessionStatus::Completed)
        .map(|r| r.declared.file_size)
        .sum();

    let completed: Vec<_> = records
        .iter()
        .filter(|r| r.status == SessionStatus::Completed)
        .collect();
    let average_speed = if completed.is_empty() {
        0.0
    } else {
        let total_speed: f64 = completed
            .iter()
            .map(|r| {
                let completed_at = r.completed_at.unwrap_or(r.last_activity_at);
                let elapsed = (completed_at - r.created_at).num_milliseconds() as f64 / 1000.0;
                if elapsed <= 0.0 {
                    0.0
                } else {
                    r.bytes_received as f64 / elapsed
                }
            })
            .sum();
        total_speed / completed.len() as f64
    };

    Ok(Json(StatsResponse {
        total_uploads,
        active_uploads,
        failed_uploads,
        total_size,
        average_speed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Declared, SessionRecord};
    use crate::registry::SessionRegistry;

    fn declared() -> Declared {
        Declared {
            file_name: "a.jpg".into(),
            file_size: 1024,
            file_type: "image/jpeg".into(),
            total_chunks: 1,
        }
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let registry = SessionRegistry::new(None);

        let mut completed = SessionRecord::new(declared(), 1024);
        completed.status = SessionStatus::Completed;
        completed.completed_at = Some(chrono::Utc::now());
        registry.create(completed).await;

        let active = SessionRecord::new(declared(), 1024);
        registry.create(active).await;

        let mut failed = SessionRecord::new(declared(), 1024);
        failed.status = SessionStatus::Failed;
        registry.create(failed).await;

        let records = registry.all();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records
                .iter()
                .filter(|r| r.status == SessionStatus::Completed)
                .count(),
            1
        );
    }
}
