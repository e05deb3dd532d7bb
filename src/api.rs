//! HTTP handlers for the upload coordinator API (§6).
//!
//! Generalizes the teacher's `ApiResponse<T>` envelope and multipart field
//! parsing (`upload_asset`) into the six upload-session endpoints.

use axum::{
    extract::{ConnectInfo, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::error::{CoordinatorError, Result};
use crate::session_manager::AppState;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        ok: true,
        data: Some(data),
    })
}

pub(crate) fn identity(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub total_chunks: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub upload_id: Uuid,
}

/// POST /api/upload/init
pub async fn init_upload(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<InitRequest>,
) -> Result<impl IntoResponse> {
    state.validator.check_general_rate(&identity(&addr))?;

    let handle = state
        .manager
        .init(
            &body.file_name,
            body.file_size,
            &body.file_type,
            body.total_chunks,
        )
        .await?;

    Ok((StatusCode::OK, ok(InitResponse { upload_id: handle })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub success: bool,
    pub progress: crate::model::Progress,
}

/// POST /api/upload/chunk/:uploadId
///
/// Multipart form fields: `chunkIndex`, `totalChunks`, `fileType`, `chunk` (binary).
pub async fn put_chunk(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(upload_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    state.validator.check_upload_rate(&identity(&addr))?;

    let mut chunk_index: Option<u32> = None;
    let mut total_chunks: Option<u32> = None;
    let mut file_type: Option<String> = None;
    let mut chunk: Option<Vec<u8>> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "chunkIndex" => {
                if let Ok(text) = field.text().await {
                    chunk_index = text.parse().ok();
                }
            }
            "totalChunks" => {
                if let Ok(text) = field.text().await {
                    total_chunks = text.parse().ok();
                }
            }
            "fileType" => {
                if let Ok(text) = field.text().await {
                    file_type = Some(text);
                }
            }
            "chunk" => {
                chunk = field.bytes().await.ok().map(|b| b.to_vec());
            }
            _ => {}
        }
    }

    let chunk_index =
        chunk_index.ok_or_else(|| CoordinatorError::BadRequest("missing field 'chunkIndex'".into()))?;
    let total_chunks = total_chunks
        .ok_or_else(|| CoordinatorError::BadRequest("missing field 'totalChunks'".into()))?;
    let file_type =
        file_type.ok_or_else(|| CoordinatorError::BadRequest("missing field 'fileType'".into()))?;
    let chunk = chunk.ok_or_else(|| CoordinatorError::BadRequest("missing field 'chunk'".into()))?;

    let snapshot = state
        .manager
        .put_chunk(upload_id, chunk_index, total_chunks, &file_type, chunk)
        .await?;

    Ok(ok(ChunkResponse {
        success: true,
        progress: snapshot.to_progress(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub success: bool,
    pub upload_speed: f64,
    pub status: &'static str,
}

/// POST /api/upload/complete/:uploadId
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.manager.complete(upload_id).await?;
    Ok(ok(CompleteResponse {
        success: true,
        upload_speed: outcome.average_bytes_per_sec,
        status: "completed",
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: crate::model::SessionStatus,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub progress: f64,
    pub received_indices: Vec<u32>,
}

/// GET /api/upload/status/:uploadId
pub async fn get_status(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.validator.check_general_rate(&identity(&addr))?;
    let snapshot = state.manager.status(upload_id)?;
    let resume = state.manager.resume(upload_id)?;
    Ok(ok(StatusResponse {
        status: snapshot.status,
        uploaded_chunks: snapshot.received_count,
        total_chunks: snapshot.total_count,
        progress: snapshot.percentage,
        received_indices: resume.received_indices,
    }))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// DELETE /api/upload/:uploadId
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.manager.abort(upload_id).await?;
    Ok(ok(DeleteResponse { success: true }))
}
