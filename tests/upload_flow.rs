//! End-to-end scenarios exercising the assembled router in-process via
//! `tower::ServiceExt::oneshot`, grounded on the lib+bin test split used
//! elsewhere in the pack (e.g. reinhardt-debug-toolbar's integration tests).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use upload_coordinator::config::Config;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        upload_dir: dir.to_str().unwrap().to_string(),
        chunk_size: 1_048_576,
        max_file_size: 10 * 1024 * 1024,
        stale_threshold_minutes: 30,
        retention_days: 30,
        max_parallel_writes: 4,
        max_parallel_per_session: 2,
        max_queue_per_session: 4,
        write_timeout_secs: 5,
        rate_limit_general: 1000,
        rate_limit_upload: 1000,
        rate_limit_monitoring: 1000,
        ..Config::default()
    }
}

fn router(dir: &std::path::Path) -> axum::Router {
    let coordinator = upload_coordinator::build(test_config(dir));
    upload_coordinator::with_fake_connect_info(coordinator.router)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_chunk_body(
    boundary: &str,
    chunk_index: u32,
    total_chunks: u32,
    file_type: &str,
    payload: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    let mut push_field = |name: &str, value: &str| {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    };
    push_field("chunkIndex", &chunk_index.to_string());
    push_field("totalChunks", &total_chunks.to_string());
    push_field("fileType", file_type);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"chunk\"; filename=\"chunk.bin\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

async fn init_session(
    app: &axum::Router,
    file_name: &str,
    file_size: u64,
    file_type: &str,
) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload/init")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "fileName": file_name,
                        "fileSize": file_size,
                        "fileType": file_type,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["data"]["uploadId"].as_str().unwrap().to_string()
}

async fn put_chunk(
    app: &axum::Router,
    upload_id: &str,
    index: u32,
    total_chunks: u32,
    file_type: &str,
    payload: &[u8],
) -> axum::response::Response {
    let boundary = "X-TEST-BOUNDARY";
    let body = multipart_chunk_body(boundary, index, total_chunks, file_type, payload);

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/upload/chunk/{upload_id}"))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// S1 — small single-chunk happy path.
#[tokio::test]
async fn test_s1_small_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(dir.path());

    let upload_id = init_session(&app, "a.jpg", 1_048_576, "image/jpeg").await;

    let mut payload = vec![0xFFu8, 0xD8, 0xFF, 0x00];
    payload.extend(std::iter::repeat(0u8).take(1_048_576 - payload.len()));

    let response = put_chunk(&app, &upload_id, 0, 1, "image/jpeg", &payload).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/upload/complete/{upload_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "completed");

    let final_path = dir.path().join("final").join("a.jpg");
    let bytes = tokio::fs::read(&final_path).await.unwrap();
    assert_eq!(bytes.len(), 1_048_576);
}

/// S3 — out-of-order duplicate chunks still converge on exactly the
/// distinct set, with the duplicate acknowledged idempotently.
#[tokio::test]
async fn test_s3_out_of_order_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(dir.path());

    let upload_id = init_session(&app, "a.bin", 4 * 1_048_576, "application/octet-stream").await;
    let chunk = vec![0u8; 1_048_576];

    for index in [2, 0, 2, 1, 3] {
        let response = put_chunk(
            &app,
            &upload_id,
            index,
            4,
            "application/octet-stream",
            &chunk,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/upload/status/{upload_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["uploadedChunks"], 4);
    assert_eq!(body["data"]["totalChunks"], 4);
}

/// S4 — declared MIME disagrees with the observed magic number on chunk 0;
/// the session must remain untouched and no chunk persisted.
#[tokio::test]
async fn test_s4_magic_number_mismatch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(dir.path());

    let upload_id = init_session(&app, "a.png", 1_048_576, "image/png").await;
    let mut payload = vec![0xFFu8, 0xD8, 0xFF, 0x00]; // JPEG bytes, declared PNG
    payload.extend(std::iter::repeat(0u8).take(1_048_576 - payload.len()));

    let response = put_chunk(&app, &upload_id, 0, 1, "image/png", &payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/upload/status/{upload_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "initialized");
    assert_eq!(body["data"]["uploadedChunks"], 0);
}

/// Completion is idempotent and aborting an already-terminal session is a
/// no-op success rather than an error.
#[tokio::test]
async fn test_abort_and_complete_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(dir.path());

    let upload_id = init_session(&app, "a.txt", 1024, "text/plain").await;
    put_chunk(&app, &upload_id, 0, 1, "text/plain", &vec![0u8; 1024]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/upload/{upload_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/upload/{upload_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Monitoring stats reflect the aggregate state of the Registry.
#[tokio::test]
async fn test_monitoring_stats_reflects_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(dir.path());

    init_session(&app, "a.txt", 1024, "text/plain").await;
    init_session(&app, "b.txt", 1024, "text/plain").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/monitoring/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["totalUploads"], 2);
    assert_eq!(body["activeUploads"], 2);
}
