//! Upload Coordinator — library crate backing the `upload-coordinator`
//! binary and its integration tests.
//!
//! Server-side orchestration of resumable, chunked, concurrent upload of
//! large media objects. Issues upload handles, tracks per-session progress,
//! validates and persists chunks, enforces concurrency and safety policies,
//! assembles completed files, and reclaims abandoned work.

pub mod api;
pub mod blobstore;
pub mod config;
pub mod error;
pub mod model;
pub mod monitoring;
pub mod ratelimit;
pub mod reaper;
pub mod registry;
pub mod scheduler;
pub mod session_manager;
pub mod validator;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::Method,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use blobstore::BlobStore;
use config::Config;
use ratelimit::RateLimiters;
use reaper::Reaper;
use registry::SessionRegistry;
use scheduler::Scheduler;
use session_manager::{AppState, SessionManager};
use validator::Validator;

/// Everything `main` needs to start serving: the assembled router and the
/// reaper, still unspawned so callers (including tests) control its
/// lifecycle.
pub struct Coordinator {
    pub router: Router,
    pub reaper: Arc<Reaper>,
}

/// Wires the Registry, Validator, Scheduler, Blob Store and Session
/// Manager together and builds the HTTP router, following the teacher's
/// `main.rs` assembly order: load persisted state, construct components
/// bottom-up, merge per-area sub-routers, then layer CORS and tracing.
pub fn build(config: Config) -> Coordinator {
    let registry = SessionRegistry::new(Some(&config.upload_dir));
    let loaded = registry.load_from_disk();
    if loaded > 0 {
        tracing::info!(sessions = loaded, "restored sessions from disk");
    }

    let rate_limiters = RateLimiters::new(
        config.rate_limit_general,
        config.rate_limit_upload,
        config.rate_limit_monitoring,
    );
    let validator = Validator::new(rate_limiters);
    let scheduler = Scheduler::new(
        config.max_parallel_writes,
        config.max_parallel_per_session,
        config.max_queue_per_session,
        config.write_timeout_secs,
    );
    let blobstore = BlobStore::new(&config.upload_dir);

    let manager = Arc::new(SessionManager::new(
        registry.clone(),
        validator.clone(),
        scheduler,
        blobstore.clone(),
        config.clone(),
    ));

    let state = AppState {
        manager,
        validator: Arc::new(validator),
        registry: registry.clone(),
        config: config.clone(),
    };

    let reaper = Arc::new(Reaper::new(
        registry,
        blobstore,
        config.stale_threshold_minutes,
        config.retention_days,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let upload_router = Router::new()
        .route("/api/upload/init", post(api::init_upload))
        .route("/api/upload/chunk/:upload_id", post(api::put_chunk))
        .route("/api/upload/complete/:upload_id", post(api::complete_upload))
        .route("/api/upload/status/:upload_id", get(api::get_status))
        .route("/api/upload/:upload_id", delete(api::abort_upload));

    let monitoring_router = Router::new().route("/api/monitoring/stats", get(monitoring::get_stats));

    let router = Router::new()
        .merge(upload_router)
        .merge(monitoring_router)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Coordinator { router, reaper }
}

/// `ConnectInfo<SocketAddr>` is only meaningful behind a real listener;
/// tests that drive the router in-process via `tower::ServiceExt::oneshot`
/// inject a fixed address with this layer instead of binding a socket.
pub fn with_fake_connect_info(router: Router) -> Router {
    use axum::extract::connect_info::MockConnectInfo;
    router.layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
}
