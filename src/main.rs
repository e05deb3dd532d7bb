//! Upload Coordinator
//!
//! Client-side UI, mobile permission handling, the monitoring dashboard's
//! front end, and transport framing are out of scope — this binary exposes
//! only the HTTP contract those collaborators speak against.

use std::net::SocketAddr;

use clap::Parser;
use upload_coordinator::config::{Args, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upload_coordinator=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let config: Config = args.into();
    let port = config.port;

    let coordinator = upload_coordinator::build(config.clone());
    coordinator.reaper.clone().spawn(config.reaper_interval_secs);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!(%addr, "upload coordinator starting");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    axum::serve(
        listener,
        coordinator
            .router
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");
}

/// Waits for SIGINT or, on unix, SIGTERM, so in-flight writes and the
/// reaper get a chance to finish before process exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
