//! Optional debug endpoint served while a scan runs.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;
use tracing::info;

async fn healthz() -> &'static str {
    "ok"
}

async fn build_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Serve `/healthz` and `/debug/info` until the shutdown flag flips.
pub async fn serve(addr: SocketAddr, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/debug/info", get(build_info));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "debug endpoint serving");

    let mut shutdown = shutdown;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("debug endpoint stopped");
    Ok(())
}
