//! Axum server lifecycle
//!
//! Binds to the configured host/port (localhost by default) and serves the
//! JSON API until the shutdown notify fires.

use crate::config::with_config;
use crate::logger::{self, LogTag};
use crate::webserver::{routes, state::AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::compression::CompressionLayer;

/// Starts the webserver and blocks until shutdown
pub async fn start_server(shutdown: Arc<Notify>) -> Result<(), String> {
    let (host, port) = with_config(|c| (c.webserver.host.clone(), c.webserver.port));

    let state = Arc::new(AppState::new());
    let app = routes::create_router(state).layer(CompressionLayer::new());

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Could not bind webserver to {}: {}", addr, e))?;

    logger::success(LogTag::Webserver, &format!("API listening on http://{}", addr));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            logger::info(LogTag::Webserver, "Webserver shutting down");
        })
        .await
        .map_err(|e| format!("Webserver error: {}", e))
}
