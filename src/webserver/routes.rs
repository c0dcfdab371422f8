//! Route handlers
//!
//! All payloads are JSON; reads come from the trade store and the in-memory
//! pipeline state, so handlers never block on the broker except where the
//! endpoint exists to do exactly that.

use crate::approval;
use crate::broker::broker;
use crate::config::with_config;
use crate::database;
use crate::ingestion;
use crate::learning;
use crate::logger::{self, LogTag};
use crate::signal;
use crate::telegram;
use crate::webserver::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Builds the full API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api_info))
        .route("/api/status", get(status))
        .route("/api/positions", get(positions))
        .route("/api/signals/pending", get(pending_signals))
        .route("/api/signals/history", get(signal_history))
        .route("/api/performance", get(performance))
        .route("/api/analyse/:symbol", get(analyse_symbol))
        .route("/api/telegram/test", post(telegram_test))
        .route("/api/broker/login", post(broker_login))
        .with_state(state)
}

async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "stockagent",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /api/status",
            "GET /api/positions",
            "GET /api/signals/pending",
            "GET /api/signals/history?days=N",
            "GET /api/performance",
            "GET /api/analyse/:symbol",
            "POST /api/telegram/test",
            "POST /api/broker/login",
        ],
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let simulation = crate::config::utils::is_simulation_mode();
    let (auto_mode, watchlist_size) =
        with_config(|c| (c.execution.auto_mode, c.watchlist.len()));
    let open_positions = database::store()
        .and_then(|s| s.open_positions())
        .map(|p| p.len())
        .unwrap_or(0);

    Json(json!({
        "status": "RUNNING",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "mode": if simulation { "SIMULATION" } else { "LIVE" },
        "auto_mode": auto_mode,
        "broker_authenticated": broker().is_authenticated().await,
        "telegram_connected": telegram::test_connection().await,
        "pending_signals": approval::pending_count().await,
        "open_positions": open_positions,
        "cached_symbols": ingestion::cached_symbol_count().await,
        "refresh_in_progress": ingestion::is_refresh_in_progress(),
        "watchlist_size": watchlist_size,
    }))
}

async fn positions() -> Json<Value> {
    let open = database::store()
        .and_then(|s| s.open_positions())
        .unwrap_or_default();
    Json(json!(open))
}

async fn pending_signals() -> Json<Value> {
    // The gateway's in-memory map is the authoritative pending state
    let pending = approval::pending_proposals().await;
    Json(json!(pending))
}

#[derive(Deserialize)]
struct HistoryParams {
    days: Option<i64>,
}

async fn signal_history(Query(params): Query<HistoryParams>) -> Json<Value> {
    let days = params.days.unwrap_or(30).clamp(1, 365);
    let since = Utc::now() - Duration::days(days);
    let history = database::store()
        .and_then(|s| s.find_generated_after(since))
        .unwrap_or_default();
    Json(json!(history))
}

async fn performance() -> Json<Value> {
    let closed = database::store()
        .and_then(|s| s.find_all_closed())
        .unwrap_or_default();
    let rejected = database::store()
        .and_then(|s| s.find_by_status("REJECTED"))
        .unwrap_or_default();

    let stats = learning::compute_stats(&closed);
    Json(json!({
        "stats": stats,
        "confidence_calibration": learning::calibration_report(&closed),
        "sector_analysis": learning::sector_report(&closed),
        "rejection_analysis": learning::rejection_report(&rejected),
    }))
}

async fn analyse_symbol(Path(symbol): Path<String>) -> Json<Value> {
    logger::info(LogTag::Webserver, &format!("Analysis requested for {}", symbol));
    let bundle = signal::analyse_symbol(&symbol).await;
    Json(json!(bundle))
}

async fn telegram_test() -> Json<Value> {
    let connected = telegram::test_connection().await;
    if connected {
        let _ = telegram::send_message("✅ Agent test message — Telegram connected successfully!")
            .await;
    }
    Json(json!({ "connected": connected }))
}

async fn broker_login() -> Json<Value> {
    let result = broker().login().await;
    Json(json!({
        "success": result.is_ok(),
        "error": result.err(),
        "authenticated": broker().is_authenticated().await,
    }))
}
