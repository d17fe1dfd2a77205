use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::broker::Broker;
use crate::chaos::{ChaosEngine, RunSummary, TradeAction};
use crate::liquidity::TickEngine;

/// Shared engines. Each sits behind its own lock, so a cycle never overlaps
/// another cycle of the same engine.
pub struct AppState {
    pub broker_name: &'static str,
    pub tick: Arc<Mutex<TickEngine<Broker>>>,
    pub chaos: Arc<Mutex<ChaosEngine<Broker>>>,
}

/// Response for the chaos status endpoint
#[derive(Serialize)]
pub struct ChaosStatusResponse {
    pub last: Option<RunSummary>,
    pub runs: Vec<RunSummary>,
}

/// Response for the chaos trades endpoint
#[derive(Serialize)]
pub struct ChaosTradesResponse {
    pub trades: Vec<TradeAction>,
}

/// Query params for the chaos status endpoint
#[derive(Debug, Deserialize)]
pub struct StatusQueryParams {
    pub limit: Option<usize>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/tick", post(run_tick))
        .route("/chaos/run", post(run_chaos))
        .route("/chaos/status", get(chaos_status))
        .route("/chaos/trades", get(chaos_trades))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// GET / - Service banner
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "forexbot",
        "status": "ok",
        "broker": state.broker_name,
        "timestamp_utc": Utc::now().to_rfc3339(),
        "message": "ForexBot is running. Liquidity sweep and ChaosEngine-FX engines are loaded.",
    }))
}

/// GET /health - Uptime check
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

/// POST /tick - One liquidity sweep tick
pub async fn run_tick(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut engine = state.tick.lock().await;
    let result = engine.run_tick().await;
    info!(
        "Tick completed: {} signals, {} executed",
        result.signals.len(),
        result.executed_orders.len()
    );
    (StatusCode::OK, Json(result))
}

/// POST /chaos/run - One ChaosEngine-FX cycle
pub async fn run_chaos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut engine = state.chaos.lock().await;
    let summary = engine.run_once().await;
    (StatusCode::OK, Json(summary))
}

/// GET /chaos/status - Last summary and recent run history
pub async fn chaos_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusQueryParams>,
) -> impl IntoResponse {
    let engine = state.chaos.lock().await;
    let limit = params.limit.unwrap_or(20);
    Json(ChaosStatusResponse {
        last: engine.last_summary().cloned(),
        runs: engine.recent_runs(limit),
    })
}

/// GET /chaos/trades - Recently executed trades
pub async fn chaos_trades(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = state.chaos.lock().await;
    Json(ChaosTradesResponse {
        trades: engine.recent_trades(),
    })
}
