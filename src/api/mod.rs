use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertReport;
use crate::dashboard::DashboardClient;
use crate::eval_stats::{EvalSnapshot, EvalStats};
use crate::evaluator::NodeHealthEvaluator;
use crate::models::{Address, HealthReport};
use crate::scheduler::{ChatReports, ReportStore};
use crate::storage::ChatId;

#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<NodeHealthEvaluator>,
    pub dashboard: DashboardClient,
    pub reports: ReportStore,
    pub stats: Arc<EvalStats>,
    /// Cancelled on server shutdown; in-flight evaluations stop with it.
    pub shutdown: CancellationToken,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse().map_err(|err: crate::models::AddressError| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn evaluator_stats(State(state): State<AppState>) -> Json<EvalSnapshot> {
    Json(state.stats.snapshot())
}

async fn node_report(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<HealthReport>, ApiError> {
    let address = parse_address(&address)?;
    let mut reports = state
        .evaluator
        .evaluate(std::slice::from_ref(&address), &state.shutdown.child_token())
        .await;
    let groups = state.evaluator.policy().group_count();
    Ok(Json(
        reports
            .pop()
            .unwrap_or_else(|| HealthReport::unavailable(address, groups)),
    ))
}

async fn node_stats(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    Ok(Json(state.dashboard.fetch_node_stats(&address).await))
}

async fn chat_reports(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> Json<ChatReports> {
    let store = state.reports.read().await;
    Json(store.get(&chat_id).cloned().unwrap_or(ChatReports {
        generated_at: 0,
        reports: Vec::new(),
        alerts: Vec::new(),
    }))
}

async fn chat_alerts(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> Json<Vec<AlertReport>> {
    let store = state.reports.read().await;
    Json(
        store
            .get(&chat_id)
            .map(|latest| latest.alerts.clone())
            .unwrap_or_default(),
    )
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats/evaluator", get(evaluator_stats))
        .route("/nodes/:address/report", get(node_report))
        .route("/nodes/:address/stats", get(node_stats))
        .route("/chats/:chat_id/reports", get(chat_reports))
        .route("/chats/:chat_id/alerts", get(chat_alerts))
        .with_state(state)
}

pub async fn run_http_server(addr: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
