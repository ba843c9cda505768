use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::RateLimitConfig;
use crate::http::server::AppState;
use crate::observability::TrafficSnapshot;
use crate::security::rate_limit::{RateLimitUpdate, WindowUsage};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct RateLimitView {
    pub config: RateLimitConfig,
    pub usage: WindowUsage,
}

#[derive(Serialize)]
pub struct AllowListView {
    pub patterns: Vec<String>,
}

#[derive(Serialize)]
pub struct AllowListChange {
    pub ok: bool,
    pub patterns: Vec<String>,
}

#[derive(Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
}

/// Combined dashboard view.
#[derive(Serialize)]
pub struct AdminData {
    pub allowed_domains: Vec<String>,
    pub traffic: TrafficSnapshot,
    pub rate_limit: RateLimitView,
}

fn bad_request(detail: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
}

fn rate_limit_view(state: &AppState) -> RateLimitView {
    RateLimitView {
        config: state.rate_limiter.config(),
        usage: state.rate_limiter.window_usage(),
    }
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_traffic(State(state): State<AppState>) -> Json<TrafficSnapshot> {
    Json(state.traffic.snapshot())
}

pub async fn reset_traffic(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.traffic.reset();
    Json(json!({ "ok": true }))
}

pub async fn get_rate_limit(State(state): State<AppState>) -> Json<RateLimitView> {
    Json(rate_limit_view(&state))
}

pub async fn update_rate_limit(
    State(state): State<AppState>,
    Json(update): Json<RateLimitUpdate>,
) -> Response {
    match state.rate_limiter.update_config(update) {
        Ok(_) => Json(rate_limit_view(&state)).into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

pub async fn list_allowlist(State(state): State<AppState>) -> Json<AllowListView> {
    Json(AllowListView {
        patterns: state.allowlist.patterns(),
    })
}

pub async fn add_allowlist(
    State(state): State<AppState>,
    Json(body): Json<PatternRequest>,
) -> Response {
    match state.allowlist.add(&body.pattern) {
        Ok(added) => Json(AllowListChange {
            ok: added,
            patterns: state.allowlist.patterns(),
        })
        .into_response(),
        Err(e) => bad_request(format!("Invalid pattern: {e}")),
    }
}

pub async fn remove_allowlist(
    State(state): State<AppState>,
    Json(body): Json<PatternRequest>,
) -> Json<AllowListChange> {
    let removed = state.allowlist.remove(&body.pattern);
    Json(AllowListChange {
        ok: removed,
        patterns: state.allowlist.patterns(),
    })
}

pub async fn admin_data(State(state): State<AppState>) -> Json<AdminData> {
    Json(AdminData {
        allowed_domains: state.allowlist.patterns(),
        traffic: state.traffic.snapshot(),
        rate_limit: rate_limit_view(&state),
    })
}
