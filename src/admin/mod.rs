//! Admin API: traffic counters, rate limit and allow-list management.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

/// Routes guarded by the admin API key.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/metrics/traffic/reset", post(reset_traffic))
        .route("/admin/data", get(admin_data))
        .route("/admin/rate_limit", get(get_rate_limit))
        .route("/admin/rate_limit/update", post(update_rate_limit))
        .route("/admin/allowlist", get(list_allowlist))
        .route("/admin/allowlist/add", post(add_allowlist))
        .route("/admin/allowlist/remove", post(remove_allowlist))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
