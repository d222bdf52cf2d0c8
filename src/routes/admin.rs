//! Routing diagnostics and admin routes.

use crate::handlers::{disable_overrides, enable_overrides, invalidate_liveness, routing_info};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/routing", get(routing_info))
        .route("/admin/overrides/disable", post(disable_overrides))
        .route("/admin/overrides/enable", post(enable_overrides))
        .route("/admin/liveness/:database/invalidate", post(invalidate_liveness))
        .with_state(state)
}
