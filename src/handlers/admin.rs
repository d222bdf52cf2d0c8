//! Diagnostic and administrative handlers: routing introspection, overrides switch, liveness cache.

use crate::error::AppError;
use crate::response::success_one_ok;
use crate::router::DatabaseRouter;
use crate::routing::RoutingState;
use crate::state::AppState;
use axum::extract::{Path, State};
use serde::Serialize;

#[derive(Serialize)]
pub struct RoutingInfo {
    pub state: RoutingState,
    pub read_database: String,
    pub write_database: String,
    pub overrides_enabled: bool,
}

#[derive(Serialize)]
pub struct OverridesInfo {
    pub overrides_enabled: bool,
}

/// Routing decision for this very request.
pub async fn routing_info(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let router = &state.router;
    let read = router.handle_for_read("_routing").await;
    success_one_ok(RoutingInfo {
        state: router.current_state(),
        read_database: read.name,
        write_database: router.primary().name.clone(),
        overrides_enabled: router.state_overrides_enabled(),
    })
}

pub async fn disable_overrides(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    state.router.disable_state_overrides();
    success_one_ok(OverridesInfo {
        overrides_enabled: state.router.state_overrides_enabled(),
    })
}

pub async fn enable_overrides(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    state.router.enable_state_overrides();
    success_one_ok(OverridesInfo {
        overrides_enabled: state.router.state_overrides_enabled(),
    })
}

/// Drop cached liveness for one database so the next read probes it again.
pub async fn invalidate_liveness(
    State(state): State<AppState>,
    Path(database): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let handle = state
        .router
        .topology()
        .handles()
        .find(|h| h.name == database)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("database '{}'", database)))?;
    state.router.prober().invalidate(&handle);
    tracing::info!(database = %handle, "liveness cache invalidated");
    Ok(success_one_ok(serde_json::json!({ "database": handle.name, "invalidated": true })))
}
