//! Common routes: health, readiness, version.

use crate::liveness::LivenessStatus;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct DatabaseStatus {
    name: String,
    alive: bool,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    primary: DatabaseStatus,
    replicas: Vec<DatabaseStatus>,
    cache: Vec<LivenessStatus>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// 200 while the primary is alive. Dead replicas only degrade the status, reads fall back.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let prober = state.router.prober();
    let primary = state.router.primary();
    let primary_alive = prober.is_alive(primary).await;

    let mut replicas = Vec::new();
    for r in &state.router.topology().replicas {
        replicas.push(DatabaseStatus {
            name: r.name.clone(),
            alive: prober.is_alive(r).await,
        });
    }

    let (code, status) = if !primary_alive {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else if replicas.iter().any(|r| !r.alive) {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };
    (
        code,
        Json(ReadyBody {
            status,
            primary: DatabaseStatus {
                name: primary.name.clone(),
                alive: primary_alive,
            },
            replicas,
            cache: prober.snapshot(),
        }),
    )
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes including readiness with liveness checks. Requires AppState.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/info", get(version))
        .with_state(state)
}
