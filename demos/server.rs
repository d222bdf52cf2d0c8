//! Demo server: routes a tiny notes API through the replica router.
//!
//! Config comes from the JSON file in `CONFIG_PATH`, or from `REPLICATED_*` env vars.
//! `POST /api/v1/notes` writes to the primary and answers with a redirect to the list; the pin
//! cookie makes the follow-up `GET` read from the primary too.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use replica_router::{
    admin_routes, common_routes_with_ready, from_env, load_from_path, success_one_ok, with_pinning, AppError,
    AppState, PerformedWrite,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct NewNote {
    body: String,
}

async fn list_notes(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let pool = state.pool_for_read("notes").await?;
    let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, body FROM notes ORDER BY id DESC LIMIT 100")
        .fetch_all(&pool)
        .await?;
    let data: Vec<_> = rows
        .into_iter()
        .map(|(id, body)| serde_json::json!({ "id": id, "body": body }))
        .collect();
    Ok(success_one_ok(data))
}

async fn create_note(State(state): State<AppState>, Json(note): Json<NewNote>) -> Result<impl IntoResponse, AppError> {
    if note.body.trim().is_empty() {
        return Err(AppError::BadRequest("body must not be empty".into()));
    }
    let pool = state.pool_for_write("notes")?;
    sqlx::query("INSERT INTO notes (body) VALUES ($1)")
        .bind(&note.body)
        .execute(&pool)
        .await?;
    Ok((
        StatusCode::SEE_OTHER,
        [(header::LOCATION, "/api/v1/notes")],
        Extension(PerformedWrite),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("replica_router=debug,server=info")),
        )
        .init();

    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => load_from_path(&path).await?,
        Err(_) => from_env()?,
    };
    let state = AppState::from_config(&config, 5)?;

    let primary = state.pool_for_write("notes")?;
    sqlx::query("CREATE TABLE IF NOT EXISTS notes (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL)")
        .execute(&primary)
        .await?;

    let api = Router::new()
        .route("/notes", get(list_notes).post(create_note))
        .with_state(state.clone());

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(admin_routes(state.clone()))
        .nest("/api/v1", api);
    let app = with_pinning(app, state.pinning())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        primary = %config.primary.name,
        replicas = config.replicas.len(),
        "listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    state.pools.close().await;
    Ok(())
}
