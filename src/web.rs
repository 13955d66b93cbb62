use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::MirrorError;
use crate::runtime::AppState;
use crate::scheduler::CleanupRequest;

#[derive(Clone)]
pub struct WebState {
    app: Arc<AppState>,
    cleanup_tx: mpsc::Sender<CleanupRequest>,
}

pub fn build_router(app: Arc<AppState>, cleanup_tx: mpsc::Sender<CleanupRequest>) -> Router {
    let state = WebState { app, cleanup_tx };
    Router::new()
        .route("/health", get(get_health))
        .route("/config", get(get_config).post(update_config))
        .route("/cleanup/run", post(trigger_cleanup))
        .route("/db/clear", post(trigger_clear))
        .route("/stats", get(get_stats))
        .with_state(state)
}

pub async fn start_web_server(app: Arc<AppState>, cleanup_tx: mpsc::Sender<CleanupRequest>) {
    let addr = format!("{}:{}", app.config.web_host, app.config.web_port);
    let router = build_router(app, cleanup_tx);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind web server on {addr}: {e}");
            return;
        }
    };
    info!("Web server listening on {addr}");
    if let Err(e) = axum::serve(listener, router).await {
        error!("Web server exited: {e}");
    }
}

async fn get_health(
    State(state): State<WebState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let ingestion = state.app.health.ingestion_alive.load(Ordering::SeqCst);
    let scheduler = state.app.health.scheduler_alive.load(Ordering::SeqCst);
    let store = state.app.db.ping().is_ok();

    if ingestion && scheduler && store {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("ingestion={ingestion} scheduler={scheduler} store={store}"),
        ))
    }
}

async fn get_config(State(state): State<WebState>) -> Json<serde_json::Value> {
    let snapshot = state.app.settings.snapshot();
    Json(json!({ "ok": true, "config": snapshot.cleanup }))
}

#[derive(Debug, Deserialize)]
struct UpdateConfigRequest {
    retention_days: Option<u32>,
    run_time: Option<String>,
    dedup_pattern: Option<String>,
}

/// Partial update; absent fields keep their current values. Validation
/// failures leave the active config untouched and report the specific error.
async fn update_config(
    State(state): State<WebState>,
    Json(body): Json<UpdateConfigRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut cleanup = state.app.settings.snapshot().cleanup.clone();
    if let Some(v) = body.retention_days {
        cleanup.retention_days = v;
    }
    if let Some(v) = body.run_time {
        cleanup.run_time = v;
    }
    if let Some(v) = body.dedup_pattern {
        cleanup.dedup_pattern = v;
    }

    match state.app.settings.update(&state.app.db, cleanup) {
        Ok(()) => {
            info!("Cleanup config updated via control surface");
            Ok(Json(json!({
                "ok": true,
                "config": state.app.settings.snapshot().cleanup
            })))
        }
        Err(MirrorError::Config(msg)) => Err((StatusCode::BAD_REQUEST, msg)),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn trigger_cleanup(
    State(state): State<WebState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    enqueue(&state, CleanupRequest::RunNow).await?;
    Ok(Json(json!({ "ok": true, "triggered": "cleanup" })))
}

async fn trigger_clear(
    State(state): State<WebState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    enqueue(&state, CleanupRequest::ClearAll).await?;
    Ok(Json(json!({ "ok": true, "triggered": "clear" })))
}

async fn enqueue(state: &WebState, request: CleanupRequest) -> Result<(), (StatusCode, String)> {
    state.cleanup_tx.send(request).await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler is not running".to_string(),
        )
    })
}

async fn get_stats(
    State(state): State<WebState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let internal = |e: MirrorError| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    let per_chat = state.app.db.processed_counts_by_chat().map_err(internal)?;
    let processed_total = state.app.db.processed_count().map_err(internal)?;
    let codes_cached = state.app.db.code_count().map_err(internal)?;

    // Configured source chats first, then anything left over in the store.
    let counts: HashMap<i64, i64> = per_chat
        .into_iter()
        .map(|c| (c.chat_id, c.messages))
        .collect();
    let mut chats = Vec::new();
    for &chat_id in &state.app.config.source_chats {
        chats.push(json!({
            "chat_id": chat_id,
            "messages": counts.get(&chat_id).copied().unwrap_or(0)
        }));
    }
    for (&chat_id, &messages) in &counts {
        if !state.app.config.source_chats.contains(&chat_id) {
            chats.push(json!({ "chat_id": chat_id, "messages": messages }));
        }
    }

    Ok(Json(json!({
        "ok": true,
        "messages_forwarded": state.app.stats.messages_forwarded.load(Ordering::Relaxed),
        "processed_total": processed_total,
        "codes_cached": codes_cached,
        "chats": chats
    })))
}
