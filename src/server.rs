//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/videos` | List videos with their segments |
//! | `POST` | `/api/videos` | Register a video by URL (`{"youtube_url": ...}`) |
//! | `DELETE` | `/api/videos/{id}` | Remove a video and its segments |
//! | `GET`  | `/api/videos/{id}/analysis` | Analysis state of a video |
//! | `POST` | `/api/chat` | Ask a question (`{"question": ...}`) |
//! | `GET`  | `/api/chat/history` | Recent exchanges, newest first (`?limit=N`) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response, including unknown routes and malformed request
//! bodies, has the shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! See [`AppError`] for the code table.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.
//!
//! # Lifecycle
//!
//! `SIGINT`/`SIGTERM` stop accepting connections, let in-flight requests
//! finish, then drain the analysis queue. `SIGHUP` reloads the config file.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ytchat_core::models::{AnalysisRun, ChatMessage, Video};
use ytchat_core::store::Store;

use crate::analysis::{AnalysisQueue, AnalysisWorker};
use crate::capabilities::HttpVideoService;
use crate::catalog::Catalog;
use crate::config::ConfigHandle;
use crate::error::AppError;
use crate::retrieval::{ChatResponse, Retriever};
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigHandle>,
    pub catalog: Arc<Catalog>,
    pub retriever: Arc<Retriever>,
}

impl AppState {
    /// Wires the HTTP analysis service, the analysis queue, and both
    /// orchestrators around `store`. Starts the queue's dispatcher, so this
    /// must run inside a tokio runtime.
    pub fn assemble(config: Arc<ConfigHandle>, store: Arc<dyn Store>) -> Self {
        let snapshot = config.snapshot();
        let service = Arc::new(HttpVideoService::new(config.clone()));

        let queue = AnalysisQueue::start(
            AnalysisWorker::new(store.clone(), service.clone()),
            snapshot.analysis.workers,
            snapshot.analysis.queue_capacity,
        );

        Self {
            catalog: Arc::new(Catalog::new(store.clone(), service.clone(), queue)),
            retriever: Arc::new(Retriever::new(store, service, config.clone())),
            config,
        }
    }

    pub fn analysis_queue(&self) -> &AnalysisQueue {
        self.catalog.analysis_queue()
    }
}

/// Builds the router with all routes, CORS, and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/videos", get(handle_list_videos).post(handle_register_video))
        .route("/api/videos/{id}", delete(handle_remove_video))
        .route("/api/videos/{id}/analysis", get(handle_analysis_status))
        .route("/api/chat", post(handle_ask))
        .route("/api/chat/history", get(handle_history))
        .route("/health", get(handle_health))
        .fallback(handle_unknown_route)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server and runs until `SIGINT`/`SIGTERM`.
///
/// Migrations run first, so a fresh database path works without `init`.
pub async fn run_server(config: Arc<ConfigHandle>) -> anyhow::Result<()> {
    let snapshot = config.snapshot();
    let bind_addr = snapshot.server.bind.clone();

    let pool = db::connect(&snapshot).await?;
    migrate::migrate(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let state = AppState::assemble(config.clone(), store);
    let queue = state.analysis_queue().clone();

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(config.clone()));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, db = %snapshot.db.path.display(), "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("draining analysis queue");
    queue.shutdown().await;
    pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

#[cfg(unix)]
async fn reload_on_hangup(config: Arc<ConfigHandle>) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGHUP; config reload disabled");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match config.reload() {
            Ok(fresh) => tracing::info!(base_url = %fresh.services.base_url, "configuration reloaded"),
            Err(e) => tracing::warn!(error = %e, "configuration reload failed; keeping previous"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}

// ============ Videos ============

async fn handle_list_videos(State(state): State<AppState>) -> Result<Json<Vec<Video>>, AppError> {
    Ok(Json(state.catalog.list_videos().await?))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    youtube_url: String,
}

async fn handle_register_video(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Video>), AppError> {
    let Json(req) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let video = state.catalog.register_video(&req.youtube_url).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

fn video_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| AppError::Validation(format!("invalid video id: {}", e.body_text())))
}

async fn handle_remove_video(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    state.catalog.remove_video(video_id(path)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_analysis_status(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<AnalysisRun>, AppError> {
    Ok(Json(state.catalog.analysis_status(video_id(path)?).await?))
}

// ============ Chat ============

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(Json(state.retriever.ask(&req.question).await?))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

async fn handle_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(Json(state.retriever.history(params.limit).await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_unknown_route(uri: axum::http::Uri) -> impl IntoResponse {
    AppError::NotFound(format!("no route for {}", uri.path()))
}
