use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use personal_rag::{Answer, PersonalizedRag, Status, Turn, UrlOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::error::ApiError;

const SERVICE_NAME: &str = "personal-rag";

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<PersonalizedRag>,
}

impl AppState {
    pub fn new(rag: PersonalizedRag) -> Self {
        Self { rag: Arc::new(rag) }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Read `RAG_HOST` and `RAG_PORT`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("RAG_HOST").unwrap_or(defaults.host);
        let port = std::env::var("RAG_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReindexResponse {
    pub status: String,
    pub message: String,
    pub chunk_count: usize,
    pub document_count: usize,
    pub url_outcomes: Vec<UrlOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub turns: Vec<Turn>,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/ask", post(ask))
        .route("/reindex", post(reindex))
        .route("/history/{user_id}", get(history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for personal-rag server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("personal-rag listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    Json(json!({"message": "Welcome to the personalized RAG API"}))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.rag.status().await)
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    let answer = state.rag.ask(request.user_id.as_deref(), &request.question).await?;
    Ok(Json(answer))
}

async fn reindex(State(state): State<AppState>) -> Result<Json<ReindexResponse>, ApiError> {
    let handle = state.rag.force_reindex().await?;
    let report = handle.report.unwrap_or_default();
    Ok(Json(ReindexResponse {
        status: "success".to_string(),
        message: "Reindexing completed successfully.".to_string(),
        chunk_count: report.chunk_count,
        document_count: report.document_count,
        url_outcomes: report.url_outcomes,
    }))
}

async fn history(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Json<HistoryResponse> {
    let turns = state.rag.history(&user_id).await;
    Json(HistoryResponse { user_id, turns })
}
