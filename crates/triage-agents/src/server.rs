//! HTTP boundary.
//!
//! - GET  /health      - liveness
//! - POST /decide      - run the triage pipeline for one ticket
//! - GET  /history     - recent runs, newest first
//! - POST /rag/ingest  - rebuild the knowledge-base index

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use triage_core::{PipelineFailure, Run};

use crate::ingest::Ingestor;
use crate::orchestrator::{TriageOutcome, TriagePipeline};
use crate::store::DEFAULT_HISTORY_LIMIT;

pub const SERVICE_NAME: &str = "sentinel";
pub const API_VERSION: &str = "v1";

/// Error code for request bodies or query strings that fail to parse.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TriagePipeline>,
    pub ingestor: Arc<dyn Ingestor>,
}

/// A [`PipelineFailure`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub PipelineFailure);

impl ApiError {
    pub fn invalid_request(message: &str, detail: String) -> Self {
        Self(PipelineFailure::new(INVALID_REQUEST, message, Some(detail)))
    }

    pub fn status_code(&self) -> StatusCode {
        match self.0.error_code.as_str() {
            "INVALID_TICKET" | INVALID_REQUEST => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.0)).into_response()
    }
}

impl From<PipelineFailure> for ApiError {
    fn from(failure: PipelineFailure) -> Self {
        Self(failure)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected request body");
        Self::invalid_request("Invalid request body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected query string");
        Self::invalid_request("Invalid query parameters", rejection.body_text())
    }
}

/// [`Json`] that rejects with an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// [`Query`] that rejects with an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub ticket_text: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub items: Vec<Run>,
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "service": SERVICE_NAME, "version": API_VERSION }))
}

async fn decide(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DecideRequest>,
) -> Result<Json<TriageOutcome>, ApiError> {
    let outcome = state.pipeline.decide_ticket(&req.ticket_text).await?;
    Ok(Json(outcome))
}

async fn history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let items = state.pipeline.list_recent(limit).await?;
    Ok(Json(HistoryResponse { items }))
}

async fn ingest(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state.ingestor.ingest().await.map_err(|err| {
        warn!(error = %err, "Ingestion failed");
        ApiError(PipelineFailure::new(
            err.error_code(),
            "Knowledge base ingestion failed",
            Some(err.to_string()),
        ))
    })?;
    Ok(Json(json!({ "chunks_indexed": report.chunks_indexed })))
}

/// CORS layer for the configured origins. Unparseable origins are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/decide", post(decide))
        .route("/history", get(history))
        .route("/rag/ingest", post(ingest))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(router: Router, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Triage service listening");
    axum::serve(listener, router)
        .await
        .context("HTTP server terminated")
}
