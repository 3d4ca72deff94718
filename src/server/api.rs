//! HTTP API server implementation

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::config::RelayConfig;
use crate::core::errors::RelayError;
use crate::core::key_pool::{ENHANCE_POOL, TRANSLATE_POOL};
use crate::core::models::Turn;
use crate::core::workflow::Workflow;

/// Application state
#[derive(Clone)]
pub struct AppState {
    workflow: Arc<Workflow>,
}

impl AppState {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow: Arc::new(workflow),
        }
    }
}

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Turn>,
}

/// Chat response body
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    workflow: String,
    stages: StagesInfo,
    pools: BTreeMap<String, usize>,
    models: Vec<String>,
    primary_configured: bool,
    timestamp: String,
}

#[derive(Serialize)]
struct StagesInfo {
    enhance: String,
    generate: String,
    translate: String,
}

/// Error with the status code it is served under
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                details,
            },
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match (&err, status) {
            (RelayError::ValidationError { message }, _) => {
                Self::new(StatusCode::BAD_REQUEST, message.clone(), None)
            }
            (RelayError::ConfigError { message }, _) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.clone(), None)
            }
            (_, StatusCode::UNAUTHORIZED) => Self::new(
                status,
                "Invalid API key. Please check your ANTHROPIC_API_KEY.",
                Some(err.to_string()),
            ),
            (_, StatusCode::TOO_MANY_REQUESTS) => Self::new(
                status,
                "Rate limit exceeded. Please try again later.",
                Some(err.to_string()),
            ),
            (_, StatusCode::BAD_REQUEST) => Self::new(
                status,
                "Invalid request. Please check your message format.",
                Some(err.to_string()),
            ),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing your request. Please try again.",
                Some(err.to_string()),
            ),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Messages array is required",
            Some(rejection.body_text()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Health check handler
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let workflow = &state.workflow;
    let stage = |pool: &str| {
        let status = if workflow.stage_enabled(pool) {
            "enabled"
        } else {
            "skipped"
        };
        status.to_string()
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        service: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        workflow: workflow.describe(),
        stages: StagesInfo {
            enhance: stage(ENHANCE_POOL),
            generate: if workflow.primary_configured() {
                "enabled"
            } else {
                "unconfigured"
            }
            .to_string(),
            translate: stage(TRANSLATE_POOL),
        },
        pools: workflow.keys().sizes(),
        models: workflow
            .chain()
            .models()
            .iter()
            .map(|m| m.name.clone())
            .collect(),
        primary_configured: workflow.primary_configured(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Chat handler
async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    // Runs on its own task so a dropped connection does not abort the pipeline.
    let workflow = state.workflow.clone();
    let outcome = tokio::spawn(async move { workflow.run(request.messages).await })
        .await
        .map_err(|e| {
            error!("Workflow task failed: {}", e);
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing your request. Please try again.",
                Some(e.to_string()),
            )
        })?;

    match outcome {
        Ok(outcome) => {
            info!(
                "Stages: enhance={}, generate={}, translate={}",
                outcome.stages.enhance, outcome.stages.generate, outcome.stages.translate
            );
            Ok(Json(ChatResponse {
                response: outcome.response,
            }))
        }
        Err(e) => {
            warn!("Chat request failed: {}", e);
            Err(e.into())
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat))
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run_server(host: String, port: u16, config: RelayConfig) -> anyhow::Result<()> {
    let workflow = Workflow::from_config(&config)?;
    info!("Workflow: {}", workflow.describe());
    info!(
        "Pools: {} enhance keys, {} translate keys",
        workflow.keys().size(ENHANCE_POOL),
        workflow.keys().size(TRANSLATE_POOL)
    );

    let app = router(AppState::new(workflow));

    // Bind address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
