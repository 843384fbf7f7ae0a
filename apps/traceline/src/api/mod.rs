//! # Traceline HTTP API Module
//!
//! The HTTP REST surface over a lineage session, using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Store counts and per-pipeline sync standing
//! - `GET /pipelines` - Pipeline names
//! - `GET /pipelines/{name}/executions` - Paged execution listing
//! - `GET /pipelines/{name}/artifacts` - Paged artifact listing
//! - `GET /pipelines/{name}/execution-types` - Execution type identifiers
//! - `GET /pipelines/{name}/lineage/artifacts` - Full pipeline DAG
//! - `GET /pipelines/{name}/lineage/executions/{id}` - One execution's lineage
//! - `POST /sync/push` - Accept a pushed batch (central role)
//! - `POST /sync/pull` - Serve a pull batch (central role)
//!
//! ## Configuration (Environment Variables)
//!
//! - `TRACELINE_CORS_ORIGINS`: Comma-separated allowed origins, or "*" for
//!   all (default: localhost only)

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `traceline::api::*`)
pub use handlers::{
    artifact_lineage_handler, artifacts_handler, execution_lineage_handler,
    execution_types_handler, executions_handler, health_handler, pipelines_handler, pull_handler,
    push_handler, status_handler,
};
pub use types::{
    ArtifactsQuery, ArtifactsResponse, ErrorResponse, ExecutionTypesResponse, ExecutionsQuery,
    ExecutionsResponse, HealthResponse, LineageResponse, MappingEntry, PipelineStatus,
    PipelinesResponse, PullRequest, PullResponse, PushRequest, PushResponse, StatusResponse,
    decode_batch, encode_batch,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use traceline_core::limits::MAX_BATCH_PAYLOAD_SIZE;
use traceline_core::{LineageError, Session};

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the lineage session.
#[derive(Clone)]
pub struct AppState {
    /// The session behind a many-readers/one-writer lock. A push applies
    /// under the write lock in one transaction, so readers never observe a
    /// partial batch.
    pub session: Arc<RwLock<Session>>,
}

impl AppState {
    /// Create new app state around a session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `TRACELINE_CORS_ORIGINS`:
/// - If "*": allows all origins
/// - If not set: defaults to localhost only
/// - Otherwise: parses a comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("TRACELINE_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (TRACELINE_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in TRACELINE_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => {
            tracing::info!("CORS: No TRACELINE_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    // Base64 inflates the wire batch by 4/3; leave headroom for the JSON
    // envelope around it.
    let body_limit = MAX_BATCH_PAYLOAD_SIZE / 3 * 4 + 4096;

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/pipelines", get(handlers::pipelines_handler))
        .route(
            "/pipelines/{name}/executions",
            get(handlers::executions_handler),
        )
        .route(
            "/pipelines/{name}/artifacts",
            get(handlers::artifacts_handler),
        )
        .route(
            "/pipelines/{name}/execution-types",
            get(handlers::execution_types_handler),
        )
        .route(
            "/pipelines/{name}/lineage/artifacts",
            get(handlers::artifact_lineage_handler),
        )
        .route(
            "/pipelines/{name}/lineage/executions/{id}",
            get(handlers::execution_lineage_handler),
        )
        .route("/sync/push", post(handlers::push_handler))
        .route("/sync/pull", post(handlers::pull_handler))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, session: Session) -> Result<(), LineageError> {
    let state = AppState::new(session);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LineageError::Io(format!("bind failed: {}", e)))?;

    tracing::info!("Traceline HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| LineageError::Io(format!("server error: {}", e)))
}
