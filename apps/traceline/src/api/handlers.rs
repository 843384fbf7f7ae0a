//! # API Endpoint Handlers

use super::{
    AppState,
    types::{
        ArtifactsQuery, ArtifactsResponse, ErrorResponse, ExecutionTypesResponse,
        ExecutionsQuery, ExecutionsResponse, HealthResponse, LineageResponse, PipelineStatus,
        PipelinesResponse, PullRequest, PullResponse, PushRequest, PushResponse, StatusResponse,
        decode_batch, encode_batch,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use traceline_core::{
    ArtifactFilter, ArtifactFilterField, ArtifactSortField, ExecutionFilter, FilterField,
    LineageError, NodeId, SortField, SortOrder, artifact_lineage, execution_lineage,
    execution_types, list_artifacts, list_executions, list_pipelines,
};

/// Map a core error onto an HTTP status.
fn error_status(error: &LineageError) -> StatusCode {
    match error {
        LineageError::UnknownPipeline(_) | LineageError::InvalidReference { .. } => {
            StatusCode::NOT_FOUND
        }
        LineageError::InvalidInput(_) | LineageError::BatchRejected(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &LineageError) -> Response {
    (
        error_status(error),
        Json(ErrorResponse::new(error.to_string())),
    )
        .into_response()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    Json(HealthResponse::ok(session.store_id().0))
}

/// Store-level counts plus per-pipeline sync standing.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let graph = session.graph();

    let pipelines = list_pipelines(graph)
        .map(|name| PipelineStatus {
            name: name.to_string(),
            sync_status: session.sync_status(name),
        })
        .collect();

    Json(StatusResponse {
        store: graph.store_id().0,
        pipeline_count: graph.pipeline_count(),
        execution_count: graph.execution_count(),
        artifact_count: graph.artifact_count(),
        event_count: graph.event_count(),
        pipelines,
    })
}

// =============================================================================
// QUERY SURFACE
// =============================================================================

/// List pipeline names.
pub async fn pipelines_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    Json(PipelinesResponse {
        pipelines: list_pipelines(session.graph())
            .map(str::to_string)
            .collect(),
    })
}

fn parse_sort(value: Option<&str>) -> Result<SortField, LineageError> {
    match value {
        None | Some("started_at") => Ok(SortField::StartedAt),
        Some("tool") => Ok(SortField::Tool),
        Some("stage") => Ok(SortField::Stage),
        Some(other) => Err(LineageError::InvalidInput(format!(
            "unknown sort field '{other}'"
        ))),
    }
}

fn parse_order(value: Option<&str>) -> Result<SortOrder, LineageError> {
    match value {
        None | Some("asc") => Ok(SortOrder::Asc),
        Some("desc") => Ok(SortOrder::Desc),
        Some(other) => Err(LineageError::InvalidInput(format!(
            "unknown sort order '{other}'"
        ))),
    }
}

fn parse_filter(query: &ExecutionsQuery) -> Result<Option<ExecutionFilter>, LineageError> {
    match (query.filter_field.as_deref(), query.filter_value.as_deref()) {
        (None, None) => Ok(None),
        (Some(field), Some(value)) => {
            let field = match field {
                "context_type" => FilterField::ContextType,
                "stage" => FilterField::Stage,
                "tool" => FilterField::Tool,
                other => {
                    return Err(LineageError::InvalidInput(format!(
                        "unknown filter field '{other}'"
                    )));
                }
            };
            Ok(Some(ExecutionFilter {
                field,
                value: value.to_string(),
            }))
        }
        _ => Err(LineageError::InvalidInput(
            "filter_field and filter_value must be given together".to_string(),
        )),
    }
}

/// List executions of a pipeline, paginated, filtered, and sorted.
pub async fn executions_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ExecutionsQuery>,
) -> Response {
    let session = state.session.read().await;

    let result = parse_filter(&query).and_then(|filter| {
        list_executions(
            session.graph(),
            &name,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(0),
            filter.as_ref(),
            parse_sort(query.sort.as_deref())?,
            parse_order(query.order.as_deref())?,
        )
    });
    match result {
        Ok(page) => Json(ExecutionsResponse { page }).into_response(),
        Err(e) => error_response(&e),
    }
}

fn parse_artifact_sort(value: Option<&str>) -> Result<ArtifactSortField, LineageError> {
    match value {
        None | Some("path") => Ok(ArtifactSortField::Path),
        Some("kind") => Ok(ArtifactSortField::Kind),
        Some(other) => Err(LineageError::InvalidInput(format!(
            "unknown sort field '{other}'"
        ))),
    }
}

fn parse_artifact_filter(query: &ArtifactsQuery) -> Result<Option<ArtifactFilter>, LineageError> {
    match (query.filter_field.as_deref(), query.filter_value.as_deref()) {
        (None, None) => Ok(None),
        (Some(field), Some(value)) => {
            let field = match field {
                "path" => ArtifactFilterField::Path,
                "kind" => ArtifactFilterField::Kind,
                other => {
                    return Err(LineageError::InvalidInput(format!(
                        "unknown filter field '{other}'"
                    )));
                }
            };
            Ok(Some(ArtifactFilter {
                field,
                value: value.to_string(),
            }))
        }
        _ => Err(LineageError::InvalidInput(
            "filter_field and filter_value must be given together".to_string(),
        )),
    }
}

/// List artifacts touched by a pipeline, paginated, filtered, and sorted.
pub async fn artifacts_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ArtifactsQuery>,
) -> Response {
    let session = state.session.read().await;

    let result = parse_artifact_filter(&query).and_then(|filter| {
        list_artifacts(
            session.graph(),
            &name,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(0),
            filter.as_ref(),
            parse_artifact_sort(query.sort.as_deref())?,
            parse_order(query.order.as_deref())?,
        )
    });
    match result {
        Ok(page) => Json(ArtifactsResponse { page }).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Execution type identifiers of a pipeline.
pub async fn execution_types_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let session = state.session.read().await;
    match execution_types(session.graph(), &name) {
        Ok(types) => Json(ExecutionTypesResponse {
            execution_types: types,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Full artifact/execution DAG of a pipeline.
pub async fn artifact_lineage_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let session = state.session.read().await;
    match artifact_lineage(session.graph(), &name) {
        Ok(lineage) => Json(LineageResponse { lineage }).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Parse an execution id path segment of the form "origin-seq".
fn parse_node_id(raw: &str) -> Result<NodeId, LineageError> {
    raw.parse()
}

/// Upstream and downstream lineage of one execution.
pub async fn execution_lineage_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Response {
    let session = state.session.read().await;
    let result =
        parse_node_id(&id).and_then(|id| execution_lineage(session.graph(), &name, id));
    match result {
        Ok(lineage) => Json(LineageResponse { lineage }).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// SYNC
// =============================================================================

/// Accept a pushed batch and acknowledge with the id mapping.
pub async fn push_handler(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Response {
    let batch = match decode_batch(&request.batch) {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };
    tracing::info!(
        pipeline = %batch.pipeline,
        from_store = batch.from_store.0,
        entities = batch.entity_count(),
        "accepting push"
    );

    let mut session = state.session.write().await;
    match session.accept_push(&batch) {
        Ok((mapping, report)) => {
            if report.property_conflicts > 0 {
                tracing::warn!(
                    pipeline = %batch.pipeline,
                    conflicts = report.property_conflicts,
                    "merge resolved property conflicts by latest write"
                );
            }
            Json(PushResponse::from_merge(&mapping, report)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Serve a pull: everything of a pipeline written after the given mark, or
/// one execution when the request names its origin key.
pub async fn pull_handler(
    State(state): State<AppState>,
    Json(request): Json<PullRequest>,
) -> Response {
    let session = state.session.read().await;
    let result = session
        .serve_pull(&request.pipeline, request.since, request.execution)
        .and_then(|batch| {
            let high_mark = batch.high_mark;
            Ok(PullResponse {
                batch: encode_batch(&batch)?,
                high_mark,
            })
        });
    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}
