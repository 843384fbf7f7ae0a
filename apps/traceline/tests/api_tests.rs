//! Integration tests for the Traceline HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum_test::TestServer;
use std::collections::BTreeMap;
use traceline::api::{
    AppState, ArtifactsResponse, ErrorResponse, ExecutionTypesResponse, ExecutionsResponse,
    HealthResponse, LineageResponse, PipelinesResponse, PullRequest, PullResponse, PushRequest,
    PushResponse, StatusResponse, create_router, decode_batch, encode_batch,
};
use traceline_core::{
    ArtifactKind, Direction, NodeId, PropValue, Session, StoreId, SyncStatus,
};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a test server with a fresh in-memory session.
fn create_test_server() -> TestServer {
    let session = Session::in_memory(StoreId(1));
    let state = AppState::new(session);
    TestServer::new(create_router(state)).unwrap()
}

/// Record a two-stage pipeline named "demo" into `session`.
///
/// A train stage reads a dataset and writes model weights; an eval stage
/// reads the same weights and logs metrics. Returns the execution ids.
fn record_demo_pipeline(session: &mut Session) -> Vec<NodeId> {
    let mut train_props = BTreeMap::new();
    train_props.insert(
        "git_commit".to_string(),
        PropValue::Text("abc123".to_string()),
    );
    let train = session
        .begin_stage("demo", "train", "trainer", "train.py", train_props, 1_000)
        .unwrap();
    session
        .log_artifact(
            train.execution,
            "data/raw.csv",
            b"a,b\n1,2\n",
            Direction::Input,
            ArtifactKind::Dataset,
            BTreeMap::new(),
            1_001,
        )
        .unwrap();
    session
        .log_artifact(
            train.execution,
            "models/net.pt",
            b"weights-v1",
            Direction::Output,
            ArtifactKind::Model,
            BTreeMap::new(),
            1_002,
        )
        .unwrap();

    let eval = session
        .begin_stage("demo", "eval", "evaluator", "eval.py", BTreeMap::new(), 2_000)
        .unwrap();
    session
        .log_artifact(
            eval.execution,
            "models/net.pt",
            b"weights-v1",
            Direction::Input,
            ArtifactKind::Model,
            BTreeMap::new(),
            2_001,
        )
        .unwrap();
    let mut metrics = BTreeMap::new();
    metrics.insert("accuracy".to_string(), PropValue::Number(0.92));
    session
        .log_metrics(eval.execution, "eval-metrics", metrics, 2_002)
        .unwrap();

    vec![train.execution, eval.execution]
}

/// Create a test server with the demo pipeline pre-recorded.
fn create_populated_test_server() -> (TestServer, Vec<NodeId>) {
    let mut session = Session::in_memory(StoreId(1));
    let executions = record_demo_pipeline(&mut session);
    let state = AppState::new(session);
    (TestServer::new(create_router(state)).unwrap(), executions)
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.store, 1);
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// STATUS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_status_empty_store() {
    let server = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.pipeline_count, 0);
    assert_eq!(status.execution_count, 0);
    assert!(status.pipelines.is_empty());
}

#[tokio::test]
async fn test_status_populated_store() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.pipeline_count, 1);
    assert_eq!(status.execution_count, 2);
    // Dataset + model + metrics blob.
    assert_eq!(status.artifact_count, 3);
    assert_eq!(status.pipelines.len(), 1);
    assert_eq!(status.pipelines[0].name, "demo");
    assert_eq!(status.pipelines[0].sync_status, SyncStatus::Dirty);
}

// =============================================================================
// QUERY ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_pipelines_listing() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/pipelines").await;

    response.assert_status_ok();
    let body: PipelinesResponse = response.json();
    assert_eq!(body.pipelines, vec!["demo".to_string()]);
}

#[tokio::test]
async fn test_executions_listing() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/pipelines/demo/executions").await;

    response.assert_status_ok();
    let body: ExecutionsResponse = response.json();
    assert_eq!(body.page.total_items, 2);
    assert_eq!(body.page.items.len(), 2);
    // Default sort is oldest-first.
    assert_eq!(body.page.items[0].tool, "train.py");
    assert_eq!(body.page.items[1].tool, "eval.py");
}

#[tokio::test]
async fn test_executions_stage_filter() {
    let (server, _) = create_populated_test_server();

    let response = server
        .get("/pipelines/demo/executions")
        .add_query_param("filter_field", "stage")
        .add_query_param("filter_value", "eval")
        .await;

    response.assert_status_ok();
    let body: ExecutionsResponse = response.json();
    assert_eq!(body.page.total_items, 1);
    assert_eq!(body.page.items[0].stage, "eval");
}

#[tokio::test]
async fn test_executions_paging() {
    let (server, _) = create_populated_test_server();

    let response = server
        .get("/pipelines/demo/executions")
        .add_query_param("page", "2")
        .add_query_param("page_size", "1")
        .add_query_param("sort", "started_at")
        .add_query_param("order", "desc")
        .await;

    response.assert_status_ok();
    let body: ExecutionsResponse = response.json();
    assert_eq!(body.page.total_items, 2);
    assert_eq!(body.page.items.len(), 1);
    // Page 2 of a descending sort is the oldest execution.
    assert_eq!(body.page.items[0].tool, "train.py");
}

#[tokio::test]
async fn test_executions_unknown_pipeline() {
    let server = create_test_server();

    let response = server.get("/pipelines/nope/executions").await;

    response.assert_status_not_found();
    let body: ErrorResponse = response.json();
    assert!(body.error.contains("nope"));
}

#[tokio::test]
async fn test_executions_bad_filter_field() {
    let (server, _) = create_populated_test_server();

    let response = server
        .get("/pipelines/demo/executions")
        .add_query_param("filter_field", "color")
        .add_query_param("filter_value", "blue")
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_artifacts_listing() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/pipelines/demo/artifacts").await;

    response.assert_status_ok();
    let body: ArtifactsResponse = response.json();
    // The shared model weights appear once despite two usage events.
    assert_eq!(body.page.total_items, 3);
    let paths: Vec<&str> = body.page.items.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["data/raw.csv", "eval-metrics", "models/net.pt"]);
}

#[tokio::test]
async fn test_artifacts_path_filter() {
    let (server, _) = create_populated_test_server();

    let response = server
        .get("/pipelines/demo/artifacts")
        .add_query_param("filter_field", "path")
        .add_query_param("filter_value", "net")
        .await;

    response.assert_status_ok();
    let body: ArtifactsResponse = response.json();
    assert_eq!(body.page.total_items, 1);
    assert_eq!(body.page.items[0].path, "models/net.pt");
}

#[tokio::test]
async fn test_artifacts_kind_filter() {
    let (server, _) = create_populated_test_server();

    let response = server
        .get("/pipelines/demo/artifacts")
        .add_query_param("filter_field", "kind")
        .add_query_param("filter_value", "dataset")
        .await;

    response.assert_status_ok();
    let body: ArtifactsResponse = response.json();
    assert_eq!(body.page.total_items, 1);
    assert_eq!(body.page.items[0].path, "data/raw.csv");
}

#[tokio::test]
async fn test_artifacts_unknown_pipeline() {
    let server = create_test_server();

    let response = server.get("/pipelines/nope/artifacts").await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_execution_types() {
    let (server, executions) = create_populated_test_server();

    let response = server.get("/pipelines/demo/execution-types").await;

    response.assert_status_ok();
    let body: ExecutionTypesResponse = response.json();
    assert_eq!(body.execution_types.len(), 2);
    assert_eq!(
        body.execution_types[0],
        format!("trainer/train.py_{}", executions[0])
    );
}

// =============================================================================
// LINEAGE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_artifact_lineage() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/pipelines/demo/lineage/artifacts").await;

    response.assert_status_ok();
    let body: LineageResponse = response.json();
    // 2 executions + 3 artifacts, connected by 4 usage edges.
    assert_eq!(body.lineage.nodes.len(), 5);
    assert_eq!(body.lineage.edges.len(), 4);
}

#[tokio::test]
async fn test_execution_lineage() {
    let (server, executions) = create_populated_test_server();

    let path = format!("/pipelines/demo/lineage/executions/{}", executions[1]);
    let response = server.get(&path).await;

    response.assert_status_ok();
    let body: LineageResponse = response.json();
    assert!(!body.lineage.nodes.is_empty());
}

#[tokio::test]
async fn test_execution_lineage_bad_id() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/pipelines/demo/lineage/executions/garbage").await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_execution_lineage_unknown_id() {
    let (server, _) = create_populated_test_server();

    let response = server.get("/pipelines/demo/lineage/executions/9-999").await;

    response.assert_status_not_found();
}

// =============================================================================
// SYNC ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_push_roundtrip() {
    let server = create_test_server();

    // A site records locally, then pushes its batch over the wire.
    let mut site = Session::in_memory(StoreId(2));
    record_demo_pipeline(&mut site);
    let batch = site.begin_push("demo").unwrap().unwrap();
    let request = PushRequest {
        batch: encode_batch(&batch).unwrap(),
    };

    let response = server.post("/sync/push").json(&request).await;

    response.assert_status_ok();
    let body: PushResponse = response.json();
    assert_eq!(body.report.executions_created, 2);
    assert_eq!(body.report.artifacts_created, 3);
    assert!(!body.mapping.is_empty());

    // Replaying the same batch collapses into the existing graph.
    let replay = server.post("/sync/push").json(&request).await;
    replay.assert_status_ok();
    let replay_body: PushResponse = replay.json();
    assert_eq!(replay_body.report.created(), 0);
    assert_eq!(replay_body.report.executions_skipped, 2);
    assert_eq!(body.id_mapping(), replay_body.id_mapping());
}

#[tokio::test]
async fn test_pull_roundtrip() {
    let (server, _) = create_populated_test_server();

    let request = PullRequest {
        pipeline: "demo".to_string(),
        since: 0,
        execution: None,
    };
    let response = server.post("/sync/pull").json(&request).await;

    response.assert_status_ok();
    let body: PullResponse = response.json();
    let batch = decode_batch(&body.batch).unwrap();
    assert_eq!(batch.pipeline, "demo");
    assert_eq!(batch.high_mark, body.high_mark);
    assert!(batch.entity_count() > 0);

    // A fresh site applies the pulled batch and converges.
    let mut site = Session::in_memory(StoreId(3));
    site.begin_pull("demo").unwrap();
    let report = site.complete_pull(&batch).unwrap();
    assert_eq!(report.executions_created, 2);
    assert_eq!(site.graph().pipeline_count(), 1);
}

#[tokio::test]
async fn test_pull_unknown_pipeline() {
    let server = create_test_server();

    let request = PullRequest {
        pipeline: "nope".to_string(),
        since: 0,
        execution: None,
    };
    let response = server.post("/sync/pull").json(&request).await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_pull_single_execution() {
    let (server, executions) = create_populated_test_server();

    // The server created these executions itself, so the origin keys are
    // just its local ids.
    let request = PullRequest {
        pipeline: "demo".to_string(),
        since: 0,
        execution: Some(executions[1]),
    };
    let response = server.post("/sync/pull").json(&request).await;

    response.assert_status_ok();
    let body: PullResponse = response.json();
    let batch = decode_batch(&body.batch).unwrap();
    assert_eq!(batch.executions.len(), 1);
    assert_eq!(batch.executions[0].tool, "eval.py");
    // The eval run touched the model and its metrics, not the raw dataset.
    assert_eq!(batch.artifacts.len(), 2);

    let mut site = Session::in_memory(StoreId(3));
    let report = site.merge_batch(&batch).unwrap();
    assert_eq!(report.executions_created, 1);
    assert_eq!(site.graph().execution_count(), 1);
}

#[tokio::test]
async fn test_pull_unknown_execution() {
    let (server, _) = create_populated_test_server();

    let request = PullRequest {
        pipeline: "demo".to_string(),
        since: 0,
        execution: Some(NodeId::new(StoreId(9), 42)),
    };
    let response = server.post("/sync/pull").json(&request).await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_push_rejects_garbage() {
    let server = create_test_server();

    let request = PushRequest {
        batch: "!!!not-base64!!!".to_string(),
    };
    let response = server.post("/sync/push").json(&request).await;

    response.assert_status_bad_request();
    let body: ErrorResponse = response.json();
    assert!(body.error.contains("base64"));
}

#[tokio::test]
async fn test_push_rejects_corrupted_batch() {
    let server = create_test_server();

    let mut site = Session::in_memory(StoreId(2));
    record_demo_pipeline(&mut site);
    let batch = site.begin_push("demo").unwrap().unwrap();
    let mut encoded = encode_batch(&batch).unwrap().into_bytes();
    // Flip a character in the middle of the payload.
    let mid = encoded.len() / 2;
    encoded[mid] = if encoded[mid] == b'A' { b'B' } else { b'A' };
    let request = PushRequest {
        batch: String::from_utf8(encoded).unwrap(),
    };

    let response = server.post("/sync/push").json(&request).await;

    response.assert_status_bad_request();
}

// =============================================================================
// MISC TESTS
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let server = create_test_server();

    let response = server.get("/nonexistent").await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let server = create_test_server();

    let response = server.post("/health").await;

    response.assert_status(axum::http::StatusCode::METHOD_NOT_ALLOWED);
}
