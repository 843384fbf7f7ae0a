//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use traceline::api::{
    ErrorResponse, HealthResponse, MappingEntry, PullRequest, PushResponse, decode_batch,
    encode_batch,
};
use traceline_core::{
    IdMapping, MergeReport, NodeId, StoreId, SyncBatch,
};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_ok() {
    let health = HealthResponse::ok(7);
    assert_eq!(health.status, "ok");
    assert_eq!(health.store, 7);
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_health_response_serialization() {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: "0.4.2".to_string(),
        store: 1,
    };

    let json = serde_json::to_string(&health).unwrap();
    assert!(json.contains("\"status\":\"ok\""));
    assert!(json.contains("\"store\":1"));
}

// =============================================================================
// SYNC TYPE TESTS
// =============================================================================

#[test]
fn test_mapping_entry_json_shape() {
    let entry = MappingEntry {
        from: NodeId::new(StoreId(2), 5),
        to: NodeId::new(StoreId(1), 11),
    };

    let json = serde_json::to_string(&entry).unwrap();
    assert!(json.contains("\"origin\":2"));
    assert!(json.contains("\"seq\":5"));

    let back: MappingEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(back.from, entry.from);
    assert_eq!(back.to, entry.to);
}

#[test]
fn test_push_response_mapping_reassembly() {
    let mut mapping = IdMapping::default();
    mapping
        .0
        .insert(NodeId::new(StoreId(2), 5), NodeId::new(StoreId(1), 11));
    mapping
        .0
        .insert(NodeId::new(StoreId(2), 6), NodeId::new(StoreId(1), 12));

    let response = PushResponse::from_merge(&mapping, MergeReport::default());
    assert_eq!(response.mapping.len(), 2);
    assert_eq!(response.id_mapping(), mapping);
}

#[test]
fn test_pull_request_deserialization() {
    // The execution field is optional and defaults to a full pull.
    let json = r#"{"pipeline":"demo","since":42}"#;
    let request: PullRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.pipeline, "demo");
    assert_eq!(request.since, 42);
    assert_eq!(request.execution, None);

    let json = r#"{"pipeline":"demo","since":0,"execution":{"origin":2,"seq":5}}"#;
    let request: PullRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.execution, Some(NodeId::new(StoreId(2), 5)));
}

// =============================================================================
// BATCH ENCODING TESTS
// =============================================================================

#[test]
fn test_encode_decode_empty_batch() {
    let batch = SyncBatch {
        from_store: StoreId(2),
        pipeline: "demo".to_string(),
        high_mark: 9,
        pipelines: Vec::new(),
        contexts: Vec::new(),
        executions: Vec::new(),
        artifacts: Vec::new(),
        events: Vec::new(),
    };

    let encoded = encode_batch(&batch).unwrap();
    let decoded = decode_batch(&encoded).unwrap();
    assert_eq!(decoded, batch);
}

#[test]
fn test_decode_rejects_invalid_base64() {
    let err = decode_batch("%%%").unwrap_err();
    assert!(err.to_string().contains("base64"));
}

// =============================================================================
// ERROR RESPONSE TESTS
// =============================================================================

#[test]
fn test_error_response_serialization() {
    let error = ErrorResponse::new("pipeline 'nope' not found");

    let json = serde_json::to_string(&error).unwrap();
    assert!(json.contains("\"error\":\"pipeline 'nope' not found\""));
}
