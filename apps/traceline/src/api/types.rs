//! # API Request/Response Types
//!
//! JSON structures for the HTTP API. Batches travel base64-encoded inside
//! JSON bodies; everything else is plain JSON over the core's serde types.

use serde::{Deserialize, Serialize};
use traceline_core::{
    ArtifactPage, ExecutionPage, IdMapping, Lineage, LineageError, MergeReport, NodeId, SyncBatch,
    SyncStatus, batch_from_bytes, batch_to_bytes,
};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: u64,
}

impl HealthResponse {
    /// Healthy response for a store.
    #[must_use]
    pub fn ok(store: u64) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store,
        }
    }
}

/// Sync standing of one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub name: String,
    pub sync_status: SyncStatus,
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub store: u64,
    pub pipeline_count: usize,
    pub execution_count: usize,
    pub artifact_count: usize,
    pub event_count: usize,
    pub pipelines: Vec<PipelineStatus>,
}

// =============================================================================
// QUERY SURFACE
// =============================================================================

/// Pipeline listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinesResponse {
    pub pipelines: Vec<String>,
}

/// Query parameters for the execution listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionsQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    /// Rows per page (0 or absent selects the default).
    pub page_size: Option<usize>,
    /// Filter field: "context_type", "stage", or "tool".
    pub filter_field: Option<String>,
    /// Value the filter field must equal.
    pub filter_value: Option<String>,
    /// Sort field: "started_at", "tool", or "stage".
    pub sort: Option<String>,
    /// Sort order: "asc" or "desc".
    pub order: Option<String>,
}

/// Execution listing response, paged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionsResponse {
    #[serde(flatten)]
    pub page: ExecutionPage,
}

/// Query parameters for the artifact listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactsQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    /// Rows per page (0 or absent selects the default).
    pub page_size: Option<usize>,
    /// Filter field: "path" (substring) or "kind" (exact).
    pub filter_field: Option<String>,
    /// Value the filter field must match.
    pub filter_value: Option<String>,
    /// Sort field: "path" or "kind".
    pub sort: Option<String>,
    /// Sort order: "asc" or "desc".
    pub order: Option<String>,
}

/// Artifact listing response, paged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsResponse {
    #[serde(flatten)]
    pub page: ArtifactPage,
}

/// Execution type identifiers of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTypesResponse {
    pub execution_types: Vec<String>,
}

/// A lineage view response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageResponse {
    #[serde(flatten)]
    pub lineage: Lineage,
}

// =============================================================================
// SYNC
// =============================================================================

/// Push request: one wire batch, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub batch: String,
}

/// One id translation learned from a push.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MappingEntry {
    pub from: NodeId,
    pub to: NodeId,
}

/// Push acknowledgement: the receiver's ids plus what the merge did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub mapping: Vec<MappingEntry>,
    pub report: MergeReport,
}

impl PushResponse {
    /// Build from a merge outcome.
    #[must_use]
    pub fn from_merge(mapping: &IdMapping, report: MergeReport) -> Self {
        Self {
            mapping: mapping
                .0
                .iter()
                .map(|(&from, &to)| MappingEntry { from, to })
                .collect(),
            report,
        }
    }

    /// Reassemble the id mapping.
    #[must_use]
    pub fn id_mapping(&self) -> IdMapping {
        let mut mapping = IdMapping::default();
        for entry in &self.mapping {
            mapping.0.insert(entry.from, entry.to);
        }
        mapping
    }
}

/// Pull request: a pipeline and the requester's pulled high-water mark.
/// Naming an execution origin key narrows the pull to that single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub pipeline: String,
    pub since: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<NodeId>,
}

/// Pull response: a wire batch, base64-encoded, plus its high mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub batch: String,
    pub high_mark: u64,
}

/// Encode a batch for a JSON body.
pub fn encode_batch(batch: &SyncBatch) -> Result<String, LineageError> {
    Ok(BASE64.encode(batch_to_bytes(batch)?))
}

/// Decode a batch from a JSON body. Structural validation (magic, version,
/// checksum) happens inside the wire decoder.
pub fn decode_batch(encoded: &str) -> Result<SyncBatch, LineageError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| LineageError::BatchRejected(format!("invalid base64: {e}")))?;
    batch_from_bytes(&bytes)
}

// =============================================================================
// ERRORS
// =============================================================================

/// Uniform error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    /// Wrap an error message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
