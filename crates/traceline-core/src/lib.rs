//! # traceline-core
//!
//! The deterministic metadata lineage store - THE LOGIC.
//!
//! This crate implements the core substrate: a content-addressed lineage
//! graph over ML pipeline runs (pipelines, stage contexts, executions,
//! artifacts, and the directed events connecting them), plus the idempotent
//! push/pull synchronization that merges graphs across stores.
//!
//! ## Architectural Constraints
//!
//! - The graph is the ONLY place where lineage state lives (stateful)
//! - Deterministic: identical operation sequences produce identical graphs
//! - Never reads clocks or environment; callers pass timestamps in
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod blob;
pub mod fingerprint;
pub mod graph;
pub mod limits;
pub mod query;
pub mod session;
pub mod storage;
pub mod sync;
pub mod types;
pub mod writer;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Artifact, ArtifactKind, ContentHash, Context, Direction, Event, EventKey, Execution,
    LineageError, NodeId, Pipeline, PropEntry, PropMap, PropValue, StoreId, merge_prop,
};

// =============================================================================
// RE-EXPORTS: Graph and Recording
// =============================================================================

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use fingerprint::{fingerprint, fingerprint_file, fingerprint_reader};
pub use graph::{ArtifactOutcome, LineageGraph};
pub use session::Session;
pub use storage::RedbStore;
pub use writer::{Recorder, StageRun};

// =============================================================================
// RE-EXPORTS: Query Engine
// =============================================================================

pub use query::{
    ArtifactFilter, ArtifactFilterField, ArtifactPage, ArtifactRow, ArtifactSortField,
    ExecutionFilter, ExecutionPage, ExecutionRow, FilterField, Lineage, LineageEdge, LineageNode,
    LineageNodeKind, SortField, SortOrder, artifact_lineage, execution_lineage, execution_types,
    list_artifacts, list_executions, list_pipelines, resolve_execution_ref,
};

// =============================================================================
// RE-EXPORTS: Synchronization
// =============================================================================

pub use sync::{
    IdMapping, MergeReport, SiteSync, SyncBatch, SyncMarks, SyncStatus, apply_batch,
    batch_from_bytes, batch_to_bytes, collect_batch, collect_execution_batch, pipeline_high_mark,
};
