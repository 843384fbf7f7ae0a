//! # Session
//!
//! The top-level handle applications hold. A session owns one lineage graph,
//! its sync state, and optionally a disk store; every mutating operation
//! goes through the session so persistence happens exactly once per
//! committed change, after the in-memory commit succeeded.

use crate::graph::{ArtifactOutcome, LineageGraph};
use crate::storage::RedbStore;
use crate::sync::{
    IdMapping, MergeReport, SyncBatch, SyncStatus, apply_batch, collect_batch,
    collect_execution_batch,
};
use crate::writer::{Recorder, StageRun};
use crate::{ArtifactKind, ContentHash, Direction, LineageError, NodeId, PropValue, StoreId};
use std::collections::BTreeMap;
use std::path::Path;

/// Where a session keeps its data.
enum Backend {
    /// Everything lives and dies with the process.
    InMemory,
    /// Write-through to a redb database.
    Persistent(RedbStore),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => f.write_str("InMemory"),
            Self::Persistent(_) => f.write_str("Persistent"),
        }
    }
}

/// One store's lineage graph plus sync state, with optional persistence.
#[derive(Debug)]
pub struct Session {
    graph: LineageGraph,
    sync: crate::sync::SiteSync,
    backend: Backend,
}

impl Session {
    /// In-memory session for `store`.
    #[must_use]
    pub fn in_memory(store: StoreId) -> Self {
        Self {
            graph: LineageGraph::new(store),
            sync: crate::sync::SiteSync::new(),
            backend: Backend::InMemory,
        }
    }

    /// Open (or create) a persistent session at `path`. An existing database
    /// keeps the store id it was created with; `default_store` only applies
    /// to a fresh one.
    pub fn open(path: impl AsRef<Path>, default_store: StoreId) -> Result<Self, LineageError> {
        let (store, graph, sync) = RedbStore::open(path, default_store)?;
        Ok(Self {
            graph,
            sync,
            backend: Backend::Persistent(store),
        })
    }

    /// Read access to the graph, for queries.
    #[must_use]
    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    /// The owning store's id.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.graph.store_id()
    }

    fn flush(&mut self) -> Result<(), LineageError> {
        match &mut self.backend {
            Backend::InMemory => Ok(()),
            Backend::Persistent(store) => store.flush(&self.graph, &self.sync),
        }
    }

    // =========================================================================
    // RECORDING
    // =========================================================================

    /// Create a pipeline by name, or return the existing one.
    pub fn create_pipeline(&mut self, name: &str, now_ms: u64) -> Result<NodeId, LineageError> {
        let id = self.graph.create_pipeline(name, now_ms)?;
        self.flush()?;
        Ok(id)
    }

    /// Start a stage run: pipeline, context, and a fresh execution.
    pub fn begin_stage(
        &mut self,
        pipeline: &str,
        stage: &str,
        ctx_type: &str,
        tool: &str,
        props: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<StageRun, LineageError> {
        let run = Recorder::begin_stage(
            &mut self.graph,
            pipeline,
            stage,
            ctx_type,
            tool,
            props,
            now_ms,
        )?;
        self.flush()?;
        Ok(run)
    }

    /// Fingerprint `bytes` and record the artifact plus its usage event.
    pub fn log_artifact(
        &mut self,
        execution: NodeId,
        path: &str,
        bytes: &[u8],
        direction: Direction,
        kind: ArtifactKind,
        props: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<ArtifactOutcome, LineageError> {
        let outcome = Recorder::log_artifact(
            &mut self.graph,
            execution,
            path,
            bytes,
            direction,
            kind,
            props,
            now_ms,
        )?;
        self.flush()?;
        Ok(outcome)
    }

    /// Record an artifact by precomputed hash (content stored elsewhere).
    pub fn log_artifact_hashed(
        &mut self,
        execution: NodeId,
        path: &str,
        hash: ContentHash,
        direction: Direction,
        kind: ArtifactKind,
        props: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<ArtifactOutcome, LineageError> {
        let outcome = Recorder::log_artifact_hashed(
            &mut self.graph,
            execution,
            hash,
            path,
            direction,
            kind,
            props,
            now_ms,
        )?;
        self.flush()?;
        Ok(outcome)
    }

    /// Record a named metrics artifact produced by an execution.
    pub fn log_metrics(
        &mut self,
        execution: NodeId,
        name: &str,
        metrics: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<ArtifactOutcome, LineageError> {
        let outcome = Recorder::log_metrics(&mut self.graph, execution, name, metrics, now_ms)?;
        self.flush()?;
        Ok(outcome)
    }

    /// Set one property on an execution.
    pub fn set_execution_prop(
        &mut self,
        execution: NodeId,
        key: &str,
        value: PropValue,
        now_ms: u64,
    ) -> Result<(), LineageError> {
        self.graph.set_execution_prop(execution, key, value, now_ms)?;
        self.flush()?;
        Ok(())
    }

    // =========================================================================
    // SYNC, SITE SIDE
    // =========================================================================

    /// Sync status of a pipeline.
    #[must_use]
    pub fn sync_status(&self, pipeline: &str) -> SyncStatus {
        self.sync.status(&self.graph, pipeline)
    }

    /// Start pushing a pipeline. `None` when there is nothing to push.
    pub fn begin_push(&mut self, pipeline: &str) -> Result<Option<SyncBatch>, LineageError> {
        self.sync.begin_push(&self.graph, pipeline)
    }

    /// Record a successful push acknowledgement.
    pub fn complete_push(
        &mut self,
        pipeline: &str,
        high_mark: u64,
        mapping: &IdMapping,
    ) -> Result<(), LineageError> {
        self.sync.complete_push(pipeline, high_mark, mapping);
        self.flush()
    }

    /// Give up on an in-flight push; it will be resent in full next time.
    pub fn abort_push(&mut self, pipeline: &str) {
        self.sync.abort_push(pipeline);
    }

    /// Start pulling a pipeline; returns the mark to request changes after.
    pub fn begin_pull(&mut self, pipeline: &str) -> Result<u64, LineageError> {
        self.sync.begin_pull(pipeline)
    }

    /// Apply a pulled batch and advance the pulled mark.
    pub fn complete_pull(&mut self, batch: &SyncBatch) -> Result<MergeReport, LineageError> {
        let report = self.sync.complete_pull(&mut self.graph, batch)?;
        self.flush()?;
        Ok(report)
    }

    /// Give up on an in-flight pull.
    pub fn abort_pull(&mut self, pipeline: &str) {
        self.sync.abort_pull(pipeline);
    }

    /// Merge a batch fetched outside the mark-tracked pull flow, such as a
    /// single-execution pull. The pulled high-water mark does not move: the
    /// batch is partial, so the next full pull must still cover everything.
    pub fn merge_batch(&mut self, batch: &SyncBatch) -> Result<MergeReport, LineageError> {
        let (_, report) = apply_batch(&mut self.graph, batch)?;
        self.flush()?;
        Ok(report)
    }

    // =========================================================================
    // SYNC, CENTRAL SIDE
    // =========================================================================

    /// Accept a pushed batch: merge it and return the id mapping and report
    /// for the acknowledgement.
    pub fn accept_push(
        &mut self,
        batch: &SyncBatch,
    ) -> Result<(IdMapping, MergeReport), LineageError> {
        let result = apply_batch(&mut self.graph, batch)?;
        self.flush()?;
        Ok(result)
    }

    /// Serve a pull request: everything of `pipeline` written after `since`,
    /// or just one execution (with its context, artifacts, and events) when
    /// the request names an origin key.
    pub fn serve_pull(
        &self,
        pipeline: &str,
        since: u64,
        execution: Option<NodeId>,
    ) -> Result<SyncBatch, LineageError> {
        match execution {
            Some(origin_key) => collect_execution_batch(&self.graph, pipeline, origin_key),
            None => collect_batch(&self.graph, pipeline, since),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
