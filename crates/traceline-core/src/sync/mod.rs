//! # Synchronization
//!
//! Push/pull coordination between a site store and a central store. This
//! module is the state half of the protocol; [`batch`] is the wire half and
//! [`merge`] the apply half. No networking lives here: a caller moves the
//! serialized batches however it likes and drives the state machine with
//! the outcomes.
//!
//! Per pipeline, a site tracks two high-water marks (the sender clocks last
//! pushed and last pulled) and a transfer status. Crash safety comes from
//! ordering: marks advance only AFTER the far side acknowledged, so an
//! interrupted transfer is simply re-sent and the merge collapses the
//! replayed entities.

pub mod batch;
pub mod merge;

pub use batch::{
    BatchHeader, SyncBatch, batch_from_bytes, batch_to_bytes, collect_batch,
    collect_execution_batch, pipeline_high_mark,
};
pub use merge::{IdMapping, MergeReport, apply_batch};

use crate::graph::LineageGraph;
use crate::{LineageError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// STATUS
// =============================================================================

/// Where a pipeline stands relative to the central store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Nothing local is unpushed.
    Clean,
    /// Local writes exist past the pushed mark.
    Dirty,
    /// A push is in flight.
    Pushing,
    /// A pull is in flight.
    Pulling,
}

/// Persisted per-pipeline high-water marks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarks {
    /// Local write clock covered by the last acknowledged push.
    pub pushed: u64,
    /// Central write clock covered by the last applied pull.
    pub pulled: u64,
}

// =============================================================================
// SITE-SIDE COORDINATOR
// =============================================================================

/// Tracks sync state for every pipeline of one site store.
///
/// Serializable so marks and the learned id mapping survive restarts; the
/// in-flight statuses are deliberately not carried over — a transfer that
/// was live when the process died is treated as aborted on reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteSync {
    marks: BTreeMap<String, SyncMarks>,
    /// Local id to central id, accumulated from push acknowledgements.
    central_ids: BTreeMap<NodeId, NodeId>,
    #[serde(skip)]
    in_flight: BTreeMap<String, SyncStatus>,
}

impl SiteSync {
    /// Fresh state with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks for one pipeline (zeroes if never synced).
    #[must_use]
    pub fn marks(&self, pipeline: &str) -> SyncMarks {
        self.marks.get(pipeline).copied().unwrap_or_default()
    }

    /// Current status of a pipeline, derived from in-flight transfers and
    /// the graph's write clocks.
    #[must_use]
    pub fn status(&self, graph: &LineageGraph, pipeline: &str) -> SyncStatus {
        if let Some(&status) = self.in_flight.get(pipeline) {
            return status;
        }
        if pipeline_high_mark(graph, pipeline) > self.marks(pipeline).pushed {
            SyncStatus::Dirty
        } else {
            SyncStatus::Clean
        }
    }

    /// Central-side id previously assigned to a local node, if known.
    #[must_use]
    pub fn central_id(&self, local: NodeId) -> Option<NodeId> {
        self.central_ids.get(&local).copied()
    }

    /// Start a push: collect everything unpushed into a batch and mark the
    /// pipeline as pushing. Returns `None` when the pipeline is clean.
    pub fn begin_push(
        &mut self,
        graph: &LineageGraph,
        pipeline: &str,
    ) -> Result<Option<SyncBatch>, LineageError> {
        if matches!(
            self.in_flight.get(pipeline),
            Some(SyncStatus::Pushing | SyncStatus::Pulling)
        ) {
            return Err(LineageError::Transport(format!(
                "pipeline '{pipeline}' already has a transfer in flight"
            )));
        }
        let since = self.marks(pipeline).pushed;
        if pipeline_high_mark(graph, pipeline) <= since {
            return Ok(None);
        }
        let batch = collect_batch(graph, pipeline, since)?;
        self.in_flight
            .insert(pipeline.to_string(), SyncStatus::Pushing);
        Ok(Some(batch))
    }

    /// The central store acknowledged a push: advance the pushed mark to the
    /// batch's high mark and remember the id mapping it returned.
    pub fn complete_push(&mut self, pipeline: &str, high_mark: u64, mapping: &IdMapping) {
        let marks = self.marks.entry(pipeline.to_string()).or_default();
        marks.pushed = marks.pushed.max(high_mark);
        for (&local, &central) in &mapping.0 {
            self.central_ids.insert(local, central);
        }
        self.in_flight.remove(pipeline);
    }

    /// A push failed in transit. The mark does not move; the next push
    /// re-sends the same entities and the merge collapses any that landed.
    pub fn abort_push(&mut self, pipeline: &str) {
        self.in_flight.remove(pipeline);
    }

    /// Start a pull: mark the pipeline as pulling and return the mark to
    /// request central changes after.
    pub fn begin_pull(&mut self, pipeline: &str) -> Result<u64, LineageError> {
        if matches!(
            self.in_flight.get(pipeline),
            Some(SyncStatus::Pushing | SyncStatus::Pulling)
        ) {
            return Err(LineageError::Transport(format!(
                "pipeline '{pipeline}' already has a transfer in flight"
            )));
        }
        self.in_flight
            .insert(pipeline.to_string(), SyncStatus::Pulling);
        Ok(self.marks(pipeline).pulled)
    }

    /// Apply a batch received from central and advance the pulled mark.
    pub fn complete_pull(
        &mut self,
        graph: &mut LineageGraph,
        batch: &SyncBatch,
    ) -> Result<MergeReport, LineageError> {
        let (_, report) = apply_batch(graph, batch)?;
        let marks = self.marks.entry(batch.pipeline.clone()).or_default();
        marks.pulled = marks.pulled.max(batch.high_mark);
        // Pulled entities will ride along on the next push; central already
        // knows them by origin key and hash, so the echo collapses there.
        self.in_flight.remove(&batch.pipeline);
        Ok(report)
    }

    /// A pull failed in transit.
    pub fn abort_pull(&mut self, pipeline: &str) {
        self.in_flight.remove(pipeline);
    }
}

// =============================================================================
// TESTS
// =============================================================================
