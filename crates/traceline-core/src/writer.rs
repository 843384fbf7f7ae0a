//! # Local Writer API
//!
//! The mutation surface a running pipeline stage uses on its site-local
//! store.
//!
//! Ordering is enforced structurally: [`Recorder::begin_stage`] creates (or
//! reuses) the context and opens a new execution before any event can be
//! recorded, and every artifact log goes through the dedup index before its
//! event edge is written. Each call is one atomic transaction.

use crate::graph::{ArtifactOutcome, LineageGraph};
use crate::{
    ArtifactKind, ContentHash, Direction, LineageError, NodeId, PropEntry, PropMap, PropValue,
    fingerprint,
};
use std::collections::BTreeMap;

/// Handle to one live stage run: the ids a pipeline process needs to log
/// against its own execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRun {
    /// The pipeline the stage belongs to.
    pub pipeline: NodeId,
    /// The (reused) context for this stage.
    pub context: NodeId,
    /// The newly-created execution for this run.
    pub execution: NodeId,
}

/// Stamp plain property values with a write timestamp.
#[must_use]
pub fn stamp_props(props: BTreeMap<String, PropValue>, now_ms: u64) -> PropMap {
    props
        .into_iter()
        .map(|(k, value)| (k, PropEntry { value, updated_ms: now_ms }))
        .collect()
}

/// The Recorder drives the writer sequence against a lineage graph.
///
/// Stateless, like the store itself: every function takes the graph and a
/// caller-supplied timestamp. Errors propagate from the graph store
/// unchanged.
pub struct Recorder;

impl Recorder {
    /// Start a stage run: pipeline (idempotent) → context (idempotent) →
    /// new execution, as one transaction.
    pub fn begin_stage(
        graph: &mut LineageGraph,
        pipeline_name: &str,
        stage: &str,
        ctx_type: &str,
        tool: &str,
        props: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<StageRun, LineageError> {
        let props = stamp_props(props, now_ms);
        graph.transact(|tx| {
            let pipeline = tx.create_pipeline(pipeline_name, now_ms)?;
            let context = tx.get_or_create_context(pipeline, stage, ctx_type)?;
            let execution = tx.create_execution(context, tool, now_ms, props)?;
            Ok(StageRun {
                pipeline,
                context,
                execution,
            })
        })
    }

    /// Log an in-memory blob as an artifact of `execution`.
    ///
    /// Computes the content fingerprint, resolves the artifact through the
    /// dedup index, then records the event edge. The returned outcome says
    /// whether the node was newly created or deduplicated, and whether the
    /// logical path previously carried different content.
    pub fn log_artifact(
        graph: &mut LineageGraph,
        execution: NodeId,
        path: &str,
        bytes: &[u8],
        direction: Direction,
        kind: ArtifactKind,
        props: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<ArtifactOutcome, LineageError> {
        let hash = fingerprint::fingerprint(bytes);
        Self::log_artifact_hashed(graph, execution, hash, path, direction, kind, props, now_ms)
    }

    /// Log an artifact whose content hash was computed elsewhere (e.g. by
    /// streaming a large file through [`fingerprint::fingerprint_file`]).
    pub fn log_artifact_hashed(
        graph: &mut LineageGraph,
        execution: NodeId,
        hash: ContentHash,
        path: &str,
        direction: Direction,
        kind: ArtifactKind,
        props: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<ArtifactOutcome, LineageError> {
        let props = stamp_props(props, now_ms);
        graph.transact(|tx| {
            // Execution must exist before any event is recorded against it.
            if tx.execution(execution).is_none() {
                return Err(LineageError::InvalidReference {
                    expected: "execution",
                    id: execution,
                });
            }
            let outcome = tx.get_or_create_artifact(hash, path, kind, &props)?;
            tx.record_event(execution, outcome.id, direction, now_ms)?;
            Ok(outcome)
        })
    }

    /// Log a named metrics map as a METRIC-kind artifact.
    ///
    /// Sugar over [`Self::log_artifact`]: the metrics map is canonically
    /// serialized and hashed the same way as data/model content, so identical
    /// metrics deduplicate and participate in lineage like any artifact. The
    /// metric values are also attached as artifact properties for querying.
    pub fn log_metrics(
        graph: &mut LineageGraph,
        execution: NodeId,
        name: &str,
        metrics: BTreeMap<String, PropValue>,
        now_ms: u64,
    ) -> Result<ArtifactOutcome, LineageError> {
        let content = fingerprint::metrics_content(name, &metrics)?;
        Self::log_artifact(
            graph,
            execution,
            name,
            &content,
            Direction::Output,
            ArtifactKind::Metrics,
            metrics,
            now_ms,
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreId;

    fn start(graph: &mut LineageGraph) -> StageRun {
        Recorder::begin_stage(graph, "demo", "train", "train", "train.py", BTreeMap::new(), 100)
            .expect("begin stage")
    }

    #[test]
    fn begin_stage_reuses_context_across_runs() {
        let mut g = LineageGraph::new(StoreId(1));
        let run1 = start(&mut g);
        let run2 = start(&mut g);
        assert_eq!(run1.pipeline, run2.pipeline);
        assert_eq!(run1.context, run2.context);
        assert_ne!(run1.execution, run2.execution);
    }

    #[test]
    fn log_artifact_dedups_and_reports() {
        let mut g = LineageGraph::new(StoreId(1));
        let run1 = start(&mut g);
        let run2 = start(&mut g);

        let first = Recorder::log_artifact(
            &mut g,
            run1.execution,
            "raw.csv",
            b"the same bytes",
            Direction::Input,
            ArtifactKind::Dataset,
            BTreeMap::new(),
            101,
        )
        .expect("log");
        assert!(first.created);

        let second = Recorder::log_artifact(
            &mut g,
            run2.execution,
            "raw.csv",
            b"the same bytes",
            Direction::Input,
            ArtifactKind::Dataset,
            BTreeMap::new(),
            102,
        )
        .expect("log");
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(g.artifact_count(), 1);
        assert_eq!(g.event_count(), 2);
    }

    #[test]
    fn log_artifact_unknown_execution_is_clean_failure() {
        let mut g = LineageGraph::new(StoreId(1));
        let bogus = NodeId::new(StoreId(5), 5);
        let err = Recorder::log_artifact(
            &mut g,
            bogus,
            "raw.csv",
            b"bytes",
            Direction::Input,
            ArtifactKind::Dataset,
            BTreeMap::new(),
            101,
        );
        assert!(err.is_err());
        // The failed call left nothing behind
        assert_eq!(g.artifact_count(), 0);
        assert_eq!(g.event_count(), 0);
    }

    #[test]
    fn log_metrics_dedups_identical_maps() {
        let mut g = LineageGraph::new(StoreId(1));
        let run = start(&mut g);

        let mut metrics = BTreeMap::new();
        metrics.insert("accuracy".to_string(), PropValue::Number(0.93));

        let first =
            Recorder::log_metrics(&mut g, run.execution, "eval_metrics", metrics.clone(), 200)
                .expect("metrics");
        assert!(first.created);

        let run2 = start(&mut g);
        let second =
            Recorder::log_metrics(&mut g, run2.execution, "eval_metrics", metrics, 201)
                .expect("metrics");
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let stored = g.artifact(first.id).expect("artifact");
        assert_eq!(stored.kind, ArtifactKind::Metrics);
        assert_eq!(stored.props["accuracy"].value, PropValue::Number(0.93));
    }
}
