//! # Batch Merge
//!
//! Applies a [`SyncBatch`] to a receiving graph. The whole batch is one
//! transaction: either every entity lands or the graph is untouched. The
//! caller gets back an id mapping (sender id to local id for every accepted
//! entity) and a merge report counting what happened.

use crate::graph::LineageGraph;
use crate::sync::batch::{SyncBatch, props_from_wire};
use crate::{LineageError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sender-side id to local id, for every entity the batch carried.
///
/// A pushing site stores this so later pushes and queries can translate
/// between its ids and the receiver's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping(pub BTreeMap<NodeId, NodeId>);

impl IdMapping {
    /// Local id for a sender-side id, if the batch carried that entity.
    #[must_use]
    pub fn resolve(&self, remote: NodeId) -> Option<NodeId> {
        self.0.get(&remote).copied()
    }
}

/// What a merge did, entity by entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Pipelines created (missing on the receiver).
    pub pipelines_created: usize,
    /// Contexts created.
    pub contexts_created: usize,
    /// Executions created.
    pub executions_created: usize,
    /// Executions already known by origin key and skipped.
    pub executions_skipped: usize,
    /// Artifacts created (hash unseen here).
    pub artifacts_created: usize,
    /// Artifacts matched by hash and property-merged.
    pub artifacts_merged: usize,
    /// Events recorded.
    pub events_recorded: usize,
    /// Duplicate events collapsed.
    pub events_collapsed: usize,
    /// Property conflicts resolved by last-write-wins across all entities.
    pub property_conflicts: usize,
}

impl MergeReport {
    /// Total entities newly created by this merge.
    #[must_use]
    pub fn created(&self) -> usize {
        self.pipelines_created
            + self.contexts_created
            + self.executions_created
            + self.artifacts_created
            + self.events_recorded
    }
}

/// Apply a batch in dependency order inside a single transaction.
///
/// Any dangling reference (a context naming a pipeline the batch did not
/// carry, an event naming an unknown execution) aborts the whole batch with
/// [`LineageError::InvalidReference`] and leaves the graph exactly as it was.
pub fn apply_batch(
    graph: &mut LineageGraph,
    batch: &SyncBatch,
) -> Result<(IdMapping, MergeReport), LineageError> {
    graph.transact(|g| {
        let mut mapping = IdMapping::default();
        let mut report = MergeReport::default();

        for p in &batch.pipelines {
            let existed = g.pipeline_by_name(&p.name).is_some();
            let local = g.create_pipeline(&p.name, p.created_ms)?;
            if !existed {
                report.pipelines_created += 1;
            }
            mapping.0.insert(p.id, local);
        }

        for c in &batch.contexts {
            let pipeline = mapping.resolve(c.pipeline).ok_or(
                LineageError::InvalidReference {
                    expected: "pipeline",
                    id: c.pipeline,
                },
            )?;
            let existed = g
                .contexts_of_pipeline(pipeline)
                .any(|ctx| ctx.stage == c.stage);
            let local = g.get_or_create_context(pipeline, &c.stage, &c.ctx_type)?;
            if !existed {
                report.contexts_created += 1;
            }
            report.property_conflicts += g.merge_context_props(local, &props_from_wire(&c.props))?;
            mapping.0.insert(c.id, local);
        }

        for e in &batch.executions {
            let context = mapping
                .resolve(e.context)
                .ok_or(LineageError::InvalidReference {
                    expected: "context",
                    id: e.context,
                })?;
            let (local, created) = g.import_execution(
                e.origin_key,
                context,
                &e.tool,
                e.started_ms,
                &props_from_wire(&e.props),
            )?;
            if created {
                report.executions_created += 1;
            } else {
                report.executions_skipped += 1;
            }
            mapping.0.insert(e.origin_key, local);
        }

        for a in &batch.artifacts {
            let outcome =
                g.get_or_create_artifact(a.hash, &a.path, a.kind, &props_from_wire(&a.props))?;
            if outcome.created {
                report.artifacts_created += 1;
            } else {
                report.artifacts_merged += 1;
            }
            report.property_conflicts += outcome.prop_conflicts;
            mapping.0.insert(a.id, outcome.id);
        }

        for ev in &batch.events {
            let execution =
                g.execution_by_origin(ev.execution)
                    .map(|e| e.id)
                    .ok_or(LineageError::InvalidReference {
                        expected: "execution",
                        id: ev.execution,
                    })?;
            let artifact = g.artifact_by_hash(ev.artifact).map(|a| a.id).ok_or(
                LineageError::InvalidReference {
                    expected: "artifact",
                    id: NodeId::new(batch.from_store, 0),
                },
            )?;
            if g.record_event(execution, artifact, ev.direction, ev.recorded_ms)? {
                report.events_recorded += 1;
            } else {
                report.events_collapsed += 1;
            }
        }

        Ok((mapping, report))
    })
}

// =============================================================================
// TESTS
// =============================================================================
