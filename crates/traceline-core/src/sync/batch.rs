//! # Sync Batch Format
//!
//! The unit of synchronization: a dependency-ordered snapshot of everything
//! one store changed for one pipeline since a high-water mark.
//!
//! Entities are carried in parent-before-child order (pipeline → contexts →
//! executions → artifacts → events) so a receiver can resolve every reference
//! while applying. Events reference executions by origin key and artifacts by
//! content hash — the two cross-store identity rules.
//!
//! Wire form: `[BatchHeader (postcard)] [SyncBatch (postcard)]` with magic
//! bytes, version, and a deterministic checksum validated before the payload
//! is deserialized.

use crate::graph::LineageGraph;
use crate::limits::{
    BATCH_FORMAT_VERSION, BATCH_MAGIC, MAX_BATCH_ENTITY_COUNT, MAX_BATCH_PAYLOAD_SIZE,
};
use crate::{
    ArtifactKind, ContentHash, Direction, LineageError, NodeId, PropEntry, PropMap, StoreId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// BATCH RECORDS
// =============================================================================

/// One property entry on the wire, timestamp included for merge resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProp {
    /// Property key.
    pub key: String,
    /// Scalar value.
    pub value: crate::PropValue,
    /// Write timestamp driving last-write-wins.
    pub updated_ms: u64,
}

fn props_to_wire(props: &PropMap) -> Vec<BatchProp> {
    props
        .iter()
        .map(|(key, entry)| BatchProp {
            key: key.clone(),
            value: entry.value.clone(),
            updated_ms: entry.updated_ms,
        })
        .collect()
}

/// Rebuild a property map from wire entries.
#[must_use]
pub fn props_from_wire(props: &[BatchProp]) -> PropMap {
    props
        .iter()
        .map(|p| {
            (
                p.key.clone(),
                PropEntry {
                    value: p.value.clone(),
                    updated_ms: p.updated_ms,
                },
            )
        })
        .collect()
}

/// A pipeline on the wire. Matched by name on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPipeline {
    /// Sender-side id (for the returned id mapping).
    pub id: NodeId,
    /// Unique name, the cross-store match key.
    pub name: String,
    /// Creation timestamp.
    pub created_ms: u64,
}

/// A context on the wire. Matched by (pipeline, stage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchContext {
    /// Sender-side id.
    pub id: NodeId,
    /// Sender-side pipeline id (resolved through the mapping being built).
    pub pipeline: NodeId,
    /// Stage name, part of the match key.
    pub stage: String,
    /// Context type.
    pub ctx_type: String,
    /// Custom properties.
    pub props: Vec<BatchProp>,
}

/// An execution on the wire. Never merged — matched only by origin key for
/// idempotent skip of re-pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecution {
    /// The id this execution had at the store that created it. Doubles as
    /// the sender-side id in the returned mapping.
    pub origin_key: NodeId,
    /// Sender-side context id.
    pub context: NodeId,
    /// Tool name.
    pub tool: String,
    /// Start timestamp.
    pub started_ms: u64,
    /// Custom properties.
    pub props: Vec<BatchProp>,
}

/// An artifact on the wire. Matched globally by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchArtifact {
    /// Sender-side id (for the returned id mapping).
    pub id: NodeId,
    /// Content hash — the identity used for matching.
    pub hash: ContentHash,
    /// Logical path.
    pub path: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Custom properties.
    pub props: Vec<BatchProp>,
}

/// An event on the wire. Matched by (execution origin key, artifact hash,
/// direction); duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEvent {
    /// Origin key of the execution side.
    pub execution: NodeId,
    /// Content hash of the artifact side.
    pub artifact: ContentHash,
    /// Consumed or produced.
    pub direction: Direction,
    /// When the edge was recorded.
    pub recorded_ms: u64,
}

// =============================================================================
// SYNC BATCH
// =============================================================================

/// A dependency-ordered entity batch for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// The store that built this batch.
    pub from_store: StoreId,
    /// The sender's pipeline name this batch covers.
    pub pipeline: String,
    /// The sender's write clock at collection time. After a successful
    /// apply, the receiver's high-water mark for this sender advances here.
    pub high_mark: u64,
    /// Pipelines (parent-most first in apply order).
    pub pipelines: Vec<BatchPipeline>,
    /// Contexts.
    pub contexts: Vec<BatchContext>,
    /// Executions.
    pub executions: Vec<BatchExecution>,
    /// Artifacts.
    pub artifacts: Vec<BatchArtifact>,
    /// Events (child-most, applied last).
    pub events: Vec<BatchEvent>,
}

impl SyncBatch {
    /// Total number of entities carried.
    #[must_use]
    pub fn entity_count(&self) -> u64 {
        (self.pipelines.len()
            + self.contexts.len()
            + self.executions.len()
            + self.artifacts.len()
            + self.events.len()) as u64
    }

    /// True if the batch carries no entities at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }
}

// =============================================================================
// COLLECTION
// =============================================================================

/// Highest local write sequence among a pipeline's entities.
///
/// A pipeline is dirty when this exceeds its pushed high-water mark.
#[must_use]
pub fn pipeline_high_mark(graph: &LineageGraph, pipeline_name: &str) -> u64 {
    let Some(pipeline) = graph.pipeline_by_name(pipeline_name) else {
        return 0;
    };
    let mut high = pipeline.last_write;
    for ctx in graph.contexts_of_pipeline(pipeline.id) {
        high = high.max(ctx.last_write);
        for exec in graph.executions_of_context(ctx.id) {
            high = high.max(exec.last_write);
            for event in graph.events_of_execution(exec.id) {
                high = high.max(event.last_write);
                if let Some(artifact) = graph.artifact(event.key.artifact) {
                    high = high.max(artifact.last_write);
                }
            }
        }
    }
    high
}

/// Collect everything of `pipeline_name` written after `since` into a batch.
///
/// Parents referenced by included children are always carried too (the merge
/// is idempotent, so re-sending an already-known parent is free), which keeps
/// every reference in the batch resolvable on a receiver that has never seen
/// this pipeline.
pub fn collect_batch(
    graph: &LineageGraph,
    pipeline_name: &str,
    since: u64,
) -> Result<SyncBatch, LineageError> {
    let pipeline = graph
        .pipeline_by_name(pipeline_name)
        .ok_or_else(|| LineageError::UnknownPipeline(pipeline_name.to_string()))?;

    let mut batch = SyncBatch {
        from_store: graph.store_id(),
        pipeline: pipeline_name.to_string(),
        high_mark: graph.clock(),
        pipelines: vec![BatchPipeline {
            id: pipeline.id,
            name: pipeline.name.clone(),
            created_ms: pipeline.created_ms,
        }],
        contexts: Vec::new(),
        executions: Vec::new(),
        artifacts: Vec::new(),
        events: Vec::new(),
    };

    let mut included_artifacts: BTreeSet<NodeId> = BTreeSet::new();

    for ctx in graph.contexts_of_pipeline(pipeline.id) {
        // Does anything under this context need sending?
        let mut ctx_executions = Vec::new();
        for exec in graph.executions_of_context(ctx.id) {
            let mut exec_events = Vec::new();
            for event in graph.events_of_execution(exec.id) {
                if event.last_write > since {
                    exec_events.push(event);
                }
            }
            if exec.last_write > since || !exec_events.is_empty() {
                ctx_executions.push((exec, exec_events));
            }
        }
        if ctx.last_write <= since && ctx_executions.is_empty() {
            continue;
        }

        batch.contexts.push(BatchContext {
            id: ctx.id,
            pipeline: pipeline.id,
            stage: ctx.stage.clone(),
            ctx_type: ctx.ctx_type.clone(),
            props: props_to_wire(&ctx.props),
        });

        for (exec, events) in ctx_executions {
            batch.executions.push(BatchExecution {
                origin_key: exec.origin_key,
                context: ctx.id,
                tool: exec.tool.clone(),
                started_ms: exec.started_ms,
                props: props_to_wire(&exec.props),
            });
            for event in events {
                let Some(artifact) = graph.artifact(event.key.artifact) else {
                    continue;
                };
                if included_artifacts.insert(artifact.id) {
                    batch.artifacts.push(BatchArtifact {
                        id: artifact.id,
                        hash: artifact.hash,
                        path: artifact.path.clone(),
                        kind: artifact.kind,
                        props: props_to_wire(&artifact.props),
                    });
                }
                batch.events.push(BatchEvent {
                    execution: exec.origin_key,
                    artifact: artifact.hash,
                    direction: event.key.direction,
                    recorded_ms: event.recorded_ms,
                });
            }
        }
    }

    // Artifacts whose properties changed without a new event still need to
    // travel, so property updates (e.g. late metrics) propagate.
    for ctx in graph.contexts_of_pipeline(pipeline.id) {
        for exec in graph.executions_of_context(ctx.id) {
            for event in graph.events_of_execution(exec.id) {
                let Some(artifact) = graph.artifact(event.key.artifact) else {
                    continue;
                };
                if artifact.last_write > since && included_artifacts.insert(artifact.id) {
                    batch.artifacts.push(BatchArtifact {
                        id: artifact.id,
                        hash: artifact.hash,
                        path: artifact.path.clone(),
                        kind: artifact.kind,
                        props: props_to_wire(&artifact.props),
                    });
                }
            }
        }
    }

    Ok(batch)
}

/// Collect a single execution of `pipeline_name` into a batch: the pipeline,
/// the execution's context, the execution itself, and every artifact and
/// event it touched.
///
/// The execution is addressed by its origin key, which stays stable across
/// stores, so a site can fetch one run from central regardless of the local
/// ids central assigned on import.
pub fn collect_execution_batch(
    graph: &LineageGraph,
    pipeline_name: &str,
    origin_key: NodeId,
) -> Result<SyncBatch, LineageError> {
    let pipeline = graph
        .pipeline_by_name(pipeline_name)
        .ok_or_else(|| LineageError::UnknownPipeline(pipeline_name.to_string()))?;
    let exec = graph
        .execution_by_origin(origin_key)
        .ok_or(LineageError::InvalidReference {
            expected: "execution",
            id: origin_key,
        })?;
    let ctx = graph
        .context(exec.context)
        .ok_or(LineageError::InvalidReference {
            expected: "context",
            id: exec.context,
        })?;
    if ctx.pipeline != pipeline.id {
        return Err(LineageError::InvalidReference {
            expected: "execution",
            id: origin_key,
        });
    }

    let mut batch = SyncBatch {
        from_store: graph.store_id(),
        pipeline: pipeline_name.to_string(),
        high_mark: graph.clock(),
        pipelines: vec![BatchPipeline {
            id: pipeline.id,
            name: pipeline.name.clone(),
            created_ms: pipeline.created_ms,
        }],
        contexts: vec![BatchContext {
            id: ctx.id,
            pipeline: pipeline.id,
            stage: ctx.stage.clone(),
            ctx_type: ctx.ctx_type.clone(),
            props: props_to_wire(&ctx.props),
        }],
        executions: vec![BatchExecution {
            origin_key: exec.origin_key,
            context: ctx.id,
            tool: exec.tool.clone(),
            started_ms: exec.started_ms,
            props: props_to_wire(&exec.props),
        }],
        artifacts: Vec::new(),
        events: Vec::new(),
    };

    let mut included_artifacts: BTreeSet<NodeId> = BTreeSet::new();
    for event in graph.events_of_execution(exec.id) {
        let Some(artifact) = graph.artifact(event.key.artifact) else {
            continue;
        };
        if included_artifacts.insert(artifact.id) {
            batch.artifacts.push(BatchArtifact {
                id: artifact.id,
                hash: artifact.hash,
                path: artifact.path.clone(),
                kind: artifact.kind,
                props: props_to_wire(&artifact.props),
            });
        }
        batch.events.push(BatchEvent {
            execution: exec.origin_key,
            artifact: artifact.hash,
            direction: event.key.direction,
            recorded_ms: event.recorded_ms,
        });
    }

    Ok(batch)
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Header preceding the serialized batch payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHeader {
    /// Magic bytes identifying the format.
    pub magic: [u8; 4],
    /// Format version.
    pub version: u8,
    /// Number of entities in the payload.
    pub entity_count: u64,
    /// Deterministic checksum of the payload bytes.
    pub checksum: u64,
}

impl BatchHeader {
    /// Validate magic, version, and entity count bounds.
    ///
    /// Runs BEFORE payload deserialization so a hostile batch is rejected
    /// without allocation.
    pub fn validate(&self) -> Result<(), LineageError> {
        if &self.magic != BATCH_MAGIC {
            return Err(LineageError::BatchRejected("invalid format".to_string()));
        }
        if self.version != BATCH_FORMAT_VERSION {
            return Err(LineageError::BatchRejected(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.entity_count > MAX_BATCH_ENTITY_COUNT {
            return Err(LineageError::BatchRejected(format!(
                "entity count {} exceeds limit",
                self.entity_count
            )));
        }
        Ok(())
    }
}

/// Deterministic checksum over payload bytes.
///
/// Not cryptographic — it exists to catch truncation and corruption in
/// transit before a partial batch reaches the merge.
#[must_use]
pub fn payload_checksum(payload: &[u8]) -> u64 {
    let mut hash: u64 = payload.len() as u64;
    for (i, byte) in payload.iter().enumerate() {
        hash ^= (u64::from(*byte)).rotate_left((i % 57) as u32);
        hash = hash.rotate_left(1);
    }
    hash
}

/// Serialize a batch to its wire form.
pub fn batch_to_bytes(batch: &SyncBatch) -> Result<Vec<u8>, LineageError> {
    let payload =
        postcard::to_stdvec(batch).map_err(|e| LineageError::Serialization(e.to_string()))?;
    let header = BatchHeader {
        magic: *BATCH_MAGIC,
        version: BATCH_FORMAT_VERSION,
        entity_count: batch.entity_count(),
        checksum: payload_checksum(&payload),
    };
    let mut out =
        postcard::to_stdvec(&header).map_err(|e| LineageError::Serialization(e.to_string()))?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Deserialize a batch from its wire form, validating header and checksum
/// first.
pub fn batch_from_bytes(bytes: &[u8]) -> Result<SyncBatch, LineageError> {
    if bytes.len() > MAX_BATCH_PAYLOAD_SIZE {
        return Err(LineageError::BatchRejected(format!(
            "batch of {} bytes exceeds limit",
            bytes.len()
        )));
    }
    let (header, payload): (BatchHeader, &[u8]) = postcard::take_from_bytes(bytes)
        .map_err(|e| LineageError::BatchRejected(format!("unreadable header: {e}")))?;
    header.validate()?;
    if payload_checksum(payload) != header.checksum {
        return Err(LineageError::BatchRejected("checksum mismatch".to_string()));
    }
    let batch: SyncBatch = postcard::from_bytes(payload)
        .map_err(|e| LineageError::Serialization(e.to_string()))?;
    if batch.entity_count() != header.entity_count {
        return Err(LineageError::BatchRejected(
            "entity count disagrees with header".to_string(),
        ));
    }
    Ok(batch)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Recorder;
    use std::collections::BTreeMap;

    fn populated() -> LineageGraph {
        let mut g = LineageGraph::new(StoreId(4));
        let run = Recorder::begin_stage(
            &mut g,
            "demo",
            "train",
            "train",
            "train.py",
            BTreeMap::new(),
            100,
        )
        .expect("stage");
        Recorder::log_artifact(
            &mut g,
            run.execution,
            "raw.csv",
            b"data",
            Direction::Input,
            ArtifactKind::Dataset,
            BTreeMap::new(),
            101,
        )
        .expect("log");
        g
    }

    #[test]
    fn collect_includes_dependency_order() {
        let g = populated();
        let batch = collect_batch(&g, "demo", 0).expect("collect");
        assert_eq!(batch.pipelines.len(), 1);
        assert_eq!(batch.contexts.len(), 1);
        assert_eq!(batch.executions.len(), 1);
        assert_eq!(batch.artifacts.len(), 1);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.high_mark, g.clock());
    }

    #[test]
    fn collect_since_high_mark_is_empty_of_children() {
        let g = populated();
        let batch = collect_batch(&g, "demo", g.clock()).expect("collect");
        // The pipeline record always travels; nothing else should
        assert_eq!(batch.contexts.len(), 0);
        assert_eq!(batch.executions.len(), 0);
        assert_eq!(batch.events.len(), 0);
    }

    #[test]
    fn events_carry_parents_even_if_old() {
        // An event written after the mark must drag its (older) execution and
        // artifact along so the receiver can resolve references.
        let mut g = populated();
        let mark = g.clock();
        let exec = g.executions().next().expect("exec").id;
        let artifact = g.artifacts().next().expect("artifact").id;
        g.record_event(exec, artifact, Direction::Output, 200).expect("event");

        let batch = collect_batch(&g, "demo", mark).expect("collect");
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.executions.len(), 1);
        assert_eq!(batch.artifacts.len(), 1);
    }

    #[test]
    fn wire_roundtrip() {
        let g = populated();
        let batch = collect_batch(&g, "demo", 0).expect("collect");
        let bytes = batch_to_bytes(&batch).expect("serialize");
        let restored = batch_from_bytes(&bytes).expect("deserialize");
        assert_eq!(batch, restored);
    }

    #[test]
    fn corrupted_payload_rejected_by_checksum() {
        let g = populated();
        let batch = collect_batch(&g, "demo", 0).expect("collect");
        let mut bytes = batch_to_bytes(&batch).expect("serialize");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            batch_from_bytes(&bytes),
            Err(LineageError::BatchRejected(_))
        ));
    }

    #[test]
    fn truncated_batch_rejected() {
        let g = populated();
        let batch = collect_batch(&g, "demo", 0).expect("collect");
        let bytes = batch_to_bytes(&batch).expect("serialize");
        // Simulate a transfer dying after 3/5 of the bytes
        let cut = bytes.len() * 3 / 5;
        assert!(batch_from_bytes(&bytes[..cut]).is_err());
    }

    #[test]
    fn wrong_magic_rejected() {
        let header = BatchHeader {
            magic: *b"XXXX",
            version: BATCH_FORMAT_VERSION,
            entity_count: 0,
            checksum: 0,
        };
        assert!(matches!(
            header.validate(),
            Err(LineageError::BatchRejected(_))
        ));
    }
}
