//! # Lineage Graph Store
//!
//! The single source of truth for one store (site-local or central).
//!
//! This module owns every invariant of the data model:
//! - Pipelines are unique by name; contexts by (pipeline, stage)
//! - Artifacts are unique by content hash — the dedup mechanism
//! - Executions are never merged; each run is a distinct identity
//! - Events are unique by (execution, artifact, direction)
//! - Referential integrity is checked synchronously on every write
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.
//! Writes go through [`LineageGraph::transact`], which restores the previous
//! state on any error, so no partial write is ever visible.

use crate::limits::{MAX_NAME_LENGTH, MAX_PROP_KEY_LENGTH, MAX_PROP_TEXT_LENGTH};
use crate::{
    Artifact, ArtifactKind, ContentHash, Context, Direction, Event, EventKey, Execution,
    LineageError, NodeId, Pipeline, PropMap, PropValue, StoreId, merge_prop,
};
use std::collections::{BTreeMap, BTreeSet};

/// Result of [`LineageGraph::get_or_create_artifact`].
///
/// Observable dedup outcome: callers (and tests) can tell whether a node was
/// newly created or an existing one was reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOutcome {
    /// The resolved artifact node.
    pub id: NodeId,
    /// `true` if a new node was created, `false` if deduplicated.
    pub created: bool,
    /// Previous content hash recorded for the same logical path, when the new
    /// content differs. A warning-level conflict, never an error: the new
    /// content is simply a new artifact version.
    pub path_conflict: Option<ContentHash>,
    /// Number of property keys whose value was replaced by a newer write
    /// during the merge into an existing node.
    pub prop_conflicts: usize,
}

/// The lineage graph for one store.
///
/// Owns its own copies of all entities; nothing is shared by reference across
/// stores. Cross-store identity is reconciled only through the hash index
/// (artifacts) and the origin index (executions).
#[derive(Debug, Clone)]
pub struct LineageGraph {
    /// Identity of this store; baked into every minted `NodeId`.
    store: StoreId,
    /// Next local sequence number for minted ids.
    next_seq: u64,
    /// Monotonic local write counter. Every mutation stamps the touched
    /// entities with the current value; push high-water marks compare
    /// against it.
    clock: u64,

    // Entity storage
    pipelines: BTreeMap<NodeId, Pipeline>,
    contexts: BTreeMap<NodeId, Context>,
    executions: BTreeMap<NodeId, Execution>,
    artifacts: BTreeMap<NodeId, Artifact>,
    events: BTreeMap<EventKey, Event>,

    // Secondary indexes
    /// Pipeline name -> pipeline id.
    name_index: BTreeMap<String, NodeId>,
    /// (pipeline id, stage name) -> context id.
    stage_index: BTreeMap<(NodeId, String), NodeId>,
    /// Content hash -> artifact id. THE dedup index.
    hash_index: BTreeMap<ContentHash, NodeId>,
    /// Execution origin key -> local execution id. Makes re-pushed
    /// executions idempotent.
    origin_index: BTreeMap<NodeId, NodeId>,
    /// Logical path -> content hash last logged under it.
    path_index: BTreeMap<String, ContentHash>,
    /// Reverse event index: (artifact, execution, direction).
    by_artifact: BTreeSet<(NodeId, NodeId, Direction)>,
}

impl LineageGraph {
    /// Create an empty graph owned by the given store.
    #[must_use]
    pub fn new(store: StoreId) -> Self {
        Self {
            store,
            next_seq: 0,
            clock: 0,
            pipelines: BTreeMap::new(),
            contexts: BTreeMap::new(),
            executions: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            events: BTreeMap::new(),
            name_index: BTreeMap::new(),
            stage_index: BTreeMap::new(),
            hash_index: BTreeMap::new(),
            origin_index: BTreeMap::new(),
            path_index: BTreeMap::new(),
            by_artifact: BTreeSet::new(),
        }
    }

    /// The store this graph belongs to.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store
    }

    /// Current local write counter (push high-water mark source).
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Next id sequence number to be minted.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    fn mint_id(&mut self) -> NodeId {
        let id = NodeId::new(self.store, self.next_seq);
        self.next_seq = self.next_seq.saturating_add(1);
        id
    }

    fn tick(&mut self) -> u64 {
        self.clock = self.clock.saturating_add(1);
        self.clock
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Run `f` as one atomic unit: all of its writes commit, or none do.
    ///
    /// On error the graph is restored from a snapshot taken before `f` ran,
    /// so callers outside the transaction never observe partial writes. The
    /// snapshot is released on all exit paths.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, LineageError>,
    ) -> Result<T, LineageError> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                *self = snapshot;
                Err(e)
            }
        }
    }

    // =========================================================================
    // WRITE OPERATIONS
    // =========================================================================

    /// Create a pipeline, or return the existing one with the same name.
    pub fn create_pipeline(&mut self, name: &str, created_ms: u64) -> Result<NodeId, LineageError> {
        validate_name(name, "pipeline name")?;
        if let Some(&id) = self.name_index.get(name) {
            return Ok(id);
        }
        let id = self.mint_id();
        let last_write = self.tick();
        self.pipelines.insert(
            id,
            Pipeline {
                id,
                name: name.to_string(),
                created_ms,
                last_write,
            },
        );
        self.name_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Get or create the context for (pipeline, stage).
    ///
    /// A context is created once per (pipeline, stage) the first time that
    /// stage runs, then reused by subsequent executions of the same stage.
    pub fn get_or_create_context(
        &mut self,
        pipeline: NodeId,
        stage: &str,
        ctx_type: &str,
    ) -> Result<NodeId, LineageError> {
        validate_name(stage, "stage name")?;
        validate_name(ctx_type, "context type")?;
        if !self.pipelines.contains_key(&pipeline) {
            return Err(LineageError::InvalidReference {
                expected: "pipeline",
                id: pipeline,
            });
        }
        if let Some(&id) = self.stage_index.get(&(pipeline, stage.to_string())) {
            return Ok(id);
        }
        let id = self.mint_id();
        let last_write = self.tick();
        self.contexts.insert(
            id,
            Context {
                id,
                pipeline,
                stage: stage.to_string(),
                ctx_type: ctx_type.to_string(),
                props: PropMap::new(),
                last_write,
            },
        );
        self.stage_index.insert((pipeline, stage.to_string()), id);
        Ok(id)
    }

    /// Create a new execution under a context. Always a new node — two runs
    /// are always distinct runs, even with identical properties.
    pub fn create_execution(
        &mut self,
        context: NodeId,
        tool: &str,
        started_ms: u64,
        props: PropMap,
    ) -> Result<NodeId, LineageError> {
        validate_name(tool, "tool name")?;
        validate_props(&props)?;
        if !self.contexts.contains_key(&context) {
            return Err(LineageError::InvalidReference {
                expected: "context",
                id: context,
            });
        }
        let id = self.mint_id();
        let last_write = self.tick();
        self.executions.insert(
            id,
            Execution {
                id,
                origin_key: id,
                context,
                tool: tool.to_string(),
                started_ms,
                props,
                last_write,
            },
        );
        // A locally-created execution is its own origin.
        self.origin_index.insert(id, id);
        Ok(id)
    }

    /// Import an execution that originated at another store.
    ///
    /// Idempotent on the origin key: a re-push of an already-known execution
    /// returns the existing local node (`created == false`) and leaves it
    /// untouched except for property merging.
    pub fn import_execution(
        &mut self,
        origin_key: NodeId,
        context: NodeId,
        tool: &str,
        started_ms: u64,
        props: &PropMap,
    ) -> Result<(NodeId, bool), LineageError> {
        if let Some(&local) = self.origin_index.get(&origin_key) {
            self.merge_execution_props(local, props)?;
            return Ok((local, false));
        }
        validate_name(tool, "tool name")?;
        validate_props(props)?;
        if !self.contexts.contains_key(&context) {
            return Err(LineageError::InvalidReference {
                expected: "context",
                id: context,
            });
        }
        let id = self.mint_id();
        let last_write = self.tick();
        self.executions.insert(
            id,
            Execution {
                id,
                origin_key,
                context,
                tool: tool.to_string(),
                started_ms,
                props: props.clone(),
                last_write,
            },
        );
        self.origin_index.insert(origin_key, id);
        Ok((id, true))
    }

    /// Get or create an artifact by content hash.
    ///
    /// This is the dedup mechanism: if an artifact with this hash exists, new
    /// property keys are merged into it (last write wins by timestamp) and the
    /// existing node is returned. Repeated logging of unchanged data across
    /// hundreds of executions produces exactly one node.
    pub fn get_or_create_artifact(
        &mut self,
        hash: ContentHash,
        path: &str,
        kind: ArtifactKind,
        props: &PropMap,
    ) -> Result<ArtifactOutcome, LineageError> {
        validate_name(path, "logical path")?;
        validate_props(props)?;

        // Same logical path, different content: surfaced to the caller, never
        // silently overwritten — the new content is a new artifact version.
        let path_conflict = match self.path_index.get(path) {
            Some(&prior) if prior != hash => Some(prior),
            _ => None,
        };
        self.path_index.insert(path.to_string(), hash);

        if let Some(&id) = self.hash_index.get(&hash) {
            let prop_conflicts = self.merge_artifact_props(id, props)?;
            return Ok(ArtifactOutcome {
                id,
                created: false,
                path_conflict,
                prop_conflicts,
            });
        }

        let id = self.mint_id();
        let last_write = self.tick();
        self.artifacts.insert(
            id,
            Artifact {
                id,
                hash,
                path: path.to_string(),
                kind,
                props: props.clone(),
                last_write,
            },
        );
        self.hash_index.insert(hash, id);
        Ok(ArtifactOutcome {
            id,
            created: true,
            path_conflict,
            prop_conflicts: 0,
        })
    }

    /// Record a directed event edge between an execution and an artifact.
    ///
    /// Duplicate policy (documented choice): recording an identical
    /// (execution, artifact, direction) event is an idempotent no-op that
    /// returns `false`; the first recording returns `true`.
    pub fn record_event(
        &mut self,
        execution: NodeId,
        artifact: NodeId,
        direction: Direction,
        recorded_ms: u64,
    ) -> Result<bool, LineageError> {
        if !self.executions.contains_key(&execution) {
            return Err(LineageError::InvalidReference {
                expected: "execution",
                id: execution,
            });
        }
        if !self.artifacts.contains_key(&artifact) {
            return Err(LineageError::InvalidReference {
                expected: "artifact",
                id: artifact,
            });
        }
        let key = EventKey {
            execution,
            artifact,
            direction,
        };
        if self.events.contains_key(&key) {
            return Ok(false);
        }
        let last_write = self.tick();
        self.events.insert(
            key,
            Event {
                key,
                recorded_ms,
                last_write,
            },
        );
        self.by_artifact.insert((artifact, execution, direction));
        Ok(true)
    }

    /// Merge property entries into an execution (last write wins per key).
    /// Returns the number of resolved conflicts.
    ///
    /// `last_write` advances only when a key actually changes, so replaying
    /// an already-applied merge does not re-dirty the entity for sync.
    pub fn merge_execution_props(
        &mut self,
        id: NodeId,
        props: &PropMap,
    ) -> Result<usize, LineageError> {
        validate_props(props)?;
        let exec = self
            .executions
            .get_mut(&id)
            .ok_or(LineageError::InvalidReference {
                expected: "execution",
                id,
            })?;
        let mut conflicts = 0usize;
        let mut changed = false;
        for (key, entry) in props {
            changed |= exec
                .props
                .get(key)
                .is_none_or(|existing| existing.updated_ms < entry.updated_ms);
            if merge_prop(&mut exec.props, key, entry.value.clone(), entry.updated_ms) {
                conflicts = conflicts.saturating_add(1);
            }
        }
        if changed {
            let tick = self.tick();
            if let Some(exec) = self.executions.get_mut(&id) {
                exec.last_write = tick;
            }
        }
        Ok(conflicts)
    }

    /// Merge property entries into an artifact (last write wins per key).
    /// Returns the number of resolved conflicts.
    ///
    /// `last_write` advances only when a key actually changes, matching
    /// [`Self::merge_execution_props`].
    pub fn merge_artifact_props(
        &mut self,
        id: NodeId,
        props: &PropMap,
    ) -> Result<usize, LineageError> {
        validate_props(props)?;
        let artifact = self
            .artifacts
            .get_mut(&id)
            .ok_or(LineageError::InvalidReference {
                expected: "artifact",
                id,
            })?;
        let mut conflicts = 0usize;
        let mut changed = false;
        for (key, entry) in props {
            changed |= artifact
                .props
                .get(key)
                .is_none_or(|existing| existing.updated_ms < entry.updated_ms);
            if merge_prop(&mut artifact.props, key, entry.value.clone(), entry.updated_ms) {
                conflicts = conflicts.saturating_add(1);
            }
        }
        if changed {
            let tick = self.tick();
            if let Some(artifact) = self.artifacts.get_mut(&id) {
                artifact.last_write = tick;
            }
        }
        Ok(conflicts)
    }

    /// Merge property entries into a context (last write wins per key).
    pub fn merge_context_props(
        &mut self,
        id: NodeId,
        props: &PropMap,
    ) -> Result<usize, LineageError> {
        validate_props(props)?;
        let ctx = self
            .contexts
            .get_mut(&id)
            .ok_or(LineageError::InvalidReference {
                expected: "context",
                id,
            })?;
        let mut conflicts = 0usize;
        let mut changed = false;
        for (key, entry) in props {
            changed |= ctx
                .props
                .get(key)
                .is_none_or(|existing| existing.updated_ms < entry.updated_ms);
            if merge_prop(&mut ctx.props, key, entry.value.clone(), entry.updated_ms) {
                conflicts = conflicts.saturating_add(1);
            }
        }
        if changed {
            let tick = self.tick();
            if let Some(ctx) = self.contexts.get_mut(&id) {
                ctx.last_write = tick;
            }
        }
        Ok(conflicts)
    }

    /// Set one property on an execution (e.g. metrics logged after the run).
    pub fn set_execution_prop(
        &mut self,
        id: NodeId,
        key: &str,
        value: PropValue,
        updated_ms: u64,
    ) -> Result<(), LineageError> {
        let mut props = PropMap::new();
        props.insert(
            key.to_string(),
            crate::PropEntry {
                value,
                updated_ms,
            },
        );
        self.merge_execution_props(id, &props)?;
        Ok(())
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// Look up a pipeline by name.
    #[must_use]
    pub fn pipeline_by_name(&self, name: &str) -> Option<&Pipeline> {
        self.name_index.get(name).and_then(|id| self.pipelines.get(id))
    }

    /// Look up a pipeline by id.
    #[must_use]
    pub fn pipeline(&self, id: NodeId) -> Option<&Pipeline> {
        self.pipelines.get(&id)
    }

    /// Look up a context by id.
    #[must_use]
    pub fn context(&self, id: NodeId) -> Option<&Context> {
        self.contexts.get(&id)
    }

    /// Look up an execution by id.
    #[must_use]
    pub fn execution(&self, id: NodeId) -> Option<&Execution> {
        self.executions.get(&id)
    }

    /// Look up an execution by its origin key.
    #[must_use]
    pub fn execution_by_origin(&self, origin_key: NodeId) -> Option<&Execution> {
        self.origin_index
            .get(&origin_key)
            .and_then(|id| self.executions.get(id))
    }

    /// Look up an artifact by id.
    #[must_use]
    pub fn artifact(&self, id: NodeId) -> Option<&Artifact> {
        self.artifacts.get(&id)
    }

    /// Look up an artifact by content hash.
    #[must_use]
    pub fn artifact_by_hash(&self, hash: ContentHash) -> Option<&Artifact> {
        self.hash_index.get(&hash).and_then(|id| self.artifacts.get(id))
    }

    // =========================================================================
    // ITERATION (deterministic order)
    // =========================================================================

    /// All pipelines, ordered by id.
    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// All contexts, ordered by id.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    /// Contexts belonging to one pipeline.
    pub fn contexts_of_pipeline(&self, pipeline: NodeId) -> impl Iterator<Item = &Context> {
        self.contexts.values().filter(move |c| c.pipeline == pipeline)
    }

    /// All executions, ordered by id.
    pub fn executions(&self) -> impl Iterator<Item = &Execution> {
        self.executions.values()
    }

    /// Executions belonging to one context (siblings), ordered by id.
    pub fn executions_of_context(&self, context: NodeId) -> impl Iterator<Item = &Execution> {
        self.executions.values().filter(move |e| e.context == context)
    }

    /// All artifacts, ordered by id.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// All events, ordered by (execution, artifact, direction).
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Events attached to one execution.
    pub fn events_of_execution(&self, execution: NodeId) -> impl Iterator<Item = &Event> {
        let lo = EventKey {
            execution,
            artifact: NodeId::new(StoreId(0), 0),
            direction: Direction::Input,
        };
        let hi = EventKey {
            execution,
            artifact: NodeId::new(StoreId(u64::MAX), u64::MAX),
            direction: Direction::Output,
        };
        self.events.range(lo..=hi).map(|(_, e)| e)
    }

    /// Events attached to one artifact, as (execution, direction) pairs.
    pub fn events_of_artifact(
        &self,
        artifact: NodeId,
    ) -> impl Iterator<Item = (NodeId, Direction)> + '_ {
        let lo = (artifact, NodeId::new(StoreId(0), 0), Direction::Input);
        let hi = (
            artifact,
            NodeId::new(StoreId(u64::MAX), u64::MAX),
            Direction::Output,
        );
        self.by_artifact
            .range(lo..=hi)
            .map(|&(_, exec, dir)| (exec, dir))
    }

    // =========================================================================
    // COUNTS
    // =========================================================================

    /// Number of pipelines.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Number of contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    /// Number of artifacts.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Number of events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    // =========================================================================
    // RESTORE (persistence support)
    // =========================================================================

    /// Rebuild a graph from persisted entities, preserving original ids.
    ///
    /// All secondary indexes are derived from the entity records; counters
    /// are advanced past the highest persisted values.
    #[must_use]
    pub fn from_entities(
        store: StoreId,
        next_seq: u64,
        clock: u64,
        pipelines: Vec<Pipeline>,
        contexts: Vec<Context>,
        executions: Vec<Execution>,
        artifacts: Vec<Artifact>,
        events: Vec<Event>,
    ) -> Self {
        let mut graph = Self::new(store);
        graph.next_seq = next_seq;
        graph.clock = clock;
        for p in pipelines {
            graph.name_index.insert(p.name.clone(), p.id);
            graph.pipelines.insert(p.id, p);
        }
        for c in contexts {
            graph.stage_index.insert((c.pipeline, c.stage.clone()), c.id);
            graph.contexts.insert(c.id, c);
        }
        for e in executions {
            graph.origin_index.insert(e.origin_key, e.id);
            graph.executions.insert(e.id, e);
        }
        for a in artifacts {
            graph.hash_index.insert(a.hash, a.id);
            graph.path_index.insert(a.path.clone(), a.hash);
            graph.artifacts.insert(a.id, a);
        }
        for ev in events {
            graph
                .by_artifact
                .insert((ev.key.artifact, ev.key.execution, ev.key.direction));
            graph.events.insert(ev.key, ev);
        }
        graph
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_name(name: &str, what: &str) -> Result<(), LineageError> {
    if name.is_empty() {
        return Err(LineageError::InvalidInput(format!("{} is empty", what)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(LineageError::InvalidInput(format!(
            "{} exceeds {} bytes",
            what, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_props(props: &PropMap) -> Result<(), LineageError> {
    for (key, entry) in props {
        if key.is_empty() || key.len() > MAX_PROP_KEY_LENGTH {
            return Err(LineageError::InvalidInput(format!(
                "property key '{}' out of bounds",
                key
            )));
        }
        if let PropValue::Text(s) = &entry.value {
            if s.len() > MAX_PROP_TEXT_LENGTH {
                return Err(LineageError::InvalidInput(format!(
                    "property '{}' text value exceeds {} bytes",
                    key, MAX_PROP_TEXT_LENGTH
                )));
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
