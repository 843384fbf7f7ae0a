//! # redb-backed Lineage Storage
//!
//! Write-through persistence on redb. The in-memory [`LineageGraph`] remains
//! the source of truth for reads; after each committed mutation the session
//! flushes every entity written since the last flush into the database in
//! one ACID transaction. On open, the whole graph and the sync state are
//! rebuilt from disk.
//!
//! Entity keys are the `(origin, seq)` pair of their [`NodeId`], so a single
//! database can hold nodes minted by many stores without collision.

use crate::graph::LineageGraph;
use crate::sync::SiteSync;
use crate::{Artifact, Context, Direction, Event, Execution, LineageError, Pipeline, StoreId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Pipelines: (origin, seq) -> serialized Pipeline.
const PIPELINES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("pipelines");

/// Contexts: (origin, seq) -> serialized Context.
const CONTEXTS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("contexts");

/// Executions: (origin, seq) -> serialized Execution.
const EXECUTIONS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("executions");

/// Artifacts: (origin, seq) -> serialized Artifact.
const ARTIFACTS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("artifacts");

/// Events: (exec origin, exec seq, artifact origin, artifact seq, direction)
/// -> serialized Event. The flat key mirrors the event's identity triple.
const EVENTS: TableDefinition<(u64, u64, u64, u64, u8), &[u8]> = TableDefinition::new("events");

/// Store metadata: key -> u64 ("store_id", "next_seq", "clock").
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Sync state blobs: key -> serialized bytes ("site_sync").
const SYNC: TableDefinition<&str, &[u8]> = TableDefinition::new("sync");

fn io_err(e: impl std::fmt::Display) -> LineageError {
    LineageError::Io(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> LineageError {
    LineageError::Serialization(e.to_string())
}

fn direction_tag(direction: Direction) -> u8 {
    match direction {
        Direction::Input => 0,
        Direction::Output => 1,
    }
}

/// Write-through disk store for one lineage graph.
pub struct RedbStore {
    db: Database,
    /// Write clock through which entities are on disk.
    persisted: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("persisted", &self.persisted)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at `path` and rebuild the graph and sync
    /// state from it. A fresh database yields an empty graph owned by
    /// `default_store`.
    pub fn open(
        path: impl AsRef<Path>,
        default_store: StoreId,
    ) -> Result<(Self, LineageGraph, SiteSync), LineageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(PIPELINES).map_err(io_err)?;
            let _ = write_txn.open_table(CONTEXTS).map_err(io_err)?;
            let _ = write_txn.open_table(EXECUTIONS).map_err(io_err)?;
            let _ = write_txn.open_table(ARTIFACTS).map_err(io_err)?;
            let _ = write_txn.open_table(EVENTS).map_err(io_err)?;
            let _ = write_txn.open_table(META).map_err(io_err)?;
            let _ = write_txn.open_table(SYNC).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let read_txn = db.begin_read().map_err(io_err)?;

        let meta = read_txn.open_table(META).map_err(io_err)?;
        let meta_value = |key: &str| -> Result<Option<u64>, LineageError> {
            Ok(meta.get(key).map_err(io_err)?.map(|v| v.value()))
        };
        let store_id = StoreId(meta_value("store_id")?.unwrap_or(default_store.0));
        let next_seq = meta_value("next_seq")?.unwrap_or(0);
        let clock = meta_value("clock")?.unwrap_or(0);

        fn load_entities<T: serde::de::DeserializeOwned>(
            txn: &redb::ReadTransaction,
            table: TableDefinition<(u64, u64), &[u8]>,
        ) -> Result<Vec<T>, LineageError> {
            let table = txn.open_table(table).map_err(io_err)?;
            let mut out = Vec::new();
            for entry in table.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                out.push(postcard::from_bytes(value.value()).map_err(ser_err)?);
            }
            Ok(out)
        }

        let pipelines: Vec<Pipeline> = load_entities(&read_txn, PIPELINES)?;
        let contexts: Vec<Context> = load_entities(&read_txn, CONTEXTS)?;
        let executions: Vec<Execution> = load_entities(&read_txn, EXECUTIONS)?;
        let artifacts: Vec<Artifact> = load_entities(&read_txn, ARTIFACTS)?;

        let events: Vec<Event> = {
            let table = read_txn.open_table(EVENTS).map_err(io_err)?;
            let mut out = Vec::new();
            for entry in table.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                out.push(postcard::from_bytes(value.value()).map_err(ser_err)?);
            }
            out
        };

        let sync = {
            let table = read_txn.open_table(SYNC).map_err(io_err)?;
            match table.get("site_sync").map_err(io_err)? {
                Some(blob) => postcard::from_bytes(blob.value()).map_err(ser_err)?,
                None => SiteSync::new(),
            }
        };

        let graph = LineageGraph::from_entities(
            store_id, next_seq, clock, pipelines, contexts, executions, artifacts, events,
        );

        Ok((Self { db, persisted: clock }, graph, sync))
    }

    /// Persist everything written since the last flush, plus the sync state,
    /// in one transaction. In-memory state only advances after the commit.
    pub fn flush(&mut self, graph: &LineageGraph, sync: &SiteSync) -> Result<(), LineageError> {
        let since = self.persisted;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut pipelines = write_txn.open_table(PIPELINES).map_err(io_err)?;
            for p in graph.pipelines().filter(|p| p.last_write > since) {
                let bytes = postcard::to_stdvec(p).map_err(ser_err)?;
                pipelines
                    .insert((p.id.origin.0, p.id.seq), bytes.as_slice())
                    .map_err(io_err)?;
            }

            let mut contexts = write_txn.open_table(CONTEXTS).map_err(io_err)?;
            for c in graph.contexts().filter(|c| c.last_write > since) {
                let bytes = postcard::to_stdvec(c).map_err(ser_err)?;
                contexts
                    .insert((c.id.origin.0, c.id.seq), bytes.as_slice())
                    .map_err(io_err)?;
            }

            let mut executions = write_txn.open_table(EXECUTIONS).map_err(io_err)?;
            for e in graph.executions().filter(|e| e.last_write > since) {
                let bytes = postcard::to_stdvec(e).map_err(ser_err)?;
                executions
                    .insert((e.id.origin.0, e.id.seq), bytes.as_slice())
                    .map_err(io_err)?;
            }

            let mut artifacts = write_txn.open_table(ARTIFACTS).map_err(io_err)?;
            for a in graph.artifacts().filter(|a| a.last_write > since) {
                let bytes = postcard::to_stdvec(a).map_err(ser_err)?;
                artifacts
                    .insert((a.id.origin.0, a.id.seq), bytes.as_slice())
                    .map_err(io_err)?;
            }

            let mut events = write_txn.open_table(EVENTS).map_err(io_err)?;
            for ev in graph.events().filter(|ev| ev.last_write > since) {
                let bytes = postcard::to_stdvec(ev).map_err(ser_err)?;
                let key = (
                    ev.key.execution.origin.0,
                    ev.key.execution.seq,
                    ev.key.artifact.origin.0,
                    ev.key.artifact.seq,
                    direction_tag(ev.key.direction),
                );
                events.insert(key, bytes.as_slice()).map_err(io_err)?;
            }

            let mut meta = write_txn.open_table(META).map_err(io_err)?;
            meta.insert("store_id", graph.store_id().0).map_err(io_err)?;
            meta.insert("next_seq", graph.next_seq()).map_err(io_err)?;
            meta.insert("clock", graph.clock()).map_err(io_err)?;

            let mut sync_table = write_txn.open_table(SYNC).map_err(io_err)?;
            let sync_bytes = postcard::to_stdvec(sync).map_err(ser_err)?;
            sync_table
                .insert("site_sync", sync_bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        self.persisted = graph.clock();
        Ok(())
    }

    /// Reclaim free space in the database file.
    pub fn compact(&mut self) -> Result<(), LineageError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
