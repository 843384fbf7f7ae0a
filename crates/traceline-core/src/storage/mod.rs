//! # Storage
//!
//! Disk persistence for the lineage graph. The graph itself stays in memory;
//! [`RedbStore`] is a write-through journal that lands every committed write
//! in a redb database and rebuilds the full graph on open.

mod redb_store;

pub use redb_store::RedbStore;
