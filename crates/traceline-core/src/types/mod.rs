//! # Core Type Definitions
//!
//! This module contains all core types for the Traceline lineage substrate:
//! - Store and node identifiers (`StoreId`, `NodeId`)
//! - Content identity (`ContentHash`)
//! - Custom property values (`PropValue`, `PropEntry`, `PropMap`)
//! - The five graph entities (`Pipeline`, `Context`, `Execution`, `Artifact`, `Event`)
//! - Error types (`LineageError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Carry caller-supplied timestamps; nothing here reads a clock
//! - Use saturating arithmetic for counters to prevent overflow

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// STORE & NODE IDENTIFIERS
// =============================================================================

/// Identifier of one metadata store (a site-local store or the central store).
///
/// Assigned by deployment configuration; two stores participating in the same
/// sync topology must carry distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u64);

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally-distinguishable identifier for a graph entity.
///
/// Combines the origin store with a locally-incrementing sequence number, so
/// identifiers minted independently at different sites never collide before
/// merge. Each store mints its own `NodeId`s; cross-store identity is
/// reconciled by content hash (artifacts) or by origin key (everything else),
/// never by comparing raw ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// The store that created this entity.
    pub origin: StoreId,
    /// Sequence number within the origin store.
    pub seq: u64,
}

impl NodeId {
    /// Create a new node id.
    #[must_use]
    pub const fn new(origin: StoreId, seq: u64) -> Self {
        Self { origin, seq }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.origin.0, self.seq)
    }
}

impl std::str::FromStr for NodeId {
    type Err = LineageError;

    /// Parse the `origin-seq` form [`Display`](std::fmt::Display) prints.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || LineageError::InvalidInput(format!("malformed id '{raw}'"));
        let (origin, seq) = raw.split_once('-').ok_or_else(malformed)?;
        let origin: u64 = origin.parse().map_err(|_| malformed())?;
        let seq: u64 = seq.parse().map_err(|_| malformed())?;
        Ok(Self::new(StoreId(origin), seq))
    }
}

// =============================================================================
// CONTENT HASH
// =============================================================================

/// A 256-bit content fingerprint.
///
/// This is the true identity of an artifact: two artifacts with the same
/// `ContentHash` within a store are the same entity, regardless of logical
/// path or which execution produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Render as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for byte in &self.0 {
            s.push_str(&format!("{:02x}", byte));
        }
        s
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, LineageError> {
        if hex.len() != 64 {
            return Err(LineageError::InvalidInput(format!(
                "content hash must be 64 hex chars, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let hi = hex_nibble(chunk[0])?;
            let lo = hex_nibble(chunk[1])?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_nibble(c: u8) -> Result<u8, LineageError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(LineageError::InvalidInput(format!(
            "invalid hex character: {}",
            c as char
        ))),
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A scalar custom-property value.
///
/// Fixed key type (string), dynamic value restricted to three scalar shapes so
/// serialization and merge-by-timestamp stay well-defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropValue {
    /// A numeric value (metrics, hyperparameters).
    Number(f64),
    /// A string value (git commit, environment name).
    Text(String),
    /// A boolean flag.
    Flag(bool),
}

// Number equality/ordering go through the bit pattern / total order so that
// PropValue can live in BTreeMaps without float comparison pitfalls.
impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Flag(a), Self::Flag(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropValue {}

impl PartialOrd for PropValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Flag(a), Self::Flag(b)) => a.cmp(b),
            (Self::Number(_), _) => Ordering::Less,
            (_, Self::Number(_)) => Ordering::Greater,
            (Self::Text(_), Self::Flag(_)) => Ordering::Less,
            (Self::Flag(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

impl std::fmt::Display for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
            Self::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// A property value plus the wall timestamp of its last write.
///
/// The timestamp drives last-write-wins conflict resolution when property
/// maps from different stores are unioned during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropEntry {
    /// The scalar value.
    pub value: PropValue,
    /// Milliseconds since epoch of the write that set this value.
    pub updated_ms: u64,
}

/// An append-only custom-property map. Overwriting an existing key is allowed;
/// last write wins by `updated_ms`.
pub type PropMap = BTreeMap<String, PropEntry>;

/// Insert `value` under `key` unless an entry with a newer timestamp exists.
///
/// Equal timestamps keep the existing entry, which makes replaying the same
/// merge idempotent. Returns `true` if the existing value was replaced by a
/// different one (a resolved conflict).
pub fn merge_prop(map: &mut PropMap, key: &str, value: PropValue, updated_ms: u64) -> bool {
    match map.get(key) {
        Some(existing) if existing.updated_ms >= updated_ms => false,
        Some(existing) => {
            let conflicted = existing.value != value;
            map.insert(key.to_string(), PropEntry { value, updated_ms });
            conflicted
        }
        None => {
            map.insert(key.to_string(), PropEntry { value, updated_ms });
            false
        }
    }
}

// =============================================================================
// GRAPH ENTITIES
// =============================================================================

/// Root of all contexts: one named ML pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// The internal node identifier.
    pub id: NodeId,
    /// Unique name within a store.
    pub name: String,
    /// Creation timestamp (ms since epoch).
    pub created_ms: u64,
    /// Local write sequence of the last mutation (push high-water tracking).
    pub last_write: u64,
}

/// One pipeline stage (e.g. "train"), reused across repeated executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// The internal node identifier.
    pub id: NodeId,
    /// The pipeline this stage belongs to.
    pub pipeline: NodeId,
    /// Stage name, unique within the pipeline.
    pub stage: String,
    /// Context type (e.g. "train", "evaluate").
    pub ctx_type: String,
    /// Custom properties.
    pub props: PropMap,
    /// Local write sequence of the last mutation.
    pub last_write: u64,
}

/// One concrete run of a context. Always a distinct identity, even with
/// identical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// The internal node identifier.
    pub id: NodeId,
    /// The node id this execution had at the store that created it.
    /// For locally-created executions this equals `id`; for merged ones it is
    /// the sender's id and is what makes re-pushes idempotent.
    pub origin_key: NodeId,
    /// The context this execution ran under.
    pub context: NodeId,
    /// Command or tool name that performed the run.
    pub tool: String,
    /// Start timestamp (ms since epoch).
    pub started_ms: u64,
    /// Custom properties (hyperparameters, git commit, environment).
    pub props: PropMap,
    /// Local write sequence of the last mutation.
    pub last_write: u64,
}

/// Kind of a versioned data unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Input or output dataset.
    Dataset,
    /// A trained model.
    Model,
    /// A serialized metrics map.
    Metrics,
    /// Computed statistics over a dataset.
    Statistics,
}

impl ArtifactKind {
    /// Stable lowercase name for display and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Model => "model",
            Self::Metrics => "metrics",
            Self::Statistics => "statistics",
        }
    }
}

/// A content-addressed data/model/metric unit.
///
/// Identity is the content hash: logging a path whose content hash already
/// exists reuses the existing node and only adds a new event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The internal node identifier.
    pub id: NodeId,
    /// The content fingerprint — the true identity.
    pub hash: ContentHash,
    /// User-facing logical path.
    pub path: String,
    /// What kind of data this is.
    pub kind: ArtifactKind,
    /// Custom properties (e.g. accuracy).
    pub props: PropMap,
    /// Local write sequence of the last mutation.
    pub last_write: u64,
}

/// Direction of an event edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The execution consumed the artifact.
    Input,
    /// The execution produced the artifact.
    Output,
}

impl Direction {
    /// Stable uppercase name for display and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

/// Identity of an event edge: at most one event per
/// (execution, artifact, direction) triple exists in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// The execution side of the edge.
    pub execution: NodeId,
    /// The artifact side of the edge.
    pub artifact: NodeId,
    /// Consumed or produced.
    pub direction: Direction,
}

/// A directed edge between an execution and an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The (execution, artifact, direction) identity.
    pub key: EventKey,
    /// When the edge was recorded (ms since epoch).
    pub recorded_ms: u64,
    /// Local write sequence of the last mutation.
    pub last_write: u64,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Traceline core.
///
/// - No silent failures
/// - Use `Result<T, LineageError>` for fallible operations
/// - The core never panics; all errors are recoverable by the caller
#[derive(Debug, Error)]
pub enum LineageError {
    /// A write referenced a parent entity that does not exist.
    /// Fatal to the caller's operation, never to the store.
    #[error("invalid reference: no {expected} with id {id}")]
    InvalidReference {
        /// The entity kind that was expected to exist.
        expected: &'static str,
        /// The id that failed to resolve.
        id: NodeId,
    },

    /// The named pipeline does not exist in this store.
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),

    /// Caller-supplied input failed validation (empty name, oversized value).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Blob content does not match the hash it is addressed by.
    #[error("hash mismatch: expected {expected}, content hashes to {actual}")]
    HashMismatch {
        /// The hash the content was stored or requested under.
        expected: ContentHash,
        /// The fingerprint actually computed over the content.
        actual: ContentHash,
    },

    /// No blob is stored under the given hash.
    #[error("no blob stored for hash {0}")]
    BlobMissing(ContentHash),

    /// A sync batch failed structural validation (magic, version, checksum).
    #[error("rejected batch: {0}")]
    BatchRejected(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O or storage-engine error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A sync transport failure. Retriable: both push and pull are
    /// idempotent, so the caller may simply resend the whole batch.
    #[error("transport error: {0}")]
    Transport(String),
}

// =============================================================================
// TESTS
// =============================================================================
