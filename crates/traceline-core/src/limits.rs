//! # Runtime Limits & Format Constants
//!
//! Hardcoded constants for the Traceline core.
//!
//! These are compiled into the binary and immutable at runtime. Input
//! validation limits exist so that a malformed or hostile payload is rejected
//! before it reaches the graph.

/// Magic bytes for the sync batch wire format header.
pub const BATCH_MAGIC: &[u8; 4] = b"TLSB";

/// Current sync batch wire format version.
///
/// Increment this when making breaking changes to the batch format.
pub const BATCH_FORMAT_VERSION: u8 = 1;

/// Maximum serialized size of a sync batch payload.
///
/// Validated BEFORE deserialization to prevent allocation-based DoS.
pub const MAX_BATCH_PAYLOAD_SIZE: usize = 500 * 1024 * 1024; // 500 MB

/// Maximum number of entities in a single sync batch.
pub const MAX_BATCH_ENTITY_COUNT: u64 = 1_000_000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for pipeline/stage/tool names and logical paths.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length for a custom-property key.
pub const MAX_PROP_KEY_LENGTH: usize = 256;

/// Maximum length for a text property value (64 KB).
pub const MAX_PROP_TEXT_LENGTH: usize = 65536;

// =============================================================================
// QUERY LIMITS
// =============================================================================

/// Default page size for execution listing.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum page size for execution listing.
pub const MAX_PAGE_SIZE: usize = 1000;
