//! Error types shared across the crate
//!
//! Conflicting edits are never errors: they are resolved deterministically by
//! the document engine. The variants here cover caller mistakes (bad
//! positions, reserved site ids), broken delivery guarantees, and malformed
//! wire or history payloads.

use crate::crdt::{Point, SpliceId};
use thiserror::Error;

/// Errors produced by the replicated document and its codecs
#[derive(Debug, Error)]
pub enum SyncError {
    /// Site 0 owns the sentinel segments and cannot edit
    #[error("site id 0 is reserved for the document boundary segments")]
    ReservedSiteId,

    /// A position lies beyond the end of the visible text
    #[error("position {0} is out of bounds")]
    PositionOutOfBounds(Point),

    /// A range whose end precedes its start
    #[error("invalid range {start}..{end}")]
    InvalidRange { start: Point, end: Point },

    /// An operation carrying this replica's site id that it never produced
    #[error("operation {0} claims to originate locally but was never produced here")]
    LocalOperationOutOfOrder(SpliceId),

    /// A splice referenced by id has not been integrated
    #[error("unknown splice {0}")]
    UnknownSplice(SpliceId),

    /// Wire payload could not be decoded into an operation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Persisted history could not be restored
    #[error("invalid history: {0}")]
    InvalidHistory(String),

    /// JSON encoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;
