//! TextSync Core - replicated text for real-time collaborative editing
//!
//! This is the Rust core of TextSync, compiled to both native and WASM.
//! It implements:
//! - A text CRDT where concurrent edits converge without a central sequencer
//! - Causal deferral of operations that arrive before their dependencies
//! - Transactional undo/redo with checkpoints, grouping and portable history
//! - Collaborator markers anchored to the text they cover
//! - Binary protocol encoding/decoding of operations
//!
//! # Examples
//!
//! ```rust
//! use textsync_core::{Document, Point};
//!
//! let mut local = Document::new(1).unwrap();
//! let mut remote = Document::new(2).unwrap();
//!
//! let operations = local.set_text_in_range(Point::ZERO, Point::ZERO, "Hello World").unwrap();
//! let result = remote.integrate_operations(operations).unwrap();
//!
//! assert_eq!(remote.get_text(), "Hello World");
//! assert_eq!(result.text_updates.len(), 1);
//! ```

pub mod crdt;
pub mod error;

#[cfg(feature = "protocol-binary")]
pub mod protocol;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use crdt::{Change, Document, DocumentOptions, Operation, Point, SiteId, SpliceId};
pub use error::{Result, SyncError};
