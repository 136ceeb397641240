//! Replicated text CRDT
//!
//! The document model follows the split-tree design used by collaborative
//! editors: every insertion becomes a segment that is only ever split, never
//! removed, and deletions and undos toggle visibility rather than mutating text.
//!
//! # Modules
//!
//! - **point:** row/column coordinates and arithmetic
//! - **splice_id:** globally unique ids of local edits
//! - **segment, tree:** fragment arena, per-insertion split trees and the
//!   document-wide position tree
//! - **operation:** the replicated operations exchanged between sites
//! - **marker:** marker layers anchored to logical ranges
//! - **change:** text updates reported to the editor
//! - **document:** the replica itself, with integration, undo/redo and history
//!
//! # References
//!
//! - "Data consistency for P2P collaborative editing" (WOOT), Oster et al.
//! - "Logoot-Undo: Distributed Collaborative Editing System on P2P Networks"

pub mod change;
pub mod document;
pub mod marker;
pub mod operation;
pub mod point;
pub mod segment;
pub mod splice_id;
pub mod tree;

pub use change::{apply_changes, invert_changes, Change};
pub use document::{
    CheckpointOptions, Document, DocumentOptions, GroupOptions, History, HistoryEntry,
    IntegrationResult, RevertOptions, UndoResult,
};
pub use marker::{
    LayerId, LayerUpdate, LayerUpdates, LogicalMarker, LogicalRange, Marker, MarkerId,
    MarkerLayer, MarkerLayers, MarkerUpdates, Range,
};
pub use operation::{Deletion, Insertion, MarkersUpdate, Operation, Splice, Undo};
pub use point::{traversal, traverse, Point};
pub use segment::{Anchor, Segment, SegmentArena, SegmentId};
pub use splice_id::{SiteId, SpliceId};
