//! Protocol Buffer messages for replicated operations
//!
//! Declared with `prost` derives rather than generated from a `.proto` file;
//! the equivalent schema is:
//!
//! ```text
//! message SpliceId { uint32 site = 1; uint32 seq = 2; }
//! message Point { uint32 row = 1; uint32 column = 2; }
//!
//! message Insertion {
//!   string text = 1;
//!   SpliceId left_dependency_id = 2;
//!   Point offset_in_left_dependency = 3;
//!   SpliceId right_dependency_id = 4;
//!   Point offset_in_right_dependency = 5;
//! }
//! message Deletion {
//!   SpliceId left_dependency_id = 1;
//!   Point offset_in_left_dependency = 2;
//!   SpliceId right_dependency_id = 3;
//!   Point offset_in_right_dependency = 4;
//!   map<uint32, uint32> max_seqs_by_site = 5;
//! }
//! message Splice { SpliceId splice_id = 1; Insertion insertion = 2; Deletion deletion = 3; }
//! message Undo { SpliceId splice_id = 1; uint32 undo_count = 2; }
//!
//! message LogicalRange {
//!   SpliceId start_dependency_id = 1;
//!   Point offset_in_start_dependency = 2;
//!   SpliceId end_dependency_id = 3;
//!   Point offset_in_end_dependency = 4;
//! }
//! message Marker { LogicalRange range = 1; bool exclusive = 2; bool reversed = 3; bool tailed = 4; }
//! message MarkerUpdate { Marker marker = 1; }            // absent marker: removed
//! message LayerUpdate { bool removed = 1; map<uint32, MarkerUpdate> markers = 2; }
//! message MarkersUpdate { uint32 site_id = 1; map<uint32, LayerUpdate> updates = 2; }
//!
//! message Operation {
//!   oneof variant { Splice splice = 1; Undo undo = 2; MarkersUpdate markers_update = 3; }
//! }
//! ```

use prost::Message;
use std::collections::BTreeMap;

#[derive(Clone, PartialEq, Message)]
pub struct SpliceIdMessage {
    #[prost(uint32, tag = "1")]
    pub site: u32,
    #[prost(uint32, tag = "2")]
    pub seq: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct PointMessage {
    #[prost(uint32, tag = "1")]
    pub row: u32,
    #[prost(uint32, tag = "2")]
    pub column: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct InsertionMessage {
    #[prost(string, tag = "1")]
    pub text: String,
    #[prost(message, optional, tag = "2")]
    pub left_dependency_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "3")]
    pub offset_in_left_dependency: Option<PointMessage>,
    #[prost(message, optional, tag = "4")]
    pub right_dependency_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "5")]
    pub offset_in_right_dependency: Option<PointMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeletionMessage {
    #[prost(message, optional, tag = "1")]
    pub left_dependency_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "2")]
    pub offset_in_left_dependency: Option<PointMessage>,
    #[prost(message, optional, tag = "3")]
    pub right_dependency_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "4")]
    pub offset_in_right_dependency: Option<PointMessage>,
    #[prost(btree_map = "uint32, uint32", tag = "5")]
    pub max_seqs_by_site: BTreeMap<u32, u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SpliceMessage {
    #[prost(message, optional, tag = "1")]
    pub splice_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "2")]
    pub insertion: Option<InsertionMessage>,
    #[prost(message, optional, tag = "3")]
    pub deletion: Option<DeletionMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct UndoMessage {
    #[prost(message, optional, tag = "1")]
    pub splice_id: Option<SpliceIdMessage>,
    #[prost(uint32, tag = "2")]
    pub undo_count: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct LogicalRangeMessage {
    #[prost(message, optional, tag = "1")]
    pub start_dependency_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "2")]
    pub offset_in_start_dependency: Option<PointMessage>,
    #[prost(message, optional, tag = "3")]
    pub end_dependency_id: Option<SpliceIdMessage>,
    #[prost(message, optional, tag = "4")]
    pub offset_in_end_dependency: Option<PointMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MarkerMessage {
    #[prost(message, optional, tag = "1")]
    pub range: Option<LogicalRangeMessage>,
    #[prost(bool, tag = "2")]
    pub exclusive: bool,
    #[prost(bool, tag = "3")]
    pub reversed: bool,
    #[prost(bool, tag = "4")]
    pub tailed: bool,
}

/// A marker, or its removal when `marker` is absent
#[derive(Clone, PartialEq, Message)]
pub struct MarkerUpdateMessage {
    #[prost(message, optional, tag = "1")]
    pub marker: Option<MarkerMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LayerUpdateMessage {
    /// The whole layer was removed; `markers` is empty
    #[prost(bool, tag = "1")]
    pub removed: bool,
    #[prost(btree_map = "uint32, message", tag = "2")]
    pub markers: BTreeMap<u32, MarkerUpdateMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MarkersUpdateMessage {
    #[prost(uint32, tag = "1")]
    pub site_id: u32,
    #[prost(btree_map = "uint32, message", tag = "2")]
    pub updates: BTreeMap<u32, LayerUpdateMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperationMessage {
    #[prost(oneof = "operation_message::Variant", tags = "1, 2, 3")]
    pub variant: Option<operation_message::Variant>,
}

pub mod operation_message {
    use prost::Oneof;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Variant {
        #[prost(message, tag = "1")]
        Splice(super::SpliceMessage),
        #[prost(message, tag = "2")]
        Undo(super::UndoMessage),
        #[prost(message, tag = "3")]
        MarkersUpdate(super::MarkersUpdateMessage),
    }
}
