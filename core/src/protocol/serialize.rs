// Serialization layer - Convert operations to/from Protocol Buffers
//!
//! This module provides conversion between the replicated [`Operation`] types
//! and the Protocol Buffer message format for network transmission.
//!
//! Decoding is strict: a message with a missing required field or an
//! unrecognized operation variant is rejected with [`SyncError::Protocol`]
//! rather than integrated with made-up values.

use crate::crdt::marker::{LayerUpdate, LayerUpdates, LogicalMarker, LogicalRange, Marker};
use crate::crdt::operation::{Deletion, Insertion, MarkersUpdate, Operation, Splice, Undo};
use crate::crdt::point::Point;
use crate::crdt::splice_id::SpliceId;
use crate::error::{Result, SyncError};
use crate::protocol::*;
use bytes::{Bytes, BytesMut};
use prost::Message;

/// Serialize an operation to bytes
pub fn serialize_operation(operation: &Operation) -> Result<Bytes> {
    encode_message(&operation_to_message(operation))
}

/// Deserialize an operation from bytes
pub fn deserialize_operation(bytes: &[u8]) -> Result<Operation> {
    let message: OperationMessage = decode_message(bytes)?;
    operation_from_message(message)
}

/// Convert an operation to its protocol message
pub fn operation_to_message(operation: &Operation) -> OperationMessage {
    let variant = match operation {
        Operation::Splice(splice) => operation_message::Variant::Splice(SpliceMessage {
            splice_id: Some(splice.splice_id.into()),
            insertion: splice.insertion.as_ref().map(insertion_to_message),
            deletion: splice.deletion.as_ref().map(deletion_to_message),
        }),
        Operation::Undo(undo) => operation_message::Variant::Undo(UndoMessage {
            splice_id: Some(undo.splice_id.into()),
            undo_count: undo.undo_count,
        }),
        Operation::MarkersUpdate(update) => {
            operation_message::Variant::MarkersUpdate(MarkersUpdateMessage {
                site_id: update.site_id,
                updates: update
                    .updates
                    .iter()
                    .map(|(&layer_id, layer)| (layer_id, layer_update_to_message(layer)))
                    .collect(),
            })
        }
    };

    OperationMessage {
        variant: Some(variant),
    }
}

/// Convert a protocol message back to an operation
pub fn operation_from_message(message: OperationMessage) -> Result<Operation> {
    match message.variant {
        Some(operation_message::Variant::Splice(splice)) => Ok(Operation::Splice(Splice {
            splice_id: required(splice.splice_id, "splice.splice_id")?.into(),
            insertion: splice.insertion.map(insertion_from_message).transpose()?,
            deletion: splice.deletion.map(deletion_from_message).transpose()?,
        })),
        Some(operation_message::Variant::Undo(undo)) => Ok(Operation::Undo(Undo {
            splice_id: required(undo.splice_id, "undo.splice_id")?.into(),
            undo_count: undo.undo_count,
        })),
        Some(operation_message::Variant::MarkersUpdate(update)) => {
            let updates = update
                .updates
                .into_iter()
                .map(|(layer_id, layer)| Ok((layer_id, layer_update_from_message(layer)?)))
                .collect::<Result<LayerUpdates<LogicalRange>>>()?;
            Ok(Operation::MarkersUpdate(MarkersUpdate {
                site_id: update.site_id,
                updates,
            }))
        }
        None => Err(SyncError::Protocol(
            "Unknown or missing operation variant".to_string(),
        )),
    }
}

fn required<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| SyncError::Protocol(format!("Missing required field `{}`", name)))
}

impl From<SpliceId> for SpliceIdMessage {
    fn from(id: SpliceId) -> Self {
        Self {
            site: id.site,
            seq: id.seq,
        }
    }
}

impl From<SpliceIdMessage> for SpliceId {
    fn from(message: SpliceIdMessage) -> Self {
        SpliceId::new(message.site, message.seq)
    }
}

impl From<Point> for PointMessage {
    fn from(point: Point) -> Self {
        Self {
            row: point.row,
            column: point.column,
        }
    }
}

impl From<PointMessage> for Point {
    fn from(message: PointMessage) -> Self {
        Point::new(message.row, message.column)
    }
}

fn insertion_to_message(insertion: &Insertion) -> InsertionMessage {
    InsertionMessage {
        text: insertion.text.clone(),
        left_dependency_id: Some(insertion.left_dependency_id.into()),
        offset_in_left_dependency: Some(insertion.offset_in_left_dependency.into()),
        right_dependency_id: Some(insertion.right_dependency_id.into()),
        offset_in_right_dependency: Some(insertion.offset_in_right_dependency.into()),
    }
}

fn insertion_from_message(message: InsertionMessage) -> Result<Insertion> {
    Ok(Insertion {
        text: message.text,
        left_dependency_id: required(message.left_dependency_id, "insertion.left_dependency_id")?
            .into(),
        offset_in_left_dependency: required(
            message.offset_in_left_dependency,
            "insertion.offset_in_left_dependency",
        )?
        .into(),
        right_dependency_id: required(message.right_dependency_id, "insertion.right_dependency_id")?
            .into(),
        offset_in_right_dependency: required(
            message.offset_in_right_dependency,
            "insertion.offset_in_right_dependency",
        )?
        .into(),
    })
}

fn deletion_to_message(deletion: &Deletion) -> DeletionMessage {
    DeletionMessage {
        left_dependency_id: Some(deletion.left_dependency_id.into()),
        offset_in_left_dependency: Some(deletion.offset_in_left_dependency.into()),
        right_dependency_id: Some(deletion.right_dependency_id.into()),
        offset_in_right_dependency: Some(deletion.offset_in_right_dependency.into()),
        max_seqs_by_site: deletion.max_seqs_by_site.clone(),
    }
}

fn deletion_from_message(message: DeletionMessage) -> Result<Deletion> {
    Ok(Deletion {
        left_dependency_id: required(message.left_dependency_id, "deletion.left_dependency_id")?
            .into(),
        offset_in_left_dependency: required(
            message.offset_in_left_dependency,
            "deletion.offset_in_left_dependency",
        )?
        .into(),
        right_dependency_id: required(message.right_dependency_id, "deletion.right_dependency_id")?
            .into(),
        offset_in_right_dependency: required(
            message.offset_in_right_dependency,
            "deletion.offset_in_right_dependency",
        )?
        .into(),
        max_seqs_by_site: message.max_seqs_by_site,
    })
}

fn layer_update_to_message(layer: &LayerUpdate<LogicalRange>) -> LayerUpdateMessage {
    match layer {
        None => LayerUpdateMessage {
            removed: true,
            markers: Default::default(),
        },
        Some(markers) => LayerUpdateMessage {
            removed: false,
            markers: markers
                .iter()
                .map(|(&marker_id, marker)| {
                    let update = MarkerUpdateMessage {
                        marker: marker.as_ref().map(marker_to_message),
                    };
                    (marker_id, update)
                })
                .collect(),
        },
    }
}

fn layer_update_from_message(message: LayerUpdateMessage) -> Result<LayerUpdate<LogicalRange>> {
    if message.removed {
        return Ok(None);
    }

    let markers = message
        .markers
        .into_iter()
        .map(|(marker_id, update)| {
            let marker = update.marker.map(marker_from_message).transpose()?;
            Ok((marker_id, marker))
        })
        .collect::<Result<_>>()?;
    Ok(Some(markers))
}

fn marker_to_message(marker: &LogicalMarker) -> MarkerMessage {
    let range = &marker.range;
    MarkerMessage {
        range: Some(LogicalRangeMessage {
            start_dependency_id: Some(range.start_dependency_id.into()),
            offset_in_start_dependency: Some(range.offset_in_start_dependency.into()),
            end_dependency_id: Some(range.end_dependency_id.into()),
            offset_in_end_dependency: Some(range.offset_in_end_dependency.into()),
        }),
        exclusive: marker.exclusive,
        reversed: marker.reversed,
        tailed: marker.tailed,
    }
}

fn marker_from_message(message: MarkerMessage) -> Result<LogicalMarker> {
    let range = required(message.range, "marker.range")?;
    Ok(Marker {
        range: LogicalRange {
            start_dependency_id: required(range.start_dependency_id, "range.start_dependency_id")?
                .into(),
            offset_in_start_dependency: required(
                range.offset_in_start_dependency,
                "range.offset_in_start_dependency",
            )?
            .into(),
            end_dependency_id: required(range.end_dependency_id, "range.end_dependency_id")?.into(),
            offset_in_end_dependency: required(
                range.offset_in_end_dependency,
                "range.offset_in_end_dependency",
            )?
            .into(),
        },
        exclusive: message.exclusive,
        reversed: message.reversed,
        tailed: message.tailed,
    })
}

/// Serialize any protocol message to bytes
pub fn encode_message<M: Message>(msg: &M) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(msg.encoded_len());
    msg.encode(&mut buf)
        .map_err(|e| SyncError::Protocol(format!("Failed to encode message: {}", e)))?;
    Ok(buf.freeze())
}

/// Deserialize a protocol message from bytes
pub fn decode_message<M: Message + Default>(bytes: &[u8]) -> Result<M> {
    M::decode(bytes).map_err(|e| SyncError::Protocol(format!("Failed to decode message: {}", e)))
}
