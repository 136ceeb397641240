//! Markers: collaborator cursors and selections
//!
//! Each site publishes layers of markers. Locally a marker's range is a pair of
//! row/column points, but what gets stored and sent is a [`LogicalRange`]: the
//! range's endpoints expressed as offsets inside specific insertions. Concurrent
//! edits elsewhere in the document cannot move a logical endpoint, so markers
//! stay attached to the text they were placed on.

use super::point::Point;
use super::splice_id::{SiteId, SpliceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a marker layer within a site
pub type LayerId = u32;

/// Identifier of a marker within a layer
pub type MarkerId = u32;

/// Absolute range in the visible text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Range anchored to insertion identity + offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalRange {
    pub start_dependency_id: SpliceId,
    pub offset_in_start_dependency: Point,
    pub end_dependency_id: SpliceId,
    pub offset_in_end_dependency: Point,
}

impl LogicalRange {
    /// Splices that must be integrated before this range can be resolved
    pub fn dependencies(&self) -> [SpliceId; 2] {
        [self.start_dependency_id, self.end_dependency_id]
    }
}

/// A marker over range type `R`
///
/// `Marker` (over [`Range`]) is what callers read and write;
/// [`LogicalMarker`] is what is stored, snapshotted and sent to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker<R = Range> {
    pub range: R,

    /// Edits exactly at a boundary land outside the marker instead of
    /// growing it
    pub exclusive: bool,

    /// The head is at the start of the range
    pub reversed: bool,

    /// The marker has a tail (a selection rather than a bare cursor)
    pub tailed: bool,
}

/// Marker as stored and transmitted
pub type LogicalMarker = Marker<LogicalRange>;

impl<R> Marker<R> {
    /// Same flags over a different range
    pub fn with_range<S>(&self, range: S) -> Marker<S> {
        Marker {
            range,
            exclusive: self.exclusive,
            reversed: self.reversed,
            tailed: self.tailed,
        }
    }
}

impl Marker<Range> {
    pub fn new(range: Range) -> Self {
        Self {
            range,
            exclusive: false,
            reversed: false,
            tailed: true,
        }
    }
}

/// Markers of one layer
pub type MarkerLayer<R = Range> = BTreeMap<MarkerId, Marker<R>>;

/// All layers of one site
pub type MarkerLayers<R = Range> = BTreeMap<LayerId, MarkerLayer<R>>;

/// Logical markers captured with an undo entry
pub type MarkersSnapshot = MarkerLayers<LogicalRange>;

/// Changes to one layer: `None` removes the layer, a `None` marker removes
/// that marker
pub type LayerUpdate<R = Range> = Option<BTreeMap<MarkerId, Option<Marker<R>>>>;

/// Changes to several layers of one site
pub type LayerUpdates<R = Range> = BTreeMap<LayerId, LayerUpdate<R>>;

/// Resolved marker changes reported per site after integration
pub type MarkerUpdates = BTreeMap<SiteId, LayerUpdates>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_range_keeps_flags() {
        let marker = Marker {
            range: Range::new(Point::new(0, 1), Point::new(0, 4)),
            exclusive: true,
            reversed: true,
            tailed: false,
        };
        let logical = marker.with_range(LogicalRange {
            start_dependency_id: SpliceId::new(1, 1),
            offset_in_start_dependency: Point::new(0, 1),
            end_dependency_id: SpliceId::new(1, 1),
            offset_in_end_dependency: Point::new(0, 4),
        });

        assert!(logical.exclusive);
        assert!(logical.reversed);
        assert!(!logical.tailed);
        assert_eq!(logical.range.dependencies(), [SpliceId::new(1, 1); 2]);
    }

    #[test]
    fn test_empty_range() {
        assert!(Range::new(Point::new(2, 2), Point::new(2, 2)).is_empty());
        assert!(!Range::new(Point::ZERO, Point::new(0, 1)).is_empty());
    }

    #[test]
    fn test_serialization() {
        let marker = Marker::new(Range::new(Point::ZERO, Point::new(1, 0)));

        let json = serde_json::to_string(&marker).unwrap();
        let deserialized: Marker = serde_json::from_str(&json).unwrap();

        assert_eq!(marker, deserialized);
    }
}
