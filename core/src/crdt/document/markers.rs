//! Marker layers anchored to logical ranges

use super::Document;
use crate::crdt::marker::{
    LayerUpdate, LayerUpdates, LogicalMarker, LogicalRange, Marker, MarkerLayers,
    MarkersSnapshot, Range,
};
use crate::crdt::operation::{MarkersUpdate, Operation};
use crate::crdt::point::{traversal, traverse, Point};
use crate::crdt::segment::SegmentId;
use crate::crdt::splice_id::{SiteId, SpliceId};
use crate::crdt::tree::Visibility;
use crate::error::{Result, SyncError};
use std::collections::BTreeMap;

impl Document {
    /// Update this site's marker layers
    ///
    /// A `None` layer removes the layer; a `None` marker removes the marker.
    /// Returns the markers-update operation to broadcast.
    pub fn update_markers(&mut self, updates: LayerUpdates) -> Result<Vec<Operation>> {
        let logical = self.logical_layer_updates(&updates)?;

        let layers = self.markers.entry(self.site_id).or_default();
        for (&layer_id, layer_update) in &logical {
            match layer_update {
                None => {
                    layers.remove(&layer_id);
                }
                Some(markers) => {
                    let layer = layers.entry(layer_id).or_default();
                    for (&marker_id, marker) in markers {
                        match marker {
                            Some(marker) => {
                                layer.insert(marker_id, *marker);
                            }
                            None => {
                                layer.remove(&marker_id);
                            }
                        }
                    }
                }
            }
        }

        Ok(vec![Operation::MarkersUpdate(MarkersUpdate {
            site_id: self.site_id,
            updates: logical,
        })])
    }

    /// Every site's markers, resolved against the current text
    pub fn get_markers(&self) -> BTreeMap<SiteId, MarkerLayers> {
        self.markers
            .iter()
            .map(|(&site_id, layers)| (site_id, self.resolve_layers(layers)))
            .collect()
    }

    fn logical_layer_updates(&self, updates: &LayerUpdates) -> Result<LayerUpdates<LogicalRange>> {
        updates
            .iter()
            .map(|(&layer_id, layer_update)| -> Result<_> {
                let layer_update: LayerUpdate<LogicalRange> = match layer_update {
                    None => None,
                    Some(markers) => Some(
                        markers
                            .iter()
                            .map(|(&marker_id, marker)| -> Result<_> {
                                let marker = marker
                                    .map(|marker| self.logical_marker(&marker))
                                    .transpose()?;
                                Ok((marker_id, marker))
                            })
                            .collect::<Result<_>>()?,
                    ),
                };
                Ok((layer_id, layer_update))
            })
            .collect()
    }

    fn logical_marker(&self, marker: &Marker) -> Result<LogicalMarker> {
        let range = self.get_logical_range(marker.range, marker.exclusive)?;
        Ok(marker.with_range(range))
    }

    /// Anchor an absolute range to the fragments currently holding it
    ///
    /// An exclusive range anchors its start to the following fragment and its
    /// end to the preceding one, so text inserted exactly at either boundary
    /// ends up outside it.
    pub fn get_logical_range(&self, range: Range, exclusive: bool) -> Result<LogicalRange> {
        if range.end < range.start {
            return Err(SyncError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }

        let (start_segment, start_position) = self.find_segment(range.start, exclusive)?;
        let (end_segment, end_position) = if range.is_empty() {
            (start_segment, start_position)
        } else {
            self.find_segment(range.end, !exclusive)?
        };

        let start = &self.arena[start_segment];
        let end = &self.arena[end_segment];
        Ok(LogicalRange {
            start_dependency_id: start.splice_id,
            offset_in_start_dependency: traverse(start.offset, traversal(range.start, start_position)),
            end_dependency_id: end.splice_id,
            offset_in_end_dependency: traverse(end.offset, traversal(range.end, end_position)),
        })
    }

    /// Fragment holding `position` and the position at which it starts
    fn find_segment(&self, position: Point, prefer_start: bool) -> Result<(SegmentId, Point)> {
        let found = self
            .position_tree
            .find_segment_containing_position(&self.arena, position, &self.undo_counts)
            .ok_or(SyncError::PositionOutOfBounds(position))?;

        if prefer_start && position == found.end {
            if let Some(next) = self.position_tree.successor(&self.arena, found.segment) {
                return Ok((next, found.end));
            }
        }
        Ok((found.segment, found.start))
    }

    /// Absolute range of a logical range, or `None` if a splice is missing
    pub fn resolve_logical_range(&self, range: &LogicalRange, exclusive: bool) -> Option<Range> {
        let start = self.resolve_logical_position(
            range.start_dependency_id,
            range.offset_in_start_dependency,
            exclusive,
        )?;
        let end = self.resolve_logical_position(
            range.end_dependency_id,
            range.offset_in_end_dependency,
            !exclusive,
        )?;
        Some(Range::new(start, end.max(start)))
    }

    fn resolve_logical_position(
        &self,
        splice_id: SpliceId,
        offset: Point,
        prefer_start: bool,
    ) -> Option<Point> {
        let split_tree = self.split_trees.get(&splice_id)?;
        let mut segment = split_tree.find_segment_containing_offset(&self.arena, offset)?;

        if prefer_start && offset == self.arena[segment].end_offset() {
            if let Some(next) = split_tree.successor(&self.arena, segment) {
                segment = next;
            }
        }

        let fragment = &self.arena[segment];
        let segment_start = self
            .position_tree
            .segment_position(&self.arena, segment, &self.undo_counts);
        if self.undo_counts.is_visible(fragment) {
            Some(traverse(segment_start, traversal(offset, fragment.offset)))
        } else {
            Some(segment_start)
        }
    }

    pub(super) fn resolve_marker(&self, marker: &LogicalMarker) -> Option<Marker> {
        let range = self.resolve_logical_range(&marker.range, marker.exclusive)?;
        Some(marker.with_range(range))
    }

    fn resolve_layers(&self, layers: &MarkerLayers<LogicalRange>) -> MarkerLayers {
        layers
            .iter()
            .map(|(&layer_id, layer)| {
                let layer = layer
                    .iter()
                    .filter_map(|(&marker_id, marker)| {
                        self.resolve_marker(marker).map(|marker| (marker_id, marker))
                    })
                    .collect();
                (layer_id, layer)
            })
            .collect()
    }

    /// Capture markers as logical ranges for the undo stack
    pub(super) fn snapshot_markers(&self, layers: &MarkerLayers) -> Result<MarkersSnapshot> {
        layers
            .iter()
            .map(|(&layer_id, layer)| -> Result<_> {
                let layer: BTreeMap<_, _> = layer
                    .iter()
                    .map(|(&marker_id, marker)| -> Result<_> {
                        Ok((marker_id, self.logical_marker(marker)?))
                    })
                    .collect::<Result<_>>()?;
                Ok((layer_id, layer))
            })
            .collect()
    }

    pub(super) fn markers_from_snapshot(&self, snapshot: &MarkersSnapshot) -> MarkerLayers {
        self.resolve_layers(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(row: u32, column: u32) -> Point {
        Point::new(row, column)
    }

    fn marker(start: Point, end: Point, exclusive: bool) -> Marker {
        Marker {
            range: Range::new(start, end),
            exclusive,
            reversed: false,
            tailed: true,
        }
    }

    fn set_marker(doc: &mut Document, marker: Marker) -> Vec<Operation> {
        doc.update_markers(BTreeMap::from([(1, Some(BTreeMap::from([(1, Some(marker))])))]))
            .unwrap()
    }

    fn local_range(doc: &Document) -> Range {
        doc.get_markers()[&doc.site_id()][&1][&1].range
    }

    #[test]
    fn test_markers_follow_remote_edits() {
        let mut doc1 = Document::new(1).unwrap();
        let mut doc2 = Document::new(2).unwrap();

        let base = doc1.set_text_in_range(p(0, 0), p(0, 0), "hello world").unwrap();
        doc2.integrate_operations(base).unwrap();

        set_marker(&mut doc1, marker(p(0, 6), p(0, 11), false));
        let edit = doc2.set_text_in_range(p(0, 0), p(0, 0), ">> ").unwrap();
        doc1.integrate_operations(edit).unwrap();

        assert_eq!(local_range(&doc1), Range::new(p(0, 9), p(0, 14)));
    }

    #[test]
    fn test_exclusive_markers_do_not_grow() {
        let mut doc = Document::new(1).unwrap();
        let mut remote = Document::new(2).unwrap();
        let base = doc.set_text_in_range(p(0, 0), p(0, 0), "abcdef").unwrap();
        remote.integrate_operations(base).unwrap();

        let mut exclusive = doc.replicate(3).unwrap();
        set_marker(&mut doc, marker(p(0, 2), p(0, 4), false));
        set_marker(&mut exclusive, marker(p(0, 2), p(0, 4), true));

        let mut edits = remote.set_text_in_range(p(0, 2), p(0, 2), "<").unwrap();
        edits.extend(remote.set_text_in_range(p(0, 5), p(0, 5), ">").unwrap());
        doc.integrate_operations(edits.clone()).unwrap();
        exclusive.integrate_operations(edits).unwrap();

        assert_eq!(doc.get_text(), "ab<cd>ef");
        assert_eq!(local_range(&doc), Range::new(p(0, 2), p(0, 6)));
        assert_eq!(local_range(&exclusive), Range::new(p(0, 3), p(0, 5)));
    }

    #[test]
    fn test_marker_in_deleted_text_collapses() {
        let mut doc = Document::new(1).unwrap();
        doc.set_text_in_range(p(0, 0), p(0, 0), "abcdef").unwrap();
        set_marker(&mut doc, marker(p(0, 2), p(0, 4), false));

        doc.set_text_in_range(p(0, 1), p(0, 5), "").unwrap();

        assert_eq!(local_range(&doc), Range::new(p(0, 1), p(0, 1)));
    }

    #[test]
    fn test_remove_layer() {
        let mut doc = Document::new(1).unwrap();
        doc.set_text_in_range(p(0, 0), p(0, 0), "abc").unwrap();
        set_marker(&mut doc, marker(p(0, 0), p(0, 1), false));

        let ops = doc.update_markers(BTreeMap::from([(1, None)])).unwrap();

        assert!(doc.get_markers()[&1].is_empty());
        match &ops[0] {
            Operation::MarkersUpdate(update) => assert_eq!(update.updates[&1], None),
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_out_of_bounds_marker() {
        let mut doc = Document::new(1).unwrap();
        let result = doc.update_markers(BTreeMap::from([(
            1,
            Some(BTreeMap::from([(1, Some(marker(p(0, 0), p(0, 3), false)))])),
        )]));
        assert!(matches!(result, Err(SyncError::PositionOutOfBounds(_))));
    }
}
