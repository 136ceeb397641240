//! Replicated document engine
//!
//! A [`Document`] owns every segment ever inserted into it, arranged in two
//! kinds of trees:
//!
//! - one [`PositionTree`] ordering all fragments by where they appear in the
//!   document, which answers "what is at row/column X";
//! - one [`SplitTree`] per insertion, which answers "which fragment now holds
//!   offset N of splice S".
//!
//! Local edits are applied immediately and returned as [`Operation`]s for the
//! transport to deliver. Remote operations go through
//! [`Document::integrate_operations`], which defers anything whose causal
//! dependencies have not arrived yet.
//!
//! # Example
//!
//! ```rust
//! use textsync_core::crdt::{Document, Point};
//!
//! let mut alice = Document::new(1).unwrap();
//! let mut bob = Document::new(2).unwrap();
//!
//! let from_alice = alice.set_text_in_range(Point::ZERO, Point::ZERO, "a").unwrap();
//! let from_bob = bob.set_text_in_range(Point::ZERO, Point::ZERO, "b").unwrap();
//!
//! alice.integrate_operations(from_bob).unwrap();
//! bob.integrate_operations(from_alice).unwrap();
//!
//! assert_eq!(alice.get_text(), "ab");
//! assert_eq!(bob.get_text(), "ab");
//! ```

mod history;
mod integrate;
mod markers;

pub use history::{
    CheckpointOptions, GroupOptions, History, HistoryEntry, RevertOptions, UndoResult,
};
pub use integrate::IntegrationResult;

use self::history::UndoEntry;
use self::integrate::Deferred;
use super::change::Change;
use super::marker::{LogicalRange, MarkerLayers};
use super::operation::{Deletion, Insertion, MarkersUpdate, Operation, Splice};
use super::point::{traversal, traverse, Point};
use super::segment::{Anchor, Segment, SegmentArena, SegmentId};
use super::splice_id::{SiteId, SpliceId};
use super::tree::{PositionTree, SplitTree, Visibility};
use crate::error::{Result, SyncError};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Millisecond clock used to timestamp transactions
pub type Clock = Box<dyn Fn() -> u64>;

/// Initial state of a new document
#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    /// Text present before any edit; not undoable
    pub text: Option<String>,

    /// Undo/redo history captured with [`Document::get_history`]
    pub history: Option<History>,
}

/// Undo counts of every splice
#[derive(Debug, Clone, Default)]
pub(crate) struct UndoCounts(HashMap<SpliceId, u32>);

impl UndoCounts {
    pub(crate) fn get(&self, splice_id: SpliceId) -> u32 {
        self.0.get(&splice_id).copied().unwrap_or(0)
    }

    fn set(&mut self, splice_id: SpliceId, count: u32) {
        self.0.insert(splice_id, count);
    }

    /// View with some counts replaced
    fn overlay<'a>(&'a self, overrides: &'a HashMap<SpliceId, u32>) -> UndoOverlay<'a> {
        UndoOverlay {
            base: self,
            overrides,
        }
    }
}

pub(crate) struct UndoOverlay<'a> {
    base: &'a UndoCounts,
    overrides: &'a HashMap<SpliceId, u32>,
}

impl UndoOverlay<'_> {
    fn get(&self, splice_id: SpliceId) -> u32 {
        match self.overrides.get(&splice_id) {
            Some(&count) => count,
            None => self.base.get(splice_id),
        }
    }
}

/// Visible iff the splice is not undone and every deletion of it is
fn is_visible_with(segment: &Segment, undo_count: impl Fn(SpliceId) -> u32) -> bool {
    let undone = |splice_id| undo_count(splice_id) % 2 == 1;
    !undone(segment.splice_id) && segment.deletions.iter().all(|&deletion| undone(deletion))
}

impl Visibility for UndoCounts {
    fn is_visible(&self, segment: &Segment) -> bool {
        is_visible_with(segment, |splice_id| self.get(splice_id))
    }
}

impl Visibility for UndoOverlay<'_> {
    fn is_visible(&self, segment: &Segment) -> bool {
        is_visible_with(segment, |splice_id| self.get(splice_id))
    }
}

/// One replica of a collaboratively edited text
pub struct Document {
    site_id: SiteId,
    next_seq: u32,

    arena: SegmentArena,
    position_tree: PositionTree,
    split_trees: HashMap<SpliceId, SplitTree>,

    /// Fragments each deletion marked when it was integrated
    deletion_fragments: HashMap<SpliceId, Vec<SegmentId>>,
    undo_counts: UndoCounts,

    /// Highest integrated seq per site
    last_seqs_by_site: HashMap<SiteId, u32>,

    /// Every integrated splice and undo, in integration order
    operations: Vec<Operation>,
    deferred: Deferred,

    markers: BTreeMap<SiteId, MarkerLayers<LogicalRange>>,

    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    next_checkpoint_id: u32,

    clock: Clock,

    /// Visibility of fragments before the current batch of changes
    tracked: Option<HashMap<SegmentId, bool>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("site_id", &self.site_id)
            .field("next_seq", &self.next_seq)
            .field("segments", &self.arena.len())
            .field("operations", &self.operations.len())
            .field("undo_stack", &self.undo_stack.len())
            .field("redo_stack", &self.redo_stack.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Create an empty document for `site_id`
    ///
    /// Site 0 is reserved for the document boundaries and is rejected.
    pub fn new(site_id: SiteId) -> Result<Self> {
        if site_id == 0 {
            return Err(SyncError::ReservedSiteId);
        }

        let mut arena = SegmentArena::new();
        let undo_counts = UndoCounts::default();
        let first = arena.push(Segment::sentinel(SpliceId::START));
        let last = arena.push(Segment::sentinel(SpliceId::END));
        let position_tree = PositionTree::new(&mut arena, first, last, &undo_counts);

        let mut split_trees = HashMap::new();
        split_trees.insert(SpliceId::START, SplitTree::new(&mut arena, first));
        split_trees.insert(SpliceId::END, SplitTree::new(&mut arena, last));

        Ok(Self {
            site_id,
            next_seq: 1,
            arena,
            position_tree,
            split_trees,
            deletion_fragments: HashMap::new(),
            undo_counts,
            last_seqs_by_site: HashMap::new(),
            operations: Vec::new(),
            deferred: Deferred::default(),
            markers: BTreeMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            next_checkpoint_id: 1,
            clock: Box::new(|| Utc::now().timestamp_millis().max(0) as u64),
            tracked: None,
        })
    }

    /// Create a document with initial text or restored history
    pub fn with_options(site_id: SiteId, options: DocumentOptions) -> Result<Self> {
        let mut document = Self::new(site_id)?;

        if let Some(text) = options.text.filter(|text| !text.is_empty()) {
            document.set_text_in_range(Point::ZERO, Point::ZERO, &text)?;
            document.undo_stack.clear();
        }
        if let Some(history) = options.history {
            document.populate_history(history)?;
        }

        Ok(document)
    }

    /// Replace the transaction clock (milliseconds)
    pub fn set_clock<F>(&mut self, clock: F)
    where
        F: Fn() -> u64 + 'static,
    {
        self.clock = Box::new(clock);
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Visible text
    pub fn get_text(&self) -> String {
        self.position_tree
            .segments(&self.arena)
            .map(|segment| &self.arena[segment])
            .filter(|segment| self.undo_counts.is_visible(segment))
            .map(|segment| segment.text.as_str())
            .collect()
    }

    /// Row/column extent of the visible text
    pub fn extent(&self) -> Point {
        self.position_tree.extent(&self.arena)
    }

    /// Replace `start..end` with `text`
    ///
    /// The edit is applied immediately, recorded as a new undoable transaction
    /// (clearing redo history) and returned as a single splice operation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use textsync_core::crdt::{Document, Point};
    ///
    /// let mut doc = Document::new(1).unwrap();
    /// doc.set_text_in_range(Point::ZERO, Point::ZERO, "hello world").unwrap();
    /// doc.set_text_in_range(Point::new(0, 0), Point::new(0, 5), "goodbye").unwrap();
    ///
    /// assert_eq!(doc.get_text(), "goodbye world");
    /// ```
    pub fn set_text_in_range(&mut self, start: Point, end: Point, text: &str) -> Result<Vec<Operation>> {
        if end < start {
            return Err(SyncError::InvalidRange { start, end });
        }
        if end > self.extent() {
            return Err(SyncError::PositionOutOfBounds(end));
        }

        let splice_id = SpliceId::new(self.site_id, self.next_seq);

        let deletion = if end > start {
            Some(self.delete(splice_id, start, end)?)
        } else {
            None
        };
        let insertion = if text.is_empty() {
            None
        } else {
            Some(self.insert(splice_id, start, text)?)
        };

        self.next_seq += 1;
        self.last_seqs_by_site.insert(self.site_id, splice_id.seq);

        let operation = Operation::Splice(Splice {
            splice_id,
            insertion,
            deletion,
        });
        self.operations.push(operation.clone());
        self.push_transaction(vec![operation.clone()]);

        Ok(vec![operation])
    }

    fn insert(&mut self, splice_id: SpliceId, position: Point, text: &str) -> Result<Insertion> {
        let (prev, next) = self.find_local_segment_boundary(position)?;
        let left = Anchor::new(self.arena[prev].splice_id, self.arena[prev].end_offset());
        let right = Anchor::new(self.arena[next].splice_id, self.arena[next].offset);

        self.insert_segment(splice_id, text, left, right, prev, next);

        Ok(Insertion {
            text: text.to_string(),
            left_dependency_id: left.splice_id,
            offset_in_left_dependency: left.offset,
            right_dependency_id: right.splice_id,
            offset_in_right_dependency: right.offset,
        })
    }

    fn delete(&mut self, splice_id: SpliceId, start: Point, end: Point) -> Result<Deletion> {
        let (_, left) = self.find_local_segment_boundary(start)?;
        let (right, _) = self.find_local_segment_boundary(end)?;

        let mut max_seqs_by_site = BTreeMap::new();
        let mut marked = Vec::new();
        let mut current = left;
        loop {
            let owner = self.arena[current].splice_id;
            let max_seq = max_seqs_by_site.entry(owner.site).or_insert(0);
            *max_seq = (*max_seq).max(owner.seq);
            marked.push(current);

            if current == right {
                break;
            }
            current = self.successor(current)?;
        }
        self.mark_deleted(splice_id, marked);

        Ok(Deletion {
            left_dependency_id: self.arena[left].splice_id,
            offset_in_left_dependency: self.arena[left].offset,
            right_dependency_id: self.arena[right].splice_id,
            offset_in_right_dependency: self.arena[right].end_offset(),
            max_seqs_by_site,
        })
    }

    /// Create a segment between the adjacent fragments `prev` and `next`
    fn insert_segment(
        &mut self,
        splice_id: SpliceId,
        text: &str,
        left_dependency: Anchor,
        right_dependency: Anchor,
        prev: SegmentId,
        next: SegmentId,
    ) {
        let segment = self.arena.push(Segment::new(
            splice_id,
            text.to_string(),
            left_dependency,
            right_dependency,
        ));
        if let Some(tracked) = &mut self.tracked {
            tracked.insert(segment, false);
        }

        self.position_tree
            .insert_between(&mut self.arena, prev, next, segment, &self.undo_counts);
        self.split_trees
            .insert(splice_id, SplitTree::new(&mut self.arena, segment));
    }

    /// Record `deletion_id` on each fragment
    fn mark_deleted(&mut self, deletion_id: SpliceId, segments: Vec<SegmentId>) {
        for &segment in &segments {
            self.note_visibility(segment);
            self.arena[segment].deletions.insert(deletion_id);
            self.position_tree
                .refresh(&mut self.arena, segment, &self.undo_counts);
        }
        self.deletion_fragments.insert(deletion_id, segments);
    }

    /// Fragments on either side of `position`, splitting one if needed
    ///
    /// The first fragment is the visible one ending at `position` (or the
    /// leading boundary); the second is whatever follows it.
    fn find_local_segment_boundary(&mut self, position: Point) -> Result<(SegmentId, SegmentId)> {
        let found = self
            .position_tree
            .find_segment_containing_position(&self.arena, position, &self.undo_counts)
            .ok_or(SyncError::PositionOutOfBounds(position))?;

        if position < found.end {
            let suffix = self.split_segment(found.segment, traversal(position, found.start))?;
            Ok((found.segment, suffix))
        } else {
            let next = self.successor(found.segment)?;
            Ok((found.segment, next))
        }
    }

    /// Fragment of `splice_id` starting at `offset`, splitting if needed
    pub(crate) fn find_segment_start(&mut self, splice_id: SpliceId, offset: Point) -> Result<SegmentId> {
        let segment = self.segment_containing_offset(splice_id, offset)?;
        let (start, end) = (self.arena[segment].offset, self.arena[segment].end_offset());

        if offset == start {
            Ok(segment)
        } else if offset == end {
            Ok(self.arena[segment].next_split.unwrap_or(segment))
        } else {
            self.split_segment(segment, traversal(offset, start))
        }
    }

    /// Fragment of `splice_id` ending at `offset`, splitting if needed
    pub(crate) fn find_segment_end(&mut self, splice_id: SpliceId, offset: Point) -> Result<SegmentId> {
        let segment = self.segment_containing_offset(splice_id, offset)?;
        let (start, end) = (self.arena[segment].offset, self.arena[segment].end_offset());

        if start < offset && offset < end {
            self.split_segment(segment, traversal(offset, start))?;
        }
        Ok(segment)
    }

    fn segment_containing_offset(&self, splice_id: SpliceId, offset: Point) -> Result<SegmentId> {
        let split_tree = self
            .split_trees
            .get(&splice_id)
            .ok_or(SyncError::UnknownSplice(splice_id))?;

        split_tree
            .find_segment_containing_offset(&self.arena, offset)
            .ok_or_else(|| {
                SyncError::Protocol(format!("offset {offset} lies outside splice {splice_id}"))
            })
    }

    /// Fragment ending at an anchor, without splitting
    fn resolve_end_anchor(&self, anchor: Anchor) -> Result<SegmentId> {
        self.segment_containing_offset(anchor.splice_id, anchor.offset)
    }

    /// Fragment starting at an anchor, without splitting
    fn resolve_start_anchor(&self, anchor: Anchor) -> Result<SegmentId> {
        let segment = self.segment_containing_offset(anchor.splice_id, anchor.offset)?;
        let fragment = &self.arena[segment];
        if anchor.offset > fragment.offset && anchor.offset == fragment.end_offset() {
            if let Some(next) = fragment.next_split {
                return Ok(next);
            }
        }
        Ok(segment)
    }

    /// Split a fragment in both trees; returns the new suffix
    fn split_segment(&mut self, segment: SegmentId, split_at: Point) -> Result<SegmentId> {
        let splice_id = self.arena[segment].splice_id;
        let split_tree = self
            .split_trees
            .get_mut(&splice_id)
            .ok_or(SyncError::UnknownSplice(splice_id))?;

        let suffix = split_tree.split_segment(&mut self.arena, segment, split_at);
        self.position_tree
            .split_segment(&mut self.arena, segment, suffix, &self.undo_counts);

        if let Some(tracked) = &mut self.tracked {
            if let Some(&was_visible) = tracked.get(&segment) {
                tracked.insert(suffix, was_visible);
            }
        }
        Ok(suffix)
    }

    fn successor(&self, segment: SegmentId) -> Result<SegmentId> {
        self.position_tree
            .successor(&self.arena, segment)
            .ok_or_else(|| SyncError::Protocol("walked past the end of the document".to_string()))
    }

    /// Whether every splice up to `splice_id` from its site has been integrated
    fn has_integrated(&self, splice_id: SpliceId) -> bool {
        splice_id.site == 0 || self.last_seq(splice_id.site) >= splice_id.seq
    }

    fn last_seq(&self, site_id: SiteId) -> u32 {
        self.last_seqs_by_site.get(&site_id).copied().unwrap_or(0)
    }

    /// All integrated operations plus each site's current markers
    pub fn get_operations(&self) -> Vec<Operation> {
        let mut operations = self.operations.clone();
        for (&site_id, layers) in &self.markers {
            let updates = layers
                .iter()
                .map(|(&layer_id, layer)| {
                    let markers = layer
                        .iter()
                        .map(|(&marker_id, marker)| (marker_id, Some(*marker)))
                        .collect();
                    (layer_id, Some(markers))
                })
                .collect();
            operations.push(Operation::MarkersUpdate(MarkersUpdate {
                site_id,
                updates,
            }));
        }
        operations
    }

    /// A fresh document for `site_id` holding everything integrated here
    pub fn replicate(&self, site_id: SiteId) -> Result<Document> {
        let mut replica = Document::new(site_id)?;
        replica.integrate_operations(self.get_operations())?;
        Ok(replica)
    }

    /// Change the undo count of a splice and refresh every affected fragment
    fn apply_undo_count(&mut self, splice_id: SpliceId, count: u32) {
        let segments = self.segments_affected_by(splice_id);
        for &segment in &segments {
            self.note_visibility(segment);
        }
        self.undo_counts.set(splice_id, count);
        for segment in segments {
            self.position_tree
                .refresh(&mut self.arena, segment, &self.undo_counts);
        }
    }

    /// Fragments inserted or deleted by `splice_id`
    fn segments_affected_by(&self, splice_id: SpliceId) -> Vec<SegmentId> {
        let mut segments: Vec<SegmentId> = match self.split_trees.get(&splice_id) {
            Some(split_tree) => split_tree.segments(&self.arena).collect(),
            None => Vec::new(),
        };

        if let Some(marked) = self.deletion_fragments.get(&splice_id) {
            // Fragments split off a marked fragment carry the deletion too.
            let mut seen = HashSet::new();
            for &start in marked {
                let mut current = Some(start);
                while let Some(segment) = current {
                    if !self.arena[segment].deletions.contains(&splice_id) || !seen.insert(segment) {
                        break;
                    }
                    segments.push(segment);
                    current = self.arena[segment].next_split;
                }
            }
        }
        segments
    }

    fn begin_tracking(&mut self) {
        self.tracked = Some(HashMap::new());
    }

    fn note_visibility(&mut self, segment: SegmentId) {
        if let Some(tracked) = &mut self.tracked {
            let visible = self.undo_counts.is_visible(&self.arena[segment]);
            tracked.entry(segment).or_insert(visible);
        }
    }

    fn finish_tracking(&mut self) -> Vec<Change> {
        match self.tracked.take() {
            Some(old_visibility) => self.compute_changes(old_visibility),
            None => Vec::new(),
        }
    }

    /// Text changes between the given old visibility and the current one
    fn compute_changes(&self, old_visibility: HashMap<SegmentId, bool>) -> Vec<Change> {
        let mut flipped: Vec<(usize, SegmentId, bool)> = old_visibility
            .into_iter()
            .filter(|&(segment, was_visible)| {
                self.undo_counts.is_visible(&self.arena[segment]) != was_visible
            })
            .map(|(segment, was_visible)| {
                let index = self.position_tree.segment_index(&self.arena, segment);
                (index, segment, was_visible)
            })
            .collect();
        flipped.sort_unstable_by_key(|&(index, _, _)| index);

        let mut changes: Vec<Change> = Vec::new();
        for (_, id, was_visible) in flipped {
            let segment = &self.arena[id];
            let new_start = self
                .position_tree
                .segment_position(&self.arena, id, &self.undo_counts);
            let (old_text, new_text) = if was_visible {
                (segment.text.as_str(), "")
            } else {
                ("", segment.text.as_str())
            };
            let (old_extent, new_extent) = if was_visible {
                (segment.extent, Point::ZERO)
            } else {
                (Point::ZERO, segment.extent)
            };

            if let Some(last) = changes
                .last_mut()
                .filter(|last| last.new_end == new_start)
            {
                last.old_end = traverse(last.old_end, old_extent);
                last.old_text.push_str(old_text);
                last.new_end = traverse(last.new_end, new_extent);
                last.new_text.push_str(new_text);
                continue;
            }

            let old_start = match changes.last() {
                Some(last) => traverse(last.old_end, traversal(new_start, last.new_end)),
                None => new_start,
            };
            changes.push(Change {
                old_start,
                old_end: traverse(old_start, old_extent),
                old_text: old_text.to_string(),
                new_start,
                new_end: traverse(new_start, new_extent),
                new_text: new_text.to_string(),
            });
        }
        changes
    }

    /// Changes that undoing `operations` would revert, without undoing them
    fn changes_for_operations(&self, operations: &[Operation]) -> Vec<Change> {
        let overrides: HashMap<SpliceId, u32> = operations
            .iter()
            .filter_map(Operation::splice_id)
            .map(|splice_id| (splice_id, self.undo_counts.get(splice_id) + 1))
            .collect();
        let before = self.undo_counts.overlay(&overrides);

        let old_visibility = overrides
            .keys()
            .flat_map(|&splice_id| self.segments_affected_by(splice_id))
            .map(|segment| (segment, before.is_visible(&self.arena[segment])))
            .collect();
        self.compute_changes(old_visibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::change::apply_changes;

    fn p(row: u32, column: u32) -> Point {
        Point::new(row, column)
    }

    fn integrate(document: &mut Document, operations: &[Operation]) -> Vec<Change> {
        document
            .integrate_operations(operations.to_vec())
            .unwrap()
            .text_updates
    }

    #[test]
    fn test_reserved_site_id() {
        assert!(matches!(Document::new(0), Err(SyncError::ReservedSiteId)));
    }

    #[test]
    fn test_local_edits() {
        let mut doc = Document::new(1).unwrap();
        doc.set_text_in_range(p(0, 0), p(0, 0), "hello\nworld").unwrap();
        doc.set_text_in_range(p(1, 0), p(1, 0), "big ").unwrap();
        doc.set_text_in_range(p(0, 1), p(0, 4), "ipp").unwrap();

        assert_eq!(doc.get_text(), "hippo\nbig world");
        assert_eq!(doc.extent(), p(1, 9));
    }

    #[test]
    fn test_invalid_ranges() {
        let mut doc = Document::new(1).unwrap();
        doc.set_text_in_range(p(0, 0), p(0, 0), "abc").unwrap();

        assert!(matches!(
            doc.set_text_in_range(p(0, 2), p(0, 1), "x"),
            Err(SyncError::InvalidRange { .. })
        ));
        assert!(matches!(
            doc.set_text_in_range(p(0, 1), p(0, 9), "x"),
            Err(SyncError::PositionOutOfBounds(_))
        ));
        assert_eq!(doc.get_text(), "abc");
    }

    #[test]
    fn test_initial_text_is_not_undoable() {
        let options = DocumentOptions {
            text: Some("draft".to_string()),
            history: None,
        };
        let mut doc = Document::with_options(1, options).unwrap();

        assert_eq!(doc.get_text(), "draft");
        assert!(doc.undo().is_none());
    }

    #[test]
    fn test_concurrent_inserts_order_by_site() {
        let mut doc1 = Document::new(1).unwrap();
        let mut doc2 = Document::new(2).unwrap();
        let ops1 = doc1.set_text_in_range(p(0, 0), p(0, 0), "a").unwrap();
        let ops2 = doc2.set_text_in_range(p(0, 0), p(0, 0), "b").unwrap();

        integrate(&mut doc1, &ops2);
        integrate(&mut doc2, &ops1);

        assert_eq!(doc1.get_text(), "ab");
        assert_eq!(doc2.get_text(), "ab");
    }

    #[test]
    fn test_concurrent_inserts_inside_shared_text() {
        let mut doc1 = Document::new(1).unwrap();
        let mut doc2 = Document::new(2).unwrap();
        let mut doc3 = Document::new(3).unwrap();

        let base = doc1.set_text_in_range(p(0, 0), p(0, 0), "ABCD").unwrap();
        integrate(&mut doc2, &base);
        integrate(&mut doc3, &base);

        let ops1 = doc1.set_text_in_range(p(0, 2), p(0, 2), "1").unwrap();
        let ops2 = doc2.set_text_in_range(p(0, 2), p(0, 2), "2").unwrap();
        let ops3 = doc3.set_text_in_range(p(0, 1), p(0, 3), "3").unwrap();

        integrate(&mut doc1, &ops3);
        integrate(&mut doc1, &ops2);
        integrate(&mut doc2, &ops1);
        integrate(&mut doc2, &ops3);
        integrate(&mut doc3, &ops2);
        integrate(&mut doc3, &ops1);

        assert_eq!(doc1.get_text(), doc2.get_text());
        assert_eq!(doc2.get_text(), doc3.get_text());
        assert_eq!(doc1.get_text(), "A312D");
    }

    #[test]
    fn test_deletion_spares_unseen_insertions() {
        let mut doc1 = Document::new(1).unwrap();
        let mut doc2 = Document::new(2).unwrap();

        let base = doc1.set_text_in_range(p(0, 0), p(0, 0), "ABCDEFG").unwrap();
        integrate(&mut doc2, &base);

        let insertion = doc1.set_text_in_range(p(0, 3), p(0, 3), "***").unwrap();
        let deletion = doc2.set_text_in_range(p(0, 1), p(0, 6), "").unwrap();

        integrate(&mut doc1, &deletion);
        integrate(&mut doc2, &insertion);

        assert_eq!(doc1.get_text(), "A***G");
        assert_eq!(doc2.get_text(), "A***G");
    }

    #[test]
    fn test_integration_reports_changes() {
        let mut doc1 = Document::new(1).unwrap();
        let mut doc2 = Document::new(2).unwrap();

        let base = doc1.set_text_in_range(p(0, 0), p(0, 0), "one\ntwo\nthree").unwrap();
        integrate(&mut doc2, &base);

        let mut edits = Vec::new();
        edits.extend(doc1.set_text_in_range(p(1, 0), p(1, 3), "TWO").unwrap());
        edits.extend(doc1.set_text_in_range(p(2, 5), p(2, 5), "!").unwrap());
        edits.extend(doc1.set_text_in_range(p(0, 0), p(0, 1), "").unwrap());

        let before = doc2.get_text();
        let changes = integrate(&mut doc2, &edits);

        assert_eq!(doc2.get_text(), "ne\nTWO\nthree!");
        assert_eq!(apply_changes(&before, &changes), doc2.get_text());
    }

    #[test]
    fn test_replicate() {
        let mut doc = Document::new(1).unwrap();
        doc.set_text_in_range(p(0, 0), p(0, 0), "hello").unwrap();
        doc.set_text_in_range(p(0, 5), p(0, 5), " world").unwrap();
        doc.undo();

        let replica = doc.replicate(2).unwrap();
        assert_eq!(replica.get_text(), "hello");
        assert_eq!(replica.site_id(), 2);
    }

    #[test]
    fn test_changes_for_operations_does_not_mutate() {
        let mut doc = Document::new(1).unwrap();
        doc.set_text_in_range(p(0, 0), p(0, 0), "abc").unwrap();
        let ops = doc.set_text_in_range(p(0, 1), p(0, 2), "XY").unwrap();

        let changes = doc.changes_for_operations(&ops);

        assert_eq!(doc.get_text(), "aXYc");
        assert_eq!(apply_changes("abc", &changes), "aXYc");
    }
}
