//! Segment: a run of text contributed by one splice
//!
//! Segments live in a [`SegmentArena`] and refer to each other by
//! [`SegmentId`]. Both trees thread their own parent/left/right links through
//! the same segment, so a segment is simultaneously a node of its insertion's
//! split tree and of the document's position tree.
//!
//! A segment's text never changes except when it is split into a prefix (which
//! keeps the segment's identity) and a new suffix segment. Segments are never
//! removed from the arena; deleted text stays around as a tombstone.

use super::point::{byte_index_for_point, extent_for_text, traversal, traverse, Point};
use super::splice_id::SpliceId;
use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};

/// Stable handle to a segment inside a [`SegmentArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u32);

impl SegmentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Logical location: an offset inside a splice's inserted text
///
/// Anchors survive splits because they name the insertion, not the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub splice_id: SpliceId,
    pub offset: Point,
}

impl Anchor {
    pub fn new(splice_id: SpliceId, offset: Point) -> Self {
        Self { splice_id, offset }
    }
}

/// Parent/child links of one tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeLinks {
    pub parent: Option<SegmentId>,
    pub left: Option<SegmentId>,
    pub right: Option<SegmentId>,
}

/// A fragment of inserted text plus its tree memberships
#[derive(Debug, Clone)]
pub struct Segment {
    /// Splice that inserted this text
    pub splice_id: SpliceId,

    pub text: String,

    /// Rows/columns spanned by `text`
    pub extent: Point,

    /// Start of this fragment within its insertion
    pub offset: Point,

    /// End of the text this insertion was placed after
    pub left_dependency: Anchor,

    /// Start of the text this insertion was placed before
    pub right_dependency: Anchor,

    /// Fragment produced when this one was last split
    pub next_split: Option<SegmentId>,

    /// Deletions covering this fragment (recorded forever)
    pub deletions: BTreeSet<SpliceId>,

    pub(crate) split: TreeLinks,
    pub(crate) split_subtree_extent: Point,

    pub(crate) position: TreeLinks,
    pub(crate) position_subtree_extent: Point,
    pub(crate) position_subtree_size: usize,
}

impl Segment {
    /// Create the first fragment of an insertion
    pub fn new(
        splice_id: SpliceId,
        text: String,
        left_dependency: Anchor,
        right_dependency: Anchor,
    ) -> Self {
        let extent = extent_for_text(&text);
        Self {
            splice_id,
            text,
            extent,
            offset: Point::ZERO,
            left_dependency,
            right_dependency,
            next_split: None,
            deletions: BTreeSet::new(),
            split: TreeLinks::default(),
            split_subtree_extent: extent,
            position: TreeLinks::default(),
            position_subtree_extent: Point::ZERO,
            position_subtree_size: 1,
        }
    }

    /// Create one of the zero-length boundary segments
    pub fn sentinel(splice_id: SpliceId) -> Self {
        let anchor = Anchor::new(splice_id, Point::ZERO);
        Self::new(splice_id, String::new(), anchor, anchor)
    }

    /// Offset just past this fragment within its insertion
    pub fn end_offset(&self) -> Point {
        traverse(self.offset, self.extent)
    }

    /// Shorten this fragment to `split_at` and return the remainder
    ///
    /// The returned segment carries the suffix text and a copy of the
    /// fragment's dependencies and deletions, and takes over its successor
    /// link. Tree links are left empty for the caller to wire.
    pub(crate) fn carve_suffix(&mut self, split_at: Point) -> Segment {
        let byte_index = byte_index_for_point(&self.text, split_at);
        let suffix_text = self.text.split_off(byte_index);
        let suffix_extent = traversal(self.extent, split_at);
        self.extent = split_at;

        Segment {
            splice_id: self.splice_id,
            text: suffix_text,
            extent: suffix_extent,
            offset: traverse(self.offset, split_at),
            left_dependency: self.left_dependency,
            right_dependency: self.right_dependency,
            next_split: self.next_split,
            deletions: self.deletions.clone(),
            split: TreeLinks::default(),
            split_subtree_extent: suffix_extent,
            position: TreeLinks::default(),
            position_subtree_extent: Point::ZERO,
            position_subtree_size: 1,
        }
    }
}

/// Owner of every segment in a document
#[derive(Debug, Clone, Default)]
pub struct SegmentArena {
    segments: Vec<Segment>,
}

impl SegmentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) -> SegmentId {
        let id = SegmentId(self.segments.len() as u32);
        self.segments.push(segment);
        id
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl Index<SegmentId> for SegmentArena {
    type Output = Segment;

    fn index(&self, id: SegmentId) -> &Segment {
        &self.segments[id.index()]
    }
}

impl IndexMut<SegmentId> for SegmentArena {
    fn index_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str) -> Segment {
        let anchor = Anchor::new(SpliceId::START, Point::ZERO);
        Segment::new(SpliceId::new(1, 1), text.to_string(), anchor, anchor)
    }

    #[test]
    fn test_new_segment_extent() {
        let seg = segment("ab\ncde");
        assert_eq!(seg.extent, Point::new(1, 3));
        assert_eq!(seg.offset, Point::ZERO);
        assert_eq!(seg.end_offset(), Point::new(1, 3));
    }

    #[test]
    fn test_carve_suffix() {
        let mut prefix = segment("ab\ncde");
        prefix.deletions.insert(SpliceId::new(2, 1));

        let suffix = prefix.carve_suffix(Point::new(1, 1));

        assert_eq!(prefix.text, "ab\nc");
        assert_eq!(prefix.extent, Point::new(1, 1));
        assert_eq!(suffix.text, "de");
        assert_eq!(suffix.extent, Point::new(0, 2));
        assert_eq!(suffix.offset, Point::new(1, 1));
        assert_eq!(suffix.end_offset(), Point::new(1, 3));
        assert!(suffix.deletions.contains(&SpliceId::new(2, 1)));
    }

    #[test]
    fn test_arena_ids_are_stable() {
        let mut arena = SegmentArena::new();
        let a = arena.push(segment("a"));
        let b = arena.push(segment("b"));

        assert_eq!(arena.len(), 2);
        assert_eq!(arena[a].text, "a");
        arena[b].text.push('!');
        assert_eq!(arena[b].text, "b!");
    }
}
