//! SplitTree: the fragments of a single insertion
//!
//! When later edits land inside an insertion, its segment is split into
//! fragments. The split tree keeps those fragments in offset order so that an
//! anchor (splice id + offset) can be resolved back to the fragment that
//! currently holds that offset.
//!
//! Summaries count every fragment, visible or not: offsets within an insertion
//! never change once assigned.

use super::{attach_after, successor, Augment};
use crate::crdt::point::{traverse, Point};
use crate::crdt::segment::{Segment, SegmentArena, SegmentId, TreeLinks};

/// Split-tree specialization: subtree summary is total extent
pub(crate) struct ByOffset;

impl Augment for ByOffset {
    type Context = ();

    fn links(segment: &Segment) -> &TreeLinks {
        &segment.split
    }

    fn links_mut(segment: &mut Segment) -> &mut TreeLinks {
        &mut segment.split
    }

    fn update_subtree(arena: &mut SegmentArena, node: SegmentId, _cx: &()) {
        let links = arena[node].split;
        let mut extent = Point::ZERO;
        if let Some(left) = links.left {
            extent = arena[left].split_subtree_extent;
        }
        extent = traverse(extent, arena[node].extent);
        if let Some(right) = links.right {
            extent = traverse(extent, arena[right].split_subtree_extent);
        }
        arena[node].split_subtree_extent = extent;
    }
}

/// Offset-ordered tree over one insertion's fragments
#[derive(Debug, Clone)]
pub struct SplitTree {
    root: SegmentId,

    /// Fragment at offset zero; never changes because prefixes keep identity
    start: SegmentId,
}

impl SplitTree {
    /// Create a tree holding a freshly inserted segment
    pub fn new(arena: &mut SegmentArena, segment: SegmentId) -> Self {
        arena[segment].split = TreeLinks::default();
        ByOffset::update_subtree(arena, segment, &());
        Self {
            root: segment,
            start: segment,
        }
    }

    pub fn root(&self) -> SegmentId {
        self.root
    }

    /// First fragment of the insertion
    pub fn start(&self) -> SegmentId {
        self.start
    }

    /// Find the fragment whose `[offset, offset + extent]` contains `offset`
    ///
    /// A boundary offset resolves to the fragment ending there, except offset
    /// zero which resolves to the first fragment.
    pub fn find_segment_containing_offset(
        &self,
        arena: &SegmentArena,
        offset: Point,
    ) -> Option<SegmentId> {
        let mut current = Some(self.root);
        let mut left_ancestor_end = Point::ZERO;

        while let Some(node) = current {
            let segment = &arena[node];
            let start = match segment.split.left {
                Some(left) => traverse(left_ancestor_end, arena[left].split_subtree_extent),
                None => left_ancestor_end,
            };
            let end = traverse(start, segment.extent);

            if offset <= start && segment.split.left.is_some() {
                current = segment.split.left;
            } else if offset > end {
                left_ancestor_end = end;
                current = segment.split.right;
            } else {
                return Some(node);
            }
        }

        None
    }

    /// Split `segment` at `split_at` (relative to its own start)
    ///
    /// The segment keeps its identity as the prefix. Returns the new suffix,
    /// which becomes this tree's root.
    pub fn split_segment(
        &mut self,
        arena: &mut SegmentArena,
        segment: SegmentId,
        split_at: Point,
    ) -> SegmentId {
        let suffix = arena[segment].carve_suffix(split_at);
        let suffix = arena.push(suffix);
        arena[segment].next_split = Some(suffix);

        attach_after::<ByOffset>(arena, &mut self.root, segment, suffix, &());
        suffix
    }

    /// Next fragment of this insertion in offset order
    pub fn successor(&self, arena: &SegmentArena, segment: SegmentId) -> Option<SegmentId> {
        successor::<ByOffset>(arena, segment)
    }

    /// All fragments in offset order
    pub fn segments<'a>(&self, arena: &'a SegmentArena) -> impl Iterator<Item = SegmentId> + 'a {
        std::iter::successors(Some(self.start), move |&segment| arena[segment].next_split)
    }

    /// Total extent of the insertion
    pub fn extent(&self, arena: &SegmentArena) -> Point {
        arena[self.root].split_subtree_extent
    }
}
