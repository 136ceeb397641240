//! PositionTree: every fragment of the document in visible order
//!
//! One tree per document, bracketed by two zero-length sentinel segments.
//! Subtree summaries sum only the extents of *visible* fragments, so a
//! row/column position can be located by descending from the root. Whether a
//! fragment is visible is decided by the caller through [`Visibility`]; the
//! tree itself never looks at deletions or undo counts.
//!
//! Subtree sizes count all fragments and back [`PositionTree::segment_index`],
//! the rank used when comparing fragments during conflict resolution.

use super::{attach_after, splay, successor, Augment};
use crate::crdt::point::{traverse, Point};
use crate::crdt::segment::{Segment, SegmentArena, SegmentId, TreeLinks};
use std::marker::PhantomData;

/// Visibility predicate supplied by the document
pub trait Visibility {
    fn is_visible(&self, segment: &Segment) -> bool;
}

/// Position-tree specialization: summary is visible extent and node count
pub(crate) struct ByPosition<V: ?Sized>(PhantomData<V>);

impl<V: Visibility + ?Sized> Augment for ByPosition<V> {
    type Context = V;

    fn links(segment: &Segment) -> &TreeLinks {
        &segment.position
    }

    fn links_mut(segment: &mut Segment) -> &mut TreeLinks {
        &mut segment.position
    }

    fn update_subtree(arena: &mut SegmentArena, node: SegmentId, visible: &V) {
        let links = arena[node].position;
        let mut extent = Point::ZERO;
        let mut size = 1;

        if let Some(left) = links.left {
            extent = arena[left].position_subtree_extent;
            size += arena[left].position_subtree_size;
        }
        if visible.is_visible(&arena[node]) {
            extent = traverse(extent, arena[node].extent);
        }
        if let Some(right) = links.right {
            extent = traverse(extent, arena[right].position_subtree_extent);
            size += arena[right].position_subtree_size;
        }

        let segment = &mut arena[node];
        segment.position_subtree_extent = extent;
        segment.position_subtree_size = size;
    }
}

/// Link-only view used by traversals that never summarize
type Links = ByPosition<dyn Visibility>;

/// A fragment located by position, with its resolved visible span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMatch {
    pub segment: SegmentId,
    pub start: Point,
    pub end: Point,
}

/// Visible-order tree over all fragments of a document
#[derive(Debug, Clone)]
pub struct PositionTree {
    root: SegmentId,
    first: SegmentId,
    last: SegmentId,
}

impl PositionTree {
    /// Create a tree holding only the two boundary segments
    pub fn new<V: Visibility + ?Sized>(
        arena: &mut SegmentArena,
        first: SegmentId,
        last: SegmentId,
        visible: &V,
    ) -> Self {
        arena[first].position = TreeLinks {
            parent: None,
            left: None,
            right: Some(last),
        };
        arena[last].position = TreeLinks {
            parent: Some(first),
            left: None,
            right: None,
        };
        ByPosition::<V>::update_subtree(arena, last, visible);
        ByPosition::<V>::update_subtree(arena, first, visible);

        Self {
            root: first,
            first,
            last,
        }
    }

    pub fn root(&self) -> SegmentId {
        self.root
    }

    /// Leading boundary segment
    pub fn first(&self) -> SegmentId {
        self.first
    }

    /// Trailing boundary segment
    pub fn last(&self) -> SegmentId {
        self.last
    }

    /// Total visible extent of the document
    pub fn extent(&self, arena: &SegmentArena) -> Point {
        arena[self.root].position_subtree_extent
    }

    /// Find the visible fragment with `start < position <= end`
    ///
    /// Position zero resolves to the leading boundary segment. Returns `None`
    /// when `position` lies past the end of the document.
    pub fn find_segment_containing_position<V: Visibility + ?Sized>(
        &self,
        arena: &SegmentArena,
        position: Point,
        visible: &V,
    ) -> Option<PositionMatch> {
        let mut current = Some(self.root);
        let mut left_ancestor_end = Point::ZERO;

        while let Some(node) = current {
            let segment = &arena[node];
            let start = match segment.position.left {
                Some(left) => traverse(left_ancestor_end, arena[left].position_subtree_extent),
                None => left_ancestor_end,
            };
            let end = if visible.is_visible(segment) {
                traverse(start, segment.extent)
            } else {
                start
            };

            if position <= start && node != self.first {
                current = segment.position.left;
            } else if position > end {
                left_ancestor_end = end;
                current = segment.position.right;
            } else {
                return Some(PositionMatch {
                    segment: node,
                    start,
                    end,
                });
            }
        }

        None
    }

    /// Insert `segment` between the adjacent fragments `prev` and `next`
    pub fn insert_between<V: Visibility + ?Sized>(
        &mut self,
        arena: &mut SegmentArena,
        prev: SegmentId,
        next: SegmentId,
        segment: SegmentId,
        visible: &V,
    ) {
        self.splay(arena, prev, visible);
        self.splay(arena, next, visible);
        debug_assert_eq!(
            arena[next].position.left,
            Some(prev),
            "insert_between requires adjacent fragments"
        );

        let left = arena[next].position.left;
        arena[segment].position = TreeLinks {
            parent: None,
            left,
            right: Some(next),
        };
        if let Some(left) = left {
            arena[left].position.parent = Some(segment);
        }
        arena[next].position.left = None;
        arena[next].position.parent = Some(segment);
        self.root = segment;

        ByPosition::<V>::update_subtree(arena, next, visible);
        ByPosition::<V>::update_subtree(arena, segment, visible);
    }

    /// Place a freshly carved `suffix` right after its `prefix`
    pub fn split_segment<V: Visibility + ?Sized>(
        &mut self,
        arena: &mut SegmentArena,
        prefix: SegmentId,
        suffix: SegmentId,
        visible: &V,
    ) {
        attach_after::<ByPosition<V>>(arena, &mut self.root, prefix, suffix, visible);
    }

    /// Splay `node` to the root
    pub fn splay<V: Visibility + ?Sized>(
        &mut self,
        arena: &mut SegmentArena,
        node: SegmentId,
        visible: &V,
    ) {
        splay::<ByPosition<V>>(arena, &mut self.root, node, visible);
    }

    /// Recompute summaries after `node`'s visibility changed
    pub fn refresh<V: Visibility + ?Sized>(
        &mut self,
        arena: &mut SegmentArena,
        node: SegmentId,
        visible: &V,
    ) {
        self.splay(arena, node, visible);
        ByPosition::<V>::update_subtree(arena, node, visible);
    }

    /// Rank of `node` among all fragments, sentinels included
    pub fn segment_index(&self, arena: &SegmentArena, node: SegmentId) -> usize {
        let size = |child: Option<SegmentId>| child.map_or(0, |c| arena[c].position_subtree_size);

        let mut index = size(arena[node].position.left);
        let mut current = node;
        while let Some(parent) = arena[current].position.parent {
            if arena[parent].position.right == Some(current) {
                index += 1 + size(arena[parent].position.left);
            }
            current = parent;
        }
        index
    }

    /// Visible position at which `node` starts
    pub fn segment_position<V: Visibility + ?Sized>(
        &self,
        arena: &SegmentArena,
        node: SegmentId,
        visible: &V,
    ) -> Point {
        let extent = |child: Option<SegmentId>| {
            child.map_or(Point::ZERO, |c| arena[c].position_subtree_extent)
        };

        let mut position = extent(arena[node].position.left);
        let mut current = node;
        while let Some(parent) = arena[current].position.parent {
            if arena[parent].position.right == Some(current) {
                let mut before = extent(arena[parent].position.left);
                if visible.is_visible(&arena[parent]) {
                    before = traverse(before, arena[parent].extent);
                }
                position = traverse(before, position);
            }
            current = parent;
        }
        position
    }

    pub fn successor(&self, arena: &SegmentArena, node: SegmentId) -> Option<SegmentId> {
        successor::<Links>(arena, node)
    }

    /// All fragments in document order, sentinels included
    pub fn segments<'a>(&self, arena: &'a SegmentArena) -> impl Iterator<Item = SegmentId> + 'a {
        std::iter::successors(Some(self.first), move |&node| {
            successor::<Links>(arena, node)
        })
    }
}
