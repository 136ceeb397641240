//! Self-balancing order trees over the segment arena
//!
//! Both trees in a document are splay trees whose nodes are segments. They
//! differ only in which [`TreeLinks`] of a segment they use and in how they
//! summarize a subtree, so the rotation logic lives here once and is
//! specialized at compile time through the [`Augment`] trait.
//!
//! Neither tree stores a key. Order is whatever in-order sequence the owning
//! tree builds through its insertion rule, and lookups descend using the
//! subtree summaries that [`Augment::update_subtree`] maintains.

pub mod position_tree;
pub mod split_tree;

pub use position_tree::{PositionTree, Visibility};
pub use split_tree::SplitTree;

use super::segment::{SegmentArena, SegmentId, TreeLinks};
use super::Segment;

/// Accessors a concrete tree provides to the shared splay routines
pub(crate) trait Augment {
    /// Extra state needed to summarize a node (e.g. a visibility predicate)
    type Context: ?Sized;

    fn links(segment: &Segment) -> &TreeLinks;

    fn links_mut(segment: &mut Segment) -> &mut TreeLinks;

    /// Recompute `node`'s subtree summary from its children
    fn update_subtree(arena: &mut SegmentArena, node: SegmentId, cx: &Self::Context);
}

fn is_left_child<A: Augment>(arena: &SegmentArena, node: SegmentId) -> bool {
    match A::links(&arena[node]).parent {
        Some(parent) => A::links(&arena[parent]).left == Some(node),
        None => false,
    }
}

/// Rotate `pivot` (a right child) above its parent
fn rotate_left<A: Augment>(
    arena: &mut SegmentArena,
    root: &mut SegmentId,
    pivot: SegmentId,
    cx: &A::Context,
) {
    let Some(parent) = A::links(&arena[pivot]).parent else {
        return;
    };
    let grandparent = A::links(&arena[parent]).parent;

    match grandparent {
        Some(grandparent) => {
            let links = A::links_mut(&mut arena[grandparent]);
            if links.left == Some(parent) {
                links.left = Some(pivot);
            } else {
                links.right = Some(pivot);
            }
        }
        None => *root = pivot,
    }
    A::links_mut(&mut arena[pivot]).parent = grandparent;

    let inner = A::links(&arena[pivot]).left;
    A::links_mut(&mut arena[parent]).right = inner;
    if let Some(inner) = inner {
        A::links_mut(&mut arena[inner]).parent = Some(parent);
    }

    A::links_mut(&mut arena[pivot]).left = Some(parent);
    A::links_mut(&mut arena[parent]).parent = Some(pivot);

    A::update_subtree(arena, parent, cx);
    A::update_subtree(arena, pivot, cx);
}

/// Rotate `pivot` (a left child) above its parent
fn rotate_right<A: Augment>(
    arena: &mut SegmentArena,
    root: &mut SegmentId,
    pivot: SegmentId,
    cx: &A::Context,
) {
    let Some(parent) = A::links(&arena[pivot]).parent else {
        return;
    };
    let grandparent = A::links(&arena[parent]).parent;

    match grandparent {
        Some(grandparent) => {
            let links = A::links_mut(&mut arena[grandparent]);
            if links.left == Some(parent) {
                links.left = Some(pivot);
            } else {
                links.right = Some(pivot);
            }
        }
        None => *root = pivot,
    }
    A::links_mut(&mut arena[pivot]).parent = grandparent;

    let inner = A::links(&arena[pivot]).right;
    A::links_mut(&mut arena[parent]).left = inner;
    if let Some(inner) = inner {
        A::links_mut(&mut arena[inner]).parent = Some(parent);
    }

    A::links_mut(&mut arena[pivot]).right = Some(parent);
    A::links_mut(&mut arena[parent]).parent = Some(pivot);

    A::update_subtree(arena, parent, cx);
    A::update_subtree(arena, pivot, cx);
}

/// Move `node` to the root with zig, zig-zig and zig-zag steps
///
/// Every rotated node has its summary recomputed. A node that is already the
/// root is left untouched, so callers that changed the node itself must
/// update it afterwards.
pub(crate) fn splay<A: Augment>(
    arena: &mut SegmentArena,
    root: &mut SegmentId,
    node: SegmentId,
    cx: &A::Context,
) {
    while let Some(parent) = A::links(&arena[node]).parent {
        let node_is_left = is_left_child::<A>(arena, node);

        if A::links(&arena[parent]).parent.is_none() {
            // zig
            if node_is_left {
                rotate_right::<A>(arena, root, node, cx);
            } else {
                rotate_left::<A>(arena, root, node, cx);
            }
            break;
        }

        match (is_left_child::<A>(arena, parent), node_is_left) {
            // zig-zag
            (true, false) => {
                rotate_left::<A>(arena, root, node, cx);
                rotate_right::<A>(arena, root, node, cx);
            }
            (false, true) => {
                rotate_right::<A>(arena, root, node, cx);
                rotate_left::<A>(arena, root, node, cx);
            }
            // zig-zig
            (true, true) => {
                rotate_right::<A>(arena, root, parent, cx);
                rotate_right::<A>(arena, root, node, cx);
            }
            (false, false) => {
                rotate_left::<A>(arena, root, parent, cx);
                rotate_left::<A>(arena, root, node, cx);
            }
        }
    }
}

/// Next node in order: leftmost of the right subtree, else the nearest
/// ancestor reached from its left side
pub(crate) fn successor<A: Augment>(arena: &SegmentArena, node: SegmentId) -> Option<SegmentId> {
    if let Some(mut next) = A::links(&arena[node]).right {
        while let Some(left) = A::links(&arena[next]).left {
            next = left;
        }
        return Some(next);
    }

    let mut current = node;
    while let Some(parent) = A::links(&arena[current]).parent {
        if A::links(&arena[parent]).left == Some(current) {
            return Some(parent);
        }
        current = parent;
    }
    None
}

/// Hang `suffix` directly after `prefix`, which must be its in-order
/// predecessor-to-be
///
/// `prefix` is splayed first; `suffix` becomes the root with `prefix` as its
/// left child and the prefix's old right subtree as its right subtree.
pub(crate) fn attach_after<A: Augment>(
    arena: &mut SegmentArena,
    root: &mut SegmentId,
    prefix: SegmentId,
    suffix: SegmentId,
    cx: &A::Context,
) {
    splay::<A>(arena, root, prefix, cx);

    let right = A::links(&arena[prefix]).right;
    *A::links_mut(&mut arena[suffix]) = TreeLinks {
        parent: None,
        left: Some(prefix),
        right,
    };
    if let Some(right) = right {
        A::links_mut(&mut arena[right]).parent = Some(suffix);
    }

    let prefix_links = A::links_mut(&mut arena[prefix]);
    prefix_links.right = None;
    prefix_links.parent = Some(suffix);
    *root = suffix;

    A::update_subtree(arena, prefix, cx);
    A::update_subtree(arena, suffix, cx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::point::Point;
    use crate::crdt::segment::Anchor;
    use crate::crdt::SpliceId;

    /// Counts nodes through the position links
    struct BySize;

    impl Augment for BySize {
        type Context = ();

        fn links(segment: &Segment) -> &TreeLinks {
            &segment.position
        }

        fn links_mut(segment: &mut Segment) -> &mut TreeLinks {
            &mut segment.position
        }

        fn update_subtree(arena: &mut SegmentArena, node: SegmentId, _cx: &()) {
            let links = arena[node].position;
            let size = |child: Option<SegmentId>| child.map_or(0, |c| arena[c].position_subtree_size);
            let total = size(links.left) + 1 + size(links.right);
            arena[node].position_subtree_size = total;
        }
    }

    fn node(arena: &mut SegmentArena, label: &str) -> SegmentId {
        let anchor = Anchor::new(SpliceId::START, Point::ZERO);
        arena.push(Segment::new(SpliceId::new(1, 1), label.to_string(), anchor, anchor))
    }

    /// Build a left-leaning chain by repeatedly attaching after the last node
    fn chain(arena: &mut SegmentArena, labels: &[&str]) -> (SegmentId, Vec<SegmentId>) {
        let first = node(arena, labels[0]);
        let mut root = first;
        let mut ids = vec![first];
        for label in &labels[1..] {
            let id = node(arena, label);
            let last = *ids.last().unwrap();
            attach_after::<BySize>(arena, &mut root, last, id, &());
            ids.push(id);
        }
        (root, ids)
    }

    fn in_order(arena: &SegmentArena, root: SegmentId) -> Vec<String> {
        let mut first = root;
        while let Some(left) = arena[first].position.left {
            first = left;
        }
        let mut out = vec![arena[first].text.clone()];
        let mut current = first;
        while let Some(next) = successor::<BySize>(arena, current) {
            out.push(arena[next].text.clone());
            current = next;
        }
        out
    }

    #[test]
    fn test_attach_after_preserves_order() {
        let mut arena = SegmentArena::new();
        let (root, _) = chain(&mut arena, &["a", "b", "c", "d", "e"]);

        assert_eq!(in_order(&arena, root), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(arena[root].position_subtree_size, 5);
    }

    #[test]
    fn test_splay_moves_node_to_root() {
        let mut arena = SegmentArena::new();
        let (mut root, ids) = chain(&mut arena, &["a", "b", "c", "d", "e", "f", "g"]);

        for &target in &[ids[0], ids[3], ids[6], ids[2]] {
            splay::<BySize>(&mut arena, &mut root, target, &());
            assert_eq!(root, target);
            assert_eq!(arena[root].position.parent, None);
            assert_eq!(arena[root].position_subtree_size, 7);
            assert_eq!(in_order(&arena, root), vec!["a", "b", "c", "d", "e", "f", "g"]);
        }
    }

    #[test]
    fn test_successor_walks_all_nodes() {
        let mut arena = SegmentArena::new();
        let (mut root, ids) = chain(&mut arena, &["a", "b", "c", "d"]);
        splay::<BySize>(&mut arena, &mut root, ids[1], &());

        assert_eq!(successor::<BySize>(&arena, ids[0]), Some(ids[1]));
        assert_eq!(successor::<BySize>(&arena, ids[1]), Some(ids[2]));
        assert_eq!(successor::<BySize>(&arena, ids[2]), Some(ids[3]));
        assert_eq!(successor::<BySize>(&arena, ids[3]), None);
    }

    #[test]
    fn test_attach_in_middle() {
        let mut arena = SegmentArena::new();
        let (mut root, ids) = chain(&mut arena, &["a", "c"]);
        let b = node(&mut arena, "b");

        attach_after::<BySize>(&mut arena, &mut root, ids[0], b, &());

        assert_eq!(root, b);
        assert_eq!(in_order(&arena, root), vec!["a", "b", "c"]);
        assert_eq!(arena[root].position_subtree_size, 3);
    }
}
