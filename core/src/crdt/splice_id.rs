//! SpliceId: identity of an edit-producing operation
//!
//! Every splice is identified by the site that produced it and that site's
//! sequence number. Sequence numbers start at 1 and increase by one per
//! splice, which lets receivers detect gaps and duplicates.
//!
//! Site 0 never edits; it owns the two zero-length boundary segments that
//! bracket every document.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a replica
pub type SiteId = u32;

/// Unique identifier for a splice
///
/// # Ordering
///
/// Ordered by site first, then sequence number. The site-major order is what
/// breaks ties between concurrent insertions: the lower site is placed first.
///
/// # Example
///
/// ```rust
/// use textsync_core::crdt::SpliceId;
///
/// let a = SpliceId::new(1, 40);
/// let b = SpliceId::new(2, 1);
/// assert!(a < b);
/// assert_eq!(b.to_string(), "2.1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpliceId {
    /// Site that produced the splice
    pub site: SiteId,

    /// Per-site sequence number
    pub seq: u32,
}

impl SpliceId {
    /// Id of the leading boundary segment
    pub const START: SpliceId = SpliceId { site: 0, seq: 0 };

    /// Id of the trailing boundary segment
    pub const END: SpliceId = SpliceId { site: 0, seq: 1 };

    pub fn new(site: SiteId, seq: u32) -> Self {
        Self { site, seq }
    }

    /// Check if this id belongs to one of the boundary segments
    pub fn is_sentinel(&self) -> bool {
        self.site == 0
    }

    /// Id of the splice produced just before this one by the same site
    pub fn predecessor(&self) -> Option<SpliceId> {
        (self.seq > 1).then(|| SpliceId::new(self.site, self.seq - 1))
    }
}

impl Ord for SpliceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.site.cmp(&other.site) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            other => other,
        }
    }
}

impl PartialOrd for SpliceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SpliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.site, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_site() {
        let id1 = SpliceId::new(1, 9);
        let id2 = SpliceId::new(2, 1);

        assert!(id1 < id2, "Lower site should come first");
    }

    #[test]
    fn test_ordering_by_seq() {
        let id1 = SpliceId::new(3, 1);
        let id2 = SpliceId::new(3, 2);

        assert!(id1 < id2);
    }

    #[test]
    fn test_sentinels() {
        assert!(SpliceId::START.is_sentinel());
        assert!(SpliceId::END.is_sentinel());
        assert!(!SpliceId::new(1, 1).is_sentinel());
    }

    #[test]
    fn test_predecessor() {
        assert_eq!(SpliceId::new(4, 1).predecessor(), None);
        assert_eq!(SpliceId::new(4, 3).predecessor(), Some(SpliceId::new(4, 2)));
    }

    #[test]
    fn test_hash_map_key() {
        use std::collections::HashMap;

        let mut undo_counts = HashMap::new();
        undo_counts.insert(SpliceId::new(1, 1), 2u32);
        assert_eq!(undo_counts.get(&SpliceId::new(1, 1)), Some(&2));
        assert_eq!(undo_counts.get(&SpliceId::new(1, 2)), None);
    }
}
