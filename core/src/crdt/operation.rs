//! Operations exchanged between replicas
//!
//! Every change a replica makes is described by an [`Operation`]:
//!
//! - **Splice**: an insertion, a deletion, or both (a replace). Positions are
//!   never sent; instead each side of the edit is described by the splice id
//!   and offset of the text it touched, which every replica can resolve
//!   regardless of what else it has integrated.
//! - **Undo**: the new undo count of an earlier splice. Odd counts hide the
//!   splice's effects, even counts restore them.
//! - **MarkersUpdate**: a site's marker layer changes, with logical ranges.

use super::marker::{LayerUpdates, LogicalRange};
use super::point::Point;
use super::splice_id::{SiteId, SpliceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inserted text and the text it was placed between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insertion {
    pub text: String,
    pub left_dependency_id: SpliceId,
    pub offset_in_left_dependency: Point,
    pub right_dependency_id: SpliceId,
    pub offset_in_right_dependency: Point,
}

/// Deleted range and the insertions it was allowed to cover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub left_dependency_id: SpliceId,
    pub offset_in_left_dependency: Point,
    pub right_dependency_id: SpliceId,
    pub offset_in_right_dependency: Point,

    /// Per site, the newest splice the deleting site had seen inside the range
    ///
    /// Text inserted by later splices survives even when it lands inside the
    /// deleted range.
    pub max_seqs_by_site: BTreeMap<SiteId, u32>,
}

/// Edit produced by one call to `set_text_in_range`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splice {
    pub splice_id: SpliceId,
    pub insertion: Option<Insertion>,
    pub deletion: Option<Deletion>,
}

/// New undo count of a splice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Undo {
    pub splice_id: SpliceId,
    pub undo_count: u32,
}

/// Marker layer changes published by a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkersUpdate {
    pub site_id: SiteId,
    pub updates: LayerUpdates<LogicalRange>,
}

/// Anything one replica sends another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    Splice(Splice),
    Undo(Undo),
    MarkersUpdate(MarkersUpdate),
}

impl Operation {
    /// Splice this operation creates or targets
    pub fn splice_id(&self) -> Option<SpliceId> {
        match self {
            Operation::Splice(splice) => Some(splice.splice_id),
            Operation::Undo(undo) => Some(undo.splice_id),
            Operation::MarkersUpdate(_) => None,
        }
    }
}

impl Insertion {
    pub fn dependencies(&self) -> [SpliceId; 2] {
        [self.left_dependency_id, self.right_dependency_id]
    }
}

impl Deletion {
    /// Every splice that must be integrated before this deletion applies
    pub fn dependencies(&self) -> impl Iterator<Item = SpliceId> + '_ {
        [self.left_dependency_id, self.right_dependency_id]
            .into_iter()
            .chain(
                self.max_seqs_by_site
                    .iter()
                    .map(|(&site, &seq)| SpliceId::new(site, seq)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deletion() -> Deletion {
        Deletion {
            left_dependency_id: SpliceId::new(1, 1),
            offset_in_left_dependency: Point::new(0, 2),
            right_dependency_id: SpliceId::new(2, 1),
            offset_in_right_dependency: Point::new(0, 1),
            max_seqs_by_site: BTreeMap::from([(1, 3), (2, 1)]),
        }
    }

    #[test]
    fn test_splice_id_accessor() {
        let splice = Operation::Splice(Splice {
            splice_id: SpliceId::new(1, 4),
            insertion: None,
            deletion: Some(deletion()),
        });
        let undo = Operation::Undo(Undo {
            splice_id: SpliceId::new(1, 4),
            undo_count: 1,
        });
        let markers = Operation::MarkersUpdate(MarkersUpdate {
            site_id: 1,
            updates: BTreeMap::new(),
        });

        assert_eq!(splice.splice_id(), Some(SpliceId::new(1, 4)));
        assert_eq!(undo.splice_id(), Some(SpliceId::new(1, 4)));
        assert_eq!(markers.splice_id(), None);
    }

    #[test]
    fn test_deletion_dependencies() {
        let deps: Vec<_> = deletion().dependencies().collect();
        assert_eq!(
            deps,
            vec![
                SpliceId::new(1, 1),
                SpliceId::new(2, 1),
                SpliceId::new(1, 3),
                SpliceId::new(2, 1),
            ]
        );
    }

    #[test]
    fn test_json_tagging() {
        let op = Operation::Undo(Undo {
            splice_id: SpliceId::new(3, 2),
            undo_count: 2,
        });

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "undo");

        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
