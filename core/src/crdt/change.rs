//! Text updates reported to the editor
//!
//! Integration, undo and redo report what happened to the visible text as a
//! list of [`Change`]s sorted by position. Each change carries both old and new
//! coordinates, so a consumer holding the old text can apply the list from
//! last to first without adjusting positions.

use super::point::{byte_index_for_point, Point};
use serde::{Deserialize, Serialize};

/// Replacement of `old_text` at `old_start..old_end` by `new_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub old_start: Point,
    pub old_end: Point,
    pub old_text: String,
    pub new_start: Point,
    pub new_end: Point,
    pub new_text: String,
}

impl Change {
    /// The change that reverts this one
    pub fn inverted(&self) -> Change {
        Change {
            old_start: self.new_start,
            old_end: self.new_end,
            old_text: self.new_text.clone(),
            new_start: self.old_start,
            new_end: self.old_end,
            new_text: self.old_text.clone(),
        }
    }
}

/// Invert a sorted change list
pub fn invert_changes(changes: &[Change]) -> Vec<Change> {
    changes.iter().map(Change::inverted).collect()
}

/// Apply a sorted change list to the text it was computed against
///
/// # Example
///
/// ```rust
/// use textsync_core::crdt::{apply_changes, Change, Point};
///
/// let changes = vec![Change {
///     old_start: Point::new(0, 1),
///     old_end: Point::new(0, 2),
///     old_text: "b".to_string(),
///     new_start: Point::new(0, 1),
///     new_end: Point::new(0, 3),
///     new_text: "XY".to_string(),
/// }];
///
/// assert_eq!(apply_changes("abc", &changes), "aXYc");
/// ```
pub fn apply_changes(text: &str, changes: &[Change]) -> String {
    let mut text = text.to_string();
    for change in changes.iter().rev() {
        let start = byte_index_for_point(&text, change.old_start);
        let end = byte_index_for_point(&text, change.old_end);
        text.replace_range(start..end, &change.new_text);
    }
    text
}
