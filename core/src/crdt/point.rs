//! Point: row/column positions and extent arithmetic
//!
//! A `Point` is used both as an absolute position in the document and as an
//! extent (the distance spanned by a run of text). Extents compose with
//! [`traverse`] and are measured between two positions with [`traversal`].
//!
//! Rows count `\n` characters; columns count Unicode scalar values since the
//! last newline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row/column position (or extent) in text
///
/// Ordering is lexicographic: rows first, then columns.
///
/// # Example
///
/// ```rust
/// use textsync_core::crdt::Point;
///
/// assert!(Point::new(0, 10) < Point::new(1, 0));
/// assert_eq!(Point::ZERO, Point::new(0, 0));
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub const ZERO: Point = Point { row: 0, column: 0 };

    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    pub fn is_zero(&self) -> bool {
        self.row == 0 && self.column == 0
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Move `start` forward by `distance`
///
/// A distance that crosses a newline resets the column to the distance's own
/// column.
pub fn traverse(start: Point, distance: Point) -> Point {
    if distance.row == 0 {
        Point::new(start.row, start.column + distance.column)
    } else {
        Point::new(start.row + distance.row, distance.column)
    }
}

/// Distance from `start` to `end` (inverse of [`traverse`])
///
/// Requires `start <= end`.
pub fn traversal(end: Point, start: Point) -> Point {
    debug_assert!(start <= end, "traversal from {start} to {end} runs backwards");
    if end.row == start.row {
        Point::new(0, end.column - start.column)
    } else {
        Point::new(end.row - start.row, end.column)
    }
}

/// Extent spanned by `text`
pub fn extent_for_text(text: &str) -> Point {
    let mut extent = Point::ZERO;
    for ch in text.chars() {
        if ch == '\n' {
            extent.row += 1;
            extent.column = 0;
        } else {
            extent.column += 1;
        }
    }
    extent
}

/// Byte index in `text` of the character at the given extent from its start
///
/// Extents past the end of `text` clamp to `text.len()`.
pub fn byte_index_for_point(text: &str, point: Point) -> usize {
    let mut current = Point::ZERO;
    for (index, ch) in text.char_indices() {
        if current >= point {
            return index;
        }
        if ch == '\n' {
            current.row += 1;
            current.column = 0;
        } else {
            current.column += 1;
        }
    }
    text.len()
}
