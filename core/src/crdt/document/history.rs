//! Undo/redo history
//!
//! The undo stack holds transactions (groups of local splices) interleaved
//! with checkpoints. Undoing a transaction never removes text: it bumps the
//! undo count of each of its splices, which hides the splice's insertions and
//! revives what its deletions removed. Because undo counts are replicated as
//! ordinary operations, undo works the same whether or not other sites have
//! edited since.
//!
//! A barrier checkpoint cannot be crossed by undo, revert, grouping or a
//! changes-since-checkpoint query.

use super::{Document, UndoCounts};
use crate::crdt::change::{invert_changes, Change};
use crate::crdt::marker::{MarkerLayers, MarkersSnapshot};
use crate::crdt::operation::{Operation, Undo};
use crate::crdt::point::Point;
use crate::crdt::splice_id::SpliceId;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Local splices undone and redone together
#[derive(Debug, Clone)]
pub(crate) struct Transaction {
    timestamp: u64,
    operations: Vec<Operation>,
    markers_snapshot_before: Option<MarkersSnapshot>,
    markers_snapshot_after: Option<MarkersSnapshot>,
    grouping_interval: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    id: u32,
    is_barrier: bool,
    markers_snapshot: Option<MarkersSnapshot>,
}

#[derive(Debug, Clone)]
pub(crate) enum UndoEntry {
    Transaction(Transaction),
    Checkpoint(Checkpoint),
}

/// Outcome of an undo, redo or revert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoResult {
    /// Undo operations to broadcast
    pub operations: Vec<Operation>,

    pub text_updates: Vec<Change>,

    /// Markers captured with the restored state, if any
    pub markers: Option<MarkerLayers>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointOptions {
    pub is_barrier: bool,
    pub markers: Option<MarkerLayers>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    /// Remove the checkpoint itself along with the grouped entries
    pub delete_checkpoint: bool,

    /// Markers to restore when the grouped transaction is redone
    pub markers: Option<MarkerLayers>,
}

#[derive(Debug, Clone, Default)]
pub struct RevertOptions {
    pub delete_checkpoint: bool,
}

/// Portable undo/redo history
///
/// Transactions are stored as the text changes they made rather than as
/// operations, so a history can be restored into a document with a different
/// site id and no shared operation log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Text before the oldest retained transaction
    pub base_text: String,
    pub next_checkpoint_id: u32,
    pub undo_stack: Vec<HistoryEntry>,
    pub redo_stack: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HistoryEntry {
    Transaction {
        changes: Vec<Change>,
        markers_before: Option<MarkerLayers>,
        markers_after: Option<MarkerLayers>,
    },
    Checkpoint {
        id: u32,
        is_barrier: bool,
        markers: Option<MarkerLayers>,
    },
}

impl Document {
    pub(super) fn push_transaction(&mut self, operations: Vec<Operation>) {
        let timestamp = self.now();
        self.undo_stack.push(UndoEntry::Transaction(Transaction {
            timestamp,
            operations,
            markers_snapshot_before: None,
            markers_snapshot_after: None,
            grouping_interval: None,
        }));
        self.redo_stack.clear();
    }

    /// Undo the most recent local transaction
    ///
    /// Returns `None` when there is nothing to undo or a barrier checkpoint
    /// lies above the most recent transaction.
    pub fn undo(&mut self) -> Option<UndoResult> {
        let mut index = None;
        for (i, entry) in self.undo_stack.iter().enumerate().rev() {
            match entry {
                UndoEntry::Transaction(_) => {
                    index = Some(i);
                    break;
                }
                UndoEntry::Checkpoint(checkpoint) if checkpoint.is_barrier => return None,
                UndoEntry::Checkpoint(_) => {}
            }
        }
        let index = index?;

        let (operations, markers_snapshot) = match &self.undo_stack[index] {
            UndoEntry::Transaction(transaction) => (
                transaction.operations.clone(),
                transaction.markers_snapshot_before.clone(),
            ),
            UndoEntry::Checkpoint(_) => return None,
        };
        let moved: Vec<UndoEntry> = self.undo_stack.drain(index..).rev().collect();
        self.redo_stack.extend(moved);

        Some(self.undo_or_redo_operations(&operations, markers_snapshot))
    }

    /// Redo the most recently undone transaction
    pub fn redo(&mut self) -> Option<UndoResult> {
        let mut index = self
            .redo_stack
            .iter()
            .rposition(|entry| matches!(entry, UndoEntry::Transaction(_)))?;

        let (operations, markers_snapshot) = match &self.redo_stack[index] {
            UndoEntry::Transaction(transaction) => (
                transaction.operations.clone(),
                transaction.markers_snapshot_after.clone(),
            ),
            UndoEntry::Checkpoint(_) => return None,
        };
        while index > 0 && matches!(self.redo_stack[index - 1], UndoEntry::Checkpoint(_)) {
            index -= 1;
        }
        let moved: Vec<UndoEntry> = self.redo_stack.drain(index..).rev().collect();
        self.undo_stack.extend(moved);

        Some(self.undo_or_redo_operations(&operations, markers_snapshot))
    }

    fn undo_or_redo_operations(
        &mut self,
        operations: &[Operation],
        markers_snapshot: Option<MarkersSnapshot>,
    ) -> UndoResult {
        let (undos, text_updates) = self.toggle_undo_counts(operations);
        let operations: Vec<Operation> = undos.into_iter().map(Operation::Undo).collect();
        self.operations.extend(operations.iter().cloned());

        UndoResult {
            operations,
            text_updates,
            markers: markers_snapshot.map(|snapshot| self.markers_from_snapshot(&snapshot)),
        }
    }

    /// Bump the undo count of each splice, reporting the text changes
    fn toggle_undo_counts(&mut self, operations: &[Operation]) -> (Vec<Undo>, Vec<Change>) {
        self.begin_tracking();
        let undos = operations
            .iter()
            .filter_map(Operation::splice_id)
            .map(|splice_id| {
                let undo_count = self.undo_counts.get(splice_id) + 1;
                self.apply_undo_count(splice_id, undo_count);
                Undo {
                    splice_id,
                    undo_count,
                }
            })
            .collect();
        (undos, self.finish_tracking())
    }

    fn restore_undo_counts(&mut self, original: &UndoCounts) {
        let changed: Vec<(SpliceId, u32)> = self
            .undo_counts
            .0
            .iter()
            .filter(|&(&splice_id, &count)| original.get(splice_id) != count)
            .map(|(&splice_id, _)| (splice_id, original.get(splice_id)))
            .collect();
        for (splice_id, count) in changed {
            self.apply_undo_count(splice_id, count);
        }
    }

    /// Push a checkpoint onto the undo stack and return its id
    pub fn create_checkpoint(&mut self, options: CheckpointOptions) -> Result<u32> {
        let markers_snapshot = options
            .markers
            .as_ref()
            .map(|markers| self.snapshot_markers(markers))
            .transpose()?;

        let id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        self.undo_stack.push(UndoEntry::Checkpoint(Checkpoint {
            id,
            is_barrier: options.is_barrier,
            markers_snapshot,
        }));
        Ok(id)
    }

    /// Merge every transaction above a checkpoint into one
    ///
    /// Returns the combined changes, or `None` if the checkpoint is missing
    /// or hidden behind a barrier.
    pub fn group_changes_since_checkpoint(
        &mut self,
        checkpoint_id: u32,
        options: GroupOptions,
    ) -> Result<Option<Vec<Change>>> {
        if self.is_barrier_present_before_checkpoint(checkpoint_id) {
            return Ok(None);
        }
        let markers_snapshot_after = options
            .markers
            .as_ref()
            .map(|markers| self.snapshot_markers(markers))
            .transpose()?;

        let Some((operations, markers_snapshot_before)) =
            self.collect_operations_since_checkpoint(checkpoint_id, true, options.delete_checkpoint)
        else {
            return Ok(None);
        };
        if operations.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let changes = self.changes_for_operations(&operations);
        let timestamp = self.now();
        self.undo_stack.push(UndoEntry::Transaction(Transaction {
            timestamp,
            operations,
            markers_snapshot_before,
            markers_snapshot_after,
            grouping_interval: None,
        }));
        Ok(Some(changes))
    }

    /// Undo every transaction above a checkpoint and drop them from history
    pub fn revert_to_checkpoint(
        &mut self,
        checkpoint_id: u32,
        options: RevertOptions,
    ) -> Option<UndoResult> {
        if self.is_barrier_present_before_checkpoint(checkpoint_id) {
            return None;
        }
        let (operations, markers_snapshot) =
            self.collect_operations_since_checkpoint(checkpoint_id, true, options.delete_checkpoint)?;
        Some(self.undo_or_redo_operations(&operations, markers_snapshot))
    }

    /// Changes made since a checkpoint, leaving history untouched
    pub fn get_changes_since_checkpoint(&self, checkpoint_id: u32) -> Option<Vec<Change>> {
        if self.is_barrier_present_before_checkpoint(checkpoint_id) {
            return None;
        }
        let (operations, _) = self.operations_since_checkpoint(checkpoint_id)?;
        Some(self.changes_for_operations(&operations))
    }

    fn operations_since_checkpoint(
        &self,
        checkpoint_id: u32,
    ) -> Option<(Vec<Operation>, Option<MarkersSnapshot>)> {
        let index = self.undo_stack.iter().rposition(|entry| {
            matches!(entry, UndoEntry::Checkpoint(checkpoint) if checkpoint.id == checkpoint_id)
        })?;
        let UndoEntry::Checkpoint(checkpoint) = &self.undo_stack[index] else {
            return None;
        };

        let operations = self.undo_stack[index + 1..]
            .iter()
            .filter_map(|entry| match entry {
                UndoEntry::Transaction(transaction) => Some(transaction.operations.iter().cloned()),
                UndoEntry::Checkpoint(_) => None,
            })
            .flatten()
            .collect();
        Some((operations, checkpoint.markers_snapshot.clone()))
    }

    fn collect_operations_since_checkpoint(
        &mut self,
        checkpoint_id: u32,
        delete_operations: bool,
        delete_checkpoint: bool,
    ) -> Option<(Vec<Operation>, Option<MarkersSnapshot>)> {
        let collected = self.operations_since_checkpoint(checkpoint_id)?;

        if delete_operations {
            if let Some(index) = self.undo_stack.iter().rposition(|entry| {
                matches!(entry, UndoEntry::Checkpoint(checkpoint) if checkpoint.id == checkpoint_id)
            }) {
                let keep = if delete_checkpoint { index } else { index + 1 };
                self.undo_stack.truncate(keep);
            }
        }
        Some(collected)
    }

    pub fn is_barrier_present_before_checkpoint(&self, checkpoint_id: u32) -> bool {
        for entry in self.undo_stack.iter().rev() {
            if let UndoEntry::Checkpoint(checkpoint) = entry {
                if checkpoint.id == checkpoint_id {
                    return false;
                }
                if checkpoint.is_barrier {
                    return true;
                }
            }
        }
        false
    }

    /// Merge the two most recent transactions
    ///
    /// Returns `false` if there are fewer than two or a barrier separates
    /// them.
    pub fn group_last_changes(&mut self) -> bool {
        let mut last = None;
        for (i, entry) in self.undo_stack.iter().enumerate().rev() {
            match entry {
                UndoEntry::Checkpoint(checkpoint) if checkpoint.is_barrier => return false,
                UndoEntry::Checkpoint(_) => {}
                UndoEntry::Transaction(_) => match last {
                    None => last = Some(i),
                    Some(_) => {
                        let entries: Vec<UndoEntry> = self.undo_stack.drain(i..).collect();
                        let mut transactions = entries.into_iter().filter_map(|entry| match entry {
                            UndoEntry::Transaction(transaction) => Some(transaction),
                            UndoEntry::Checkpoint(_) => None,
                        });
                        let (Some(mut previous), Some(latest)) =
                            (transactions.next(), transactions.next())
                        else {
                            return false;
                        };

                        previous.timestamp = latest.timestamp;
                        previous.operations.extend(latest.operations);
                        previous.markers_snapshot_after = latest.markers_snapshot_after;
                        self.undo_stack.push(UndoEntry::Transaction(previous));
                        return true;
                    }
                },
            }
        }
        false
    }

    /// Merge the top transaction into the previous one if they happened
    /// within `grouping_interval` milliseconds of each other
    ///
    /// The shorter of the two transactions' intervals applies.
    pub fn apply_grouping_interval(&mut self, grouping_interval: u64) {
        let len = self.undo_stack.len();
        let Some(UndoEntry::Transaction(top)) = self.undo_stack.last_mut() else {
            return;
        };
        top.grouping_interval = Some(grouping_interval);
        let top_timestamp = top.timestamp;

        if len < 2 {
            return;
        }
        let UndoEntry::Transaction(previous) = &self.undo_stack[len - 2] else {
            return;
        };
        let min_interval = grouping_interval.min(previous.grouping_interval.unwrap_or(u64::MAX));
        if top_timestamp.saturating_sub(previous.timestamp) >= min_interval {
            return;
        }

        if let Some(UndoEntry::Transaction(top)) = self.undo_stack.pop() {
            if let Some(UndoEntry::Transaction(previous)) = self.undo_stack.last_mut() {
                previous.timestamp = top.timestamp;
                previous.grouping_interval = Some(grouping_interval);
                previous.operations.extend(top.operations);
                previous.markers_snapshot_after = top.markers_snapshot_after;
            }
        }
    }

    /// Export up to `max_entries` undo entries and the whole redo stack
    ///
    /// The document is temporarily rolled forward and back to compute each
    /// transaction's changes; its state is restored before returning.
    pub fn get_history(&mut self, max_entries: usize) -> History {
        let original = self.undo_counts.clone();

        let redo_entries: Vec<UndoEntry> = self.redo_stack.iter().rev().cloned().collect();
        let mut redo_stack = Vec::with_capacity(redo_entries.len());
        for entry in &redo_entries {
            redo_stack.push(match entry {
                UndoEntry::Transaction(transaction) => {
                    let markers_before = self.resolve_snapshot(&transaction.markers_snapshot_before);
                    let (_, changes) = self.toggle_undo_counts(&transaction.operations);
                    let markers_after = self.resolve_snapshot(&transaction.markers_snapshot_after);
                    HistoryEntry::Transaction {
                        changes,
                        markers_before,
                        markers_after,
                    }
                }
                UndoEntry::Checkpoint(checkpoint) => self.history_checkpoint(checkpoint),
            });
        }
        redo_stack.reverse();
        self.restore_undo_counts(&original);

        let undo_entries: Vec<UndoEntry> =
            self.undo_stack.iter().rev().take(max_entries).cloned().collect();
        let mut undo_stack = Vec::with_capacity(undo_entries.len());
        for entry in &undo_entries {
            undo_stack.push(match entry {
                UndoEntry::Transaction(transaction) => {
                    let markers_after = self.resolve_snapshot(&transaction.markers_snapshot_after);
                    let (_, changes) = self.toggle_undo_counts(&transaction.operations);
                    let markers_before = self.resolve_snapshot(&transaction.markers_snapshot_before);
                    HistoryEntry::Transaction {
                        changes: invert_changes(&changes),
                        markers_before,
                        markers_after,
                    }
                }
                UndoEntry::Checkpoint(checkpoint) => self.history_checkpoint(checkpoint),
            });
        }
        undo_stack.reverse();

        let base_text = self.get_text();
        self.restore_undo_counts(&original);

        History {
            base_text,
            next_checkpoint_id: self.next_checkpoint_id,
            undo_stack,
            redo_stack,
        }
    }

    fn resolve_snapshot(&self, snapshot: &Option<MarkersSnapshot>) -> Option<MarkerLayers> {
        snapshot
            .as_ref()
            .map(|snapshot| self.markers_from_snapshot(snapshot))
    }

    fn history_checkpoint(&self, checkpoint: &Checkpoint) -> HistoryEntry {
        HistoryEntry::Checkpoint {
            id: checkpoint.id,
            is_barrier: checkpoint.is_barrier,
            markers: self.resolve_snapshot(&checkpoint.markers_snapshot),
        }
    }

    /// Rebuild text and undo/redo stacks from an exported history
    pub(super) fn populate_history(&mut self, history: History) -> Result<()> {
        if !history.base_text.is_empty() {
            let end = self.extent();
            self.set_text_in_range(Point::ZERO, end, &history.base_text)?;
        }
        self.undo_stack.clear();

        for entry in history.undo_stack {
            self.replay_history_entry(entry)?;
        }

        let mut redo_transactions = 0;
        for entry in history.redo_stack.into_iter().rev() {
            if matches!(entry, HistoryEntry::Transaction { .. }) {
                redo_transactions += 1;
            }
            self.replay_history_entry(entry)?;
        }
        for _ in 0..redo_transactions {
            if self.undo().is_none() {
                return Err(SyncError::InvalidHistory(
                    "barrier checkpoint inside the redo stack".to_string(),
                ));
            }
        }

        self.next_checkpoint_id = self.next_checkpoint_id.max(history.next_checkpoint_id);
        Ok(())
    }

    fn replay_history_entry(&mut self, entry: HistoryEntry) -> Result<()> {
        match entry {
            HistoryEntry::Transaction {
                changes,
                markers_before,
                markers_after,
            } => {
                let markers_snapshot_before = markers_before
                    .as_ref()
                    .map(|markers| self.snapshot_markers(markers))
                    .transpose()?;

                let start = self.undo_stack.len();
                for change in changes.iter().rev() {
                    if change.old_start == change.old_end && change.new_text.is_empty() {
                        continue;
                    }
                    self.set_text_in_range(change.old_start, change.old_end, &change.new_text)?;
                }
                let operations = self
                    .undo_stack
                    .drain(start..)
                    .filter_map(|entry| match entry {
                        UndoEntry::Transaction(transaction) => Some(transaction.operations),
                        UndoEntry::Checkpoint(_) => None,
                    })
                    .flatten()
                    .collect();

                let markers_snapshot_after = markers_after
                    .as_ref()
                    .map(|markers| self.snapshot_markers(markers))
                    .transpose()?;
                let timestamp = self.now();
                self.undo_stack.push(UndoEntry::Transaction(Transaction {
                    timestamp,
                    operations,
                    markers_snapshot_before,
                    markers_snapshot_after,
                    grouping_interval: None,
                }));
            }
            HistoryEntry::Checkpoint {
                id,
                is_barrier,
                markers,
            } => {
                let markers_snapshot = markers
                    .as_ref()
                    .map(|markers| self.snapshot_markers(markers))
                    .transpose()?;
                self.next_checkpoint_id = self.next_checkpoint_id.max(id + 1);
                self.undo_stack.push(UndoEntry::Checkpoint(Checkpoint {
                    id,
                    is_barrier,
                    markers_snapshot,
                }));
            }
        }
        Ok(())
    }
}
