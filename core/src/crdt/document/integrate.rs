//! Remote operation integration
//!
//! Operations may arrive in any interleaving across sites. Each one is checked
//! for causal readiness first; an operation that names a splice this replica
//! has not integrated yet is parked on that splice id and replayed as soon as
//! the splice is integrated, within the same call when possible.

use super::Document;
use crate::crdt::change::Change;
use crate::crdt::marker::{
    LayerId, LayerUpdates, LogicalMarker, LogicalRange, MarkerId, MarkerUpdates,
};
use crate::crdt::operation::{Deletion, Insertion, MarkersUpdate, Operation, Splice, Undo};
use crate::crdt::segment::{Anchor, SegmentId};
use crate::crdt::splice_id::{SiteId, SpliceId};
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Outcome of [`Document::integrate_operations`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrationResult {
    /// Visible text changes, sorted by position
    pub text_updates: Vec<Change>,

    /// Remote marker changes, resolved against the updated text
    pub marker_updates: MarkerUpdates,
}

type MarkerKey = (SiteId, LayerId, MarkerId);

/// Operations and marker updates waiting on a splice
#[derive(Debug, Default)]
pub(super) struct Deferred {
    operations: HashMap<SpliceId, Vec<Operation>>,
    marker_keys: HashMap<SpliceId, Vec<MarkerKey>>,
    markers: HashMap<MarkerKey, LogicalMarker>,
}

impl Deferred {
    fn park_operation(&mut self, dependency: SpliceId, operation: Operation) {
        self.operations.entry(dependency).or_default().push(operation);
    }

    fn park_marker(&mut self, dependency: SpliceId, key: MarkerKey, marker: LogicalMarker) {
        self.markers.insert(key, marker);
        let keys = self.marker_keys.entry(dependency).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    /// Drop any parked update for a marker that was replaced or removed
    fn discard_marker(&mut self, key: MarkerKey) {
        if self.markers.remove(&key).is_some() {
            self.forget_keys(|candidate| candidate == key);
        }
    }

    fn discard_layer(&mut self, site_id: SiteId, layer_id: LayerId) {
        let in_layer = |(site, layer, _): MarkerKey| site == site_id && layer == layer_id;
        self.markers.retain(|&key, _| !in_layer(key));
        self.forget_keys(in_layer);
    }

    fn forget_keys(&mut self, matches: impl Fn(MarkerKey) -> bool) {
        self.marker_keys.retain(|_, keys| {
            keys.retain(|&key| !matches(key));
            !keys.is_empty()
        });
    }

    fn release(&mut self, dependency: SpliceId) -> (Vec<Operation>, Vec<MarkerKey>) {
        (
            self.operations.remove(&dependency).unwrap_or_default(),
            self.marker_keys.remove(&dependency).unwrap_or_default(),
        )
    }

    pub(super) fn len(&self) -> usize {
        self.operations.values().map(Vec::len).sum::<usize>() + self.markers.len()
    }
}

enum Readiness {
    Ready,
    Duplicate,
    Blocked(SpliceId),
}

/// Logical marker changes collected during one integration call
type LogicalResults = BTreeMap<SiteId, LayerUpdates<LogicalRange>>;

impl Document {
    /// Integrate operations received from other replicas
    ///
    /// Operations whose dependencies are missing are deferred and integrated
    /// automatically once those dependencies arrive. Splices already
    /// integrated are ignored. Returns the resulting text changes and the
    /// marker updates of remote sites.
    ///
    /// Fails with [`SyncError::LocalOperationOutOfOrder`] when handed a splice
    /// attributed to this replica's site that this replica never produced.
    pub fn integrate_operations<I>(&mut self, operations: I) -> Result<IntegrationResult>
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut queue: VecDeque<Operation> = operations.into_iter().collect();
        let mut marker_results = LogicalResults::new();

        self.begin_tracking();
        let outcome = self.integrate_queue(&mut queue, &mut marker_results);
        let text_updates = self.finish_tracking();
        outcome?;

        Ok(IntegrationResult {
            text_updates,
            marker_updates: self.resolve_marker_results(marker_results),
        })
    }

    /// Number of operations and marker updates still waiting on dependencies
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    fn integrate_queue(
        &mut self,
        queue: &mut VecDeque<Operation>,
        marker_results: &mut LogicalResults,
    ) -> Result<()> {
        while let Some(operation) = queue.pop_front() {
            match self.readiness(&operation)? {
                Readiness::Duplicate => {
                    warn!(splice_id = ?operation.splice_id(), "dropping duplicate operation");
                }
                Readiness::Blocked(dependency) => {
                    debug!(
                        splice_id = ?operation.splice_id(),
                        dependency = %dependency,
                        "deferring operation on missing dependency"
                    );
                    self.deferred.park_operation(dependency, operation);
                }
                Readiness::Ready => {
                    let Some(splice_id) = self.integrate_operation(operation, marker_results)? else {
                        continue;
                    };

                    let (operations, marker_keys) = self.deferred.release(splice_id);
                    if !operations.is_empty() {
                        debug!(dependency = %splice_id, count = operations.len(), "replaying deferred operations");
                    }
                    for operation in operations.into_iter().rev() {
                        queue.push_front(operation);
                    }
                    for key in marker_keys {
                        self.retry_marker(key, marker_results);
                    }
                }
            }
        }
        Ok(())
    }

    fn readiness(&self, operation: &Operation) -> Result<Readiness> {
        match operation {
            Operation::Splice(splice) => self.splice_readiness(splice),
            Operation::Undo(undo) => Ok(if self.has_integrated(undo.splice_id) {
                Readiness::Ready
            } else {
                Readiness::Blocked(undo.splice_id)
            }),
            Operation::MarkersUpdate(_) => Ok(Readiness::Ready),
        }
    }

    fn splice_readiness(&self, splice: &Splice) -> Result<Readiness> {
        let SpliceId { site, seq } = splice.splice_id;
        let last_seq = self.last_seq(site);

        if site == self.site_id {
            if seq > last_seq {
                return Err(SyncError::LocalOperationOutOfOrder(splice.splice_id));
            }
            return Ok(Readiness::Duplicate);
        }
        if seq <= last_seq {
            return Ok(Readiness::Duplicate);
        }
        if seq > last_seq + 1 {
            return Ok(Readiness::Blocked(SpliceId::new(site, seq - 1)));
        }

        if let Some(insertion) = &splice.insertion {
            for dependency in insertion.dependencies() {
                if !self.split_trees.contains_key(&dependency) {
                    return Ok(Readiness::Blocked(dependency));
                }
            }
        }
        if let Some(deletion) = &splice.deletion {
            for dependency in [deletion.left_dependency_id, deletion.right_dependency_id] {
                if !self.split_trees.contains_key(&dependency) {
                    return Ok(Readiness::Blocked(dependency));
                }
            }
            if let Some(dependency) = deletion
                .dependencies()
                .find(|&dependency| !self.has_integrated(dependency))
            {
                return Ok(Readiness::Blocked(dependency));
            }
        }

        Ok(Readiness::Ready)
    }

    /// Integrate a ready operation; returns the splice id it made available
    fn integrate_operation(
        &mut self,
        operation: Operation,
        marker_results: &mut LogicalResults,
    ) -> Result<Option<SpliceId>> {
        match operation {
            Operation::Splice(splice) => {
                let splice_id = splice.splice_id;
                trace!(splice_id = %splice_id, "integrating splice");

                if let Some(deletion) = &splice.deletion {
                    self.integrate_deletion(splice_id, deletion)?;
                }
                if let Some(insertion) = &splice.insertion {
                    self.integrate_insertion(splice_id, insertion)?;
                }
                self.last_seqs_by_site.insert(splice_id.site, splice_id.seq);
                self.operations.push(Operation::Splice(splice));
                Ok(Some(splice_id))
            }
            Operation::Undo(undo) => {
                self.integrate_undo(undo);
                Ok(None)
            }
            Operation::MarkersUpdate(update) => {
                self.integrate_markers_update(update, marker_results);
                Ok(None)
            }
        }
    }

    /// Place a remote insertion among concurrent insertions at the same spot
    fn integrate_insertion(&mut self, splice_id: SpliceId, insertion: &Insertion) -> Result<()> {
        let mut left = self.find_segment_end(
            insertion.left_dependency_id,
            insertion.offset_in_left_dependency,
        )?;
        let mut right = self.find_segment_start(
            insertion.right_dependency_id,
            insertion.offset_in_right_dependency,
        )?;
        let mut left_index = self.position_tree.segment_index(&self.arena, left);
        let mut right_index = self.position_tree.segment_index(&self.arena, right);

        let mut prev = left;
        let mut current = self.successor(left)?;
        while current != right {
            let (dependency_left, dependency_right) = self.dependency_indices(current)?;

            if dependency_left <= left_index && dependency_right >= right_index {
                // Inserted concurrently into the same gap: the lower id goes first.
                if splice_id < self.arena[current].splice_id {
                    right = current;
                    right_index = self.position_tree.segment_index(&self.arena, right);
                } else {
                    left = current;
                    left_index = self.position_tree.segment_index(&self.arena, left);
                }
                prev = left;
                current = self.successor(left)?;
            } else {
                prev = current;
                current = self.successor(current)?;
            }
        }

        self.insert_segment(
            splice_id,
            &insertion.text,
            Anchor::new(
                insertion.left_dependency_id,
                insertion.offset_in_left_dependency,
            ),
            Anchor::new(
                insertion.right_dependency_id,
                insertion.offset_in_right_dependency,
            ),
            prev,
            right,
        );
        Ok(())
    }

    /// Ranks of the fragments a segment was originally inserted between
    fn dependency_indices(&self, segment: SegmentId) -> Result<(usize, usize)> {
        let left = self.resolve_end_anchor(self.arena[segment].left_dependency)?;
        let right = self.resolve_start_anchor(self.arena[segment].right_dependency)?;
        Ok((
            self.position_tree.segment_index(&self.arena, left),
            self.position_tree.segment_index(&self.arena, right),
        ))
    }

    /// Mark the fragments of a remote deletion that its author had seen
    fn integrate_deletion(&mut self, splice_id: SpliceId, deletion: &Deletion) -> Result<()> {
        let left = self.find_segment_start(
            deletion.left_dependency_id,
            deletion.offset_in_left_dependency,
        )?;
        let right = self.find_segment_end(
            deletion.right_dependency_id,
            deletion.offset_in_right_dependency,
        )?;

        let mut marked = Vec::new();
        let mut current = left;
        loop {
            let owner = self.arena[current].splice_id;
            if deletion
                .max_seqs_by_site
                .get(&owner.site)
                .is_some_and(|&max_seq| owner.seq <= max_seq)
            {
                marked.push(current);
            }

            if current == right {
                break;
            }
            current = self.successor(current)?;
        }

        self.mark_deleted(splice_id, marked);
        Ok(())
    }

    /// Apply a remote undo count; the higher count wins
    fn integrate_undo(&mut self, undo: Undo) {
        if undo.undo_count <= self.undo_counts.get(undo.splice_id) {
            return;
        }
        trace!(splice_id = %undo.splice_id, undo_count = undo.undo_count, "integrating undo");
        self.apply_undo_count(undo.splice_id, undo.undo_count);
        self.operations.push(Operation::Undo(undo));
    }

    fn integrate_markers_update(&mut self, update: MarkersUpdate, marker_results: &mut LogicalResults) {
        let site_id = update.site_id;
        if site_id == self.site_id {
            return;
        }

        for (layer_id, layer_update) in update.updates {
            let Some(markers) = layer_update else {
                self.deferred.discard_layer(site_id, layer_id);
                if let Some(layers) = self.markers.get_mut(&site_id) {
                    layers.remove(&layer_id);
                }
                marker_results
                    .entry(site_id)
                    .or_default()
                    .insert(layer_id, None);
                continue;
            };

            for (marker_id, marker) in markers {
                let key = (site_id, layer_id, marker_id);
                self.deferred.discard_marker(key);

                match marker {
                    Some(marker) => match self.missing_marker_dependency(&marker) {
                        Some(dependency) => {
                            debug!(site_id, layer_id, marker_id, dependency = %dependency, "deferring marker update");
                            self.deferred.park_marker(dependency, key, marker);
                        }
                        None => self.set_remote_marker(key, Some(marker), marker_results),
                    },
                    None => self.set_remote_marker(key, None, marker_results),
                }
            }
        }
    }

    /// Apply a parked marker update whose dependency just arrived
    fn retry_marker(&mut self, key: MarkerKey, marker_results: &mut LogicalResults) {
        let Some(marker) = self.deferred.markers.get(&key).copied() else {
            return;
        };

        match self.missing_marker_dependency(&marker) {
            Some(dependency) => self.deferred.park_marker(dependency, key, marker),
            None => {
                self.deferred.discard_marker(key);
                self.set_remote_marker(key, Some(marker), marker_results);
            }
        }
    }

    fn missing_marker_dependency(&self, marker: &LogicalMarker) -> Option<SpliceId> {
        marker
            .range
            .dependencies()
            .into_iter()
            .find(|dependency| !self.split_trees.contains_key(dependency))
    }

    fn set_remote_marker(
        &mut self,
        (site_id, layer_id, marker_id): MarkerKey,
        marker: Option<LogicalMarker>,
        marker_results: &mut LogicalResults,
    ) {
        let layer = self
            .markers
            .entry(site_id)
            .or_default()
            .entry(layer_id)
            .or_default();
        match marker {
            Some(marker) => {
                layer.insert(marker_id, marker);
            }
            None => {
                layer.remove(&marker_id);
            }
        }

        let result_layer = marker_results
            .entry(site_id)
            .or_default()
            .entry(layer_id)
            .or_insert_with(|| Some(BTreeMap::new()));
        result_layer
            .get_or_insert_with(BTreeMap::new)
            .insert(marker_id, marker);
    }

    /// Resolve collected logical marker changes to absolute ranges
    fn resolve_marker_results(&self, marker_results: LogicalResults) -> MarkerUpdates {
        marker_results
            .into_iter()
            .map(|(site_id, layers)| {
                let layers = layers
                    .into_iter()
                    .map(|(layer_id, layer)| {
                        let layer = layer.map(|markers| {
                            markers
                                .into_iter()
                                .filter_map(|(marker_id, marker)| match marker {
                                    Some(marker) => self
                                        .resolve_marker(&marker)
                                        .map(|marker| (marker_id, Some(marker))),
                                    None => Some((marker_id, None)),
                                })
                                .collect()
                        });
                        (layer_id, layer)
                    })
                    .collect();
                (site_id, layers)
            })
            .collect()
    }
}
