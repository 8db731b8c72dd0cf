//! Pending patch list of one document.
//!
//! Operations are recorded at the moment the mutation happens, in emission
//! order. Two rules keep the batch small without reordering anything:
//!
//! - A write to an attribute, the text or the style of a node replaces the
//!   pending write to the same slot of the same node, provided every operation
//!   recorded after that pending write is a write to the same node. Writes
//!   never move across operations of other nodes or structural operations.
//! - Removing a node whose latest insert is still pending and was fresh (the
//!   host has never seen the node) drops that insert together with every later
//!   operation confined to the removed subtree. Later sibling inserts and
//!   reorders under the same parent are renumbered as if the node had never
//!   been there. A remove is still sent when a node the host already holds
//!   was moved into the subtree, a node of the subtree moved out of it, or a
//!   later inserted subtree carries nodes of it.

use bridge::{NodeKey, NodeSnapshot, Patch, PatchOp};
use log::trace;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Coalescing slot of a non-structural write.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Attribute(String),
    Text,
    Style,
}

#[derive(Clone, Debug)]
struct Pending {
    patch: Patch,
    slot: Option<Slot>,
    /// Parent and index the target left, for structural operations on a node
    /// that was already connected.
    from: Option<(NodeKey, usize)>,
}

impl Pending {
    fn fresh_snapshot(&self) -> Option<&NodeSnapshot> {
        match &self.patch.op {
            PatchOp::Insert { node, .. } => node.as_ref(),
            PatchOp::Remove { .. }
            | PatchOp::SetAttribute { .. }
            | PatchOp::RemoveAttribute { .. }
            | PatchOp::SetText { .. }
            | PatchOp::SetStyle { .. }
            | PatchOp::Reorder { .. } => None,
        }
    }
}

/// Lifetime totals of the recorder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PatchCounters {
    /// Operations appended to the pending list.
    pub emitted: u64,
    /// Writes folded into an earlier pending write.
    pub coalesced: u64,
    /// Pending operations dropped because their node was removed before flush.
    pub cancelled: u64,
    /// Operations handed out by flushes.
    pub flushed: u64,
}

/// Pending operations to drop, and new indices for the ones that survive.
struct Cancellation {
    dropped: HashSet<usize>,
    reindexed: Vec<(usize, usize)>,
    departures: Vec<(usize, usize)>,
}

fn mentions(snapshot: &NodeSnapshot, keys: &HashSet<NodeKey>) -> bool {
    keys.contains(&snapshot.id) || snapshot.children.iter().any(|child| mentions(child, keys))
}

fn collect_keys(snapshot: &NodeSnapshot, into: &mut HashSet<NodeKey>) {
    into.insert(snapshot.id);
    for child in &snapshot.children {
        collect_keys(child, into);
    }
}

#[derive(Debug)]
pub struct PatchRecorder {
    pending: Vec<Pending>,
    seqs: HashMap<NodeKey, u64>,
    coalesce: bool,
    counters: PatchCounters,
}

impl PatchRecorder {
    pub fn new(coalesce: bool) -> Self {
        Self {
            pending: Vec::new(),
            seqs: HashMap::new(),
            coalesce,
            counters: PatchCounters::default(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub const fn counters(&self) -> PatchCounters {
        self.counters
    }

    /// Pending operations in emission order.
    pub fn pending(&self) -> impl Iterator<Item = &Patch> {
        self.pending.iter().map(|entry| &entry.patch)
    }

    fn next_seq(&mut self, target: NodeKey) -> u64 {
        let seq = self.seqs.entry(target).or_insert(0);
        *seq += 1;
        *seq
    }

    fn push(&mut self, target: NodeKey, op: PatchOp, slot: Option<Slot>, from: Option<(NodeKey, usize)>) {
        let seq = self.next_seq(target);
        trace!("patch {seq} for {target}: {op:?}");
        self.pending.push(Pending {
            patch: Patch {
                target_id: target,
                seq,
                op,
            },
            slot,
            from,
        });
        self.counters.emitted += 1;
    }

    /// Record an attribute, text or style write.
    pub fn record_write(&mut self, target: NodeKey, slot: Slot, op: PatchOp) {
        if self.coalesce {
            for entry in self.pending.iter_mut().rev() {
                if entry.patch.op.is_structural() || entry.patch.target_id != target {
                    break;
                }
                if entry.slot.as_ref() == Some(&slot) {
                    entry.patch.op = op;
                    self.counters.coalesced += 1;
                    return;
                }
            }
        }
        self.push(target, op, Some(slot), None);
    }

    /// Record the connection of a node the host has never seen, carrying its
    /// full subtree.
    pub fn record_insert(&mut self, target: NodeKey, parent: NodeKey, index: usize, node: NodeSnapshot) {
        let op = PatchOp::Insert {
            parent_id: parent,
            index,
            node: Some(node),
        };
        self.push(target, op, None, None);
    }

    /// Record a connected node moving to another parent. `from` is the parent
    /// and index it left.
    pub fn record_move(&mut self, target: NodeKey, parent: NodeKey, index: usize, from: (NodeKey, usize)) {
        let op = PatchOp::Insert {
            parent_id: parent,
            index,
            node: None,
        };
        self.push(target, op, None, Some(from));
    }

    /// Record a move within `parent` from index `from` to `index`.
    pub fn record_reorder(&mut self, target: NodeKey, parent: NodeKey, from: usize, index: usize) {
        let op = PatchOp::Reorder {
            parent_id: parent,
            index,
        };
        self.push(target, op, None, Some((parent, from)));
    }

    /// Record the removal of a connected node found at `index` in `parent`,
    /// cancelling its pending fresh insert instead when the host never needs
    /// to learn about it.
    pub fn record_remove(&mut self, target: NodeKey, parent: NodeKey, index: usize) {
        if let Some(cancellation) = self.cancellable(target) {
            for &(position, renumbered) in &cancellation.reindexed {
                if let PatchOp::Insert { index: stale, .. } | PatchOp::Reorder { index: stale, .. } =
                    &mut self.pending[position].patch.op
                {
                    *stale = renumbered;
                }
            }
            for &(position, renumbered) in &cancellation.departures {
                if let Some((_, from)) = &mut self.pending[position].from {
                    *from = renumbered;
                }
            }
            let count = cancellation.dropped.len();
            let mut position = 0;
            self.pending.retain(|_| {
                let keep = !cancellation.dropped.contains(&position);
                position += 1;
                keep
            });
            self.counters.cancelled += count as u64;
            trace!("removal of {target} cancelled {count} pending operations");
            return;
        }
        self.push(target, PatchOp::Remove { parent_id: parent }, None, Some((parent, index)));
    }

    /// What removing `target` can undo instead of sending a remove, `None` if
    /// a remove must be sent.
    fn cancellable(&self, target: NodeKey) -> Option<Cancellation> {
        let position = self.pending.iter().rposition(|entry| {
            entry.patch.target_id == target && matches!(entry.patch.op, PatchOp::Insert { .. })
        })?;
        let insert = &self.pending[position];
        let snapshot = insert.fresh_snapshot()?;
        let PatchOp::Insert {
            parent_id: insert_parent,
            index: mut slot,
            ..
        } = insert.patch.op
        else {
            return None;
        };

        // Keys the host would only have learned through dropped operations.
        let mut region = HashSet::new();
        collect_keys(snapshot, &mut region);
        let mut dropped = HashSet::from([position]);
        let mut reindexed = Vec::new();
        let mut departures = Vec::new();

        for (offset, entry) in self.pending[position + 1..].iter().enumerate() {
            let index = position + 1 + offset;
            let op = &entry.patch.op;
            let subject = entry.patch.target_id;
            if subject == target {
                match op {
                    // The target left and came back inside another subtree.
                    PatchOp::Remove { .. } | PatchOp::Insert { .. } => return None,
                    PatchOp::Reorder { index: to, .. } => slot = *to,
                    PatchOp::SetAttribute { .. }
                    | PatchOp::RemoveAttribute { .. }
                    | PatchOp::SetText { .. }
                    | PatchOp::SetStyle { .. } => {}
                }
                dropped.insert(index);
                continue;
            }
            let in_region = region.contains(&subject);
            let into_region = op.parent().is_some_and(|parent| region.contains(&parent));
            if !into_region && entry.fresh_snapshot().is_some_and(|inner| mentions(inner, &region)) {
                // The host learns region nodes again through another subtree.
                return None;
            }
            // `slot` follows the target's index under its parent as the host
            // would have seen it.
            if let Some((left, from)) = entry.from {
                if left == insert_parent {
                    if from < slot {
                        slot -= 1;
                    } else if from > slot {
                        departures.push((index, from - 1));
                    }
                }
            }
            match op.parent() {
                Some(parent) if parent == insert_parent => {
                    if in_region {
                        // A region node moved next to the target.
                        return None;
                    }
                    if let PatchOp::Insert { index: to, .. } | PatchOp::Reorder { index: to, .. } = op {
                        if *to <= slot {
                            slot += 1;
                        } else {
                            reindexed.push((index, to - 1));
                        }
                    }
                }
                Some(parent) if region.contains(&parent) => {
                    if let Some(inner) = entry.fresh_snapshot() {
                        collect_keys(inner, &mut region);
                    } else if !in_region {
                        // A node the host holds elsewhere moved into the region.
                        return None;
                    }
                    dropped.insert(index);
                }
                Some(_) => {
                    if in_region {
                        // A region node moved out to a surviving parent.
                        return None;
                    }
                }
                None => {
                    if in_region {
                        dropped.insert(index);
                    }
                }
            }
        }
        Some(Cancellation {
            dropped,
            reindexed,
            departures,
        })
    }

    /// Take every pending operation, leaving the list empty.
    pub fn drain(&mut self) -> Vec<Patch> {
        let ops: Vec<Patch> = self.pending.drain(..).map(|entry| entry.patch).collect();
        self.counters.flushed += ops.len() as u64;
        ops
    }

    /// Discard pending operations without sending them (used when a full
    /// snapshot supersedes them).
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Next sequence number for a node, for operations built outside the
    /// pending list (resync snapshots).
    pub fn stamp(&mut self, target: NodeKey) -> u64 {
        self.next_seq(target)
    }

    pub fn forget(&mut self, target: NodeKey) {
        self.seqs.remove(&target);
    }

    pub fn set_coalesce(&mut self, coalesce: bool) {
        self.coalesce = coalesce;
    }
}
