//! Mutation observers.
//!
//! Records are queued per observer while mutations happen; callbacks only run
//! when the owner calls [`Document::deliver_mutation_records`], which the page
//! scheduler does after each patch flush.

use crate::document::Document;
use crate::error::TreeError;
use bridge::NodeKey;
use indextree::NodeId;
use log::trace;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub target: NodeKey,
    pub added_nodes: Vec<NodeKey>,
    pub removed_nodes: Vec<NodeKey>,
    pub previous_sibling: Option<NodeKey>,
    pub next_sibling: Option<NodeKey>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub fn new(kind: MutationKind, target: NodeKey) -> Self {
        Self {
            kind,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            previous_sibling: None,
            next_sibling: None,
            attribute_name: None,
            old_value: None,
        }
    }

    pub(crate) fn child_list(
        target: NodeKey,
        added_nodes: Vec<NodeKey>,
        removed_nodes: Vec<NodeKey>,
        previous_sibling: Option<NodeKey>,
        next_sibling: Option<NodeKey>,
    ) -> Self {
        Self {
            added_nodes,
            removed_nodes,
            previous_sibling,
            next_sibling,
            ..Self::new(MutationKind::ChildList, target)
        }
    }

    pub(crate) fn attribute(target: NodeKey, name: &str, old_value: Option<String>) -> Self {
        Self {
            attribute_name: Some(name.to_owned()),
            old_value,
            ..Self::new(MutationKind::Attributes, target)
        }
    }
}

/// What an observer wants to hear about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationObserverInit {
    pub child_list: bool,
    pub attributes: bool,
    pub character_data: bool,
    pub subtree: bool,
    pub attribute_old_value: bool,
    pub character_data_old_value: bool,
    /// Only these attribute names, when set.
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    fn wants(&self, record: &MutationRecord) -> bool {
        match record.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::Attributes => {
                self.attributes
                    && self.attribute_filter.as_ref().is_none_or(|filter| {
                        record
                            .attribute_name
                            .as_ref()
                            .is_some_and(|name| filter.iter().any(|allowed| allowed == name))
                    })
            }
        }
    }

    fn keeps_old_value(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Attributes => self.attribute_old_value,
            MutationKind::CharacterData => self.character_data_old_value,
            MutationKind::ChildList => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

pub type ObserverCallback = Rc<RefCell<dyn FnMut(&[MutationRecord], &mut Document)>>;

struct ObserverEntry {
    callback: ObserverCallback,
    targets: Vec<(NodeId, MutationObserverInit)>,
    queue: Vec<MutationRecord>,
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    entries: BTreeMap<ObserverId, ObserverEntry>,
    next_id: u64,
}

impl ObserverRegistry {
    pub(crate) fn forget_target(&mut self, node: NodeId) {
        for entry in self.entries.values_mut() {
            entry.targets.retain(|(target, _)| *target != node);
        }
    }
}

impl Document {
    /// Register a new observer; it observes nothing until [`Document::observe`].
    pub fn create_mutation_observer<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&[MutationRecord], &mut Document) + 'static,
    {
        self.observers.next_id += 1;
        let id = ObserverId(self.observers.next_id);
        self.observers.entries.insert(
            id,
            ObserverEntry {
                callback: Rc::new(RefCell::new(callback)),
                targets: Vec::new(),
                queue: Vec::new(),
            },
        );
        id
    }

    /// Observe `target`. Observing the same target again replaces its
    /// options. Returns `false` for an unknown observer.
    pub fn observe(&mut self, observer: ObserverId, target: NodeKey, options: MutationObserverInit) -> Result<bool, TreeError> {
        let node = self.resolve(target)?;
        let Some(entry) = self.observers.entries.get_mut(&observer) else {
            return Ok(false);
        };
        if let Some(existing) = entry.targets.iter_mut().find(|(observed, _)| *observed == node) {
            existing.1 = options;
        } else {
            entry.targets.push((node, options));
        }
        Ok(true)
    }

    /// Stop observing everything and discard queued records. The observer
    /// can observe again afterwards.
    pub fn disconnect(&mut self, observer: ObserverId) {
        if let Some(entry) = self.observers.entries.get_mut(&observer) {
            entry.targets.clear();
            entry.queue.clear();
        }
    }

    /// Drop the observer entirely.
    pub fn release_observer(&mut self, observer: ObserverId) {
        self.observers.entries.remove(&observer);
    }

    /// Drain queued records synchronously.
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .entries
            .get_mut(&observer)
            .map(|entry| core::mem::take(&mut entry.queue))
            .unwrap_or_default()
    }

    /// Whether any observer has records waiting.
    pub fn has_pending_records(&self) -> bool {
        self.observers.entries.values().any(|entry| !entry.queue.is_empty())
    }

    /// Append a record to every observer interested in a mutation of `node`.
    pub(crate) fn queue_mutation(&mut self, node: NodeId, record: MutationRecord) {
        if self.observers.entries.is_empty() {
            return;
        }
        let chain: Vec<NodeId> = node.ancestors(&self.arena).collect();
        for entry in self.observers.entries.values_mut() {
            let registration = entry.targets.iter().find(|(observed, options)| {
                chain
                    .iter()
                    .position(|ancestor| ancestor == observed)
                    .is_some_and(|depth| (depth == 0 || options.subtree) && options.wants(&record))
            });
            if let Some((_, options)) = registration {
                let mut queued = record.clone();
                if !options.keeps_old_value(record.kind) {
                    queued.old_value = None;
                }
                entry.queue.push(queued);
            }
        }
    }

    /// Run the callback of every observer with queued records, once each, in
    /// observer creation order. An observer whose callback is already running
    /// keeps its records for the next delivery.
    pub fn deliver_mutation_records(&mut self) -> usize {
        let ready: Vec<ObserverId> = self
            .observers
            .entries
            .iter()
            .filter(|(_, entry)| !entry.queue.is_empty())
            .map(|(id, _)| *id)
            .collect();
        let mut delivered = 0;
        for id in ready {
            let Some(entry) = self.observers.entries.get_mut(&id) else {
                continue;
            };
            let shared = Rc::clone(&entry.callback);
            let Ok(mut callback) = shared.try_borrow_mut() else {
                trace!("observer {} is already delivering; records kept", id.0);
                continue;
            };
            let records = core::mem::take(&mut entry.queue);
            if records.is_empty() {
                continue;
            }
            trace!("delivering {} records to observer {}", records.len(), id.0);
            (&mut *callback)(&records, self);
            delivered += 1;
        }
        delivered
    }
}
