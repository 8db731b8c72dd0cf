//! Tree, attribute, text and style mutations.
//!
//! Each mutation of a connected node records its patch immediately; nothing
//! is diffed at flush time. Mutations of detached subtrees only change local
//! state and reach the host through the snapshot of the insert that connects
//! them.

use super::Document;
use crate::capabilities::ON_REMOVE_ATTRIBUTE;
use crate::error::TreeError;
use crate::node::{AttrValue, NodeKind};
use crate::observer::{MutationKind, MutationRecord};
use crate::patch::Slot;
use crate::style::Style;
use bridge::{NodeKey, Patch, PatchBatch, PatchOp};
use indextree::NodeId;
use log::debug;
use tracing::info_span;

/// Siblings around a position, captured for mutation records.
type Neighbours = (Option<NodeKey>, Option<NodeKey>);

impl Document {
    fn neighbours(&self, id: NodeId) -> Neighbours {
        let node = &self.arena[id];
        (
            node.previous_sibling().map(|sibling| self.key_of(sibling)),
            node.next_sibling().map(|sibling| self.key_of(sibling)),
        )
    }

    fn ensure_insertable(&self, parent: NodeKey, parent_id: NodeId, child: NodeKey, child_id: NodeId) -> Result<(), TreeError> {
        if matches!(self.node(parent_id).kind, NodeKind::Text { .. }) {
            return Err(TreeError::HierarchyRequest {
                parent,
                child,
                reason: "text nodes cannot have children",
            });
        }
        if child_id == self.root {
            return Err(TreeError::HierarchyRequest {
                parent,
                child,
                reason: "the root cannot be inserted",
            });
        }
        if parent_id.ancestors(&self.arena).any(|ancestor| ancestor == child_id) {
            return Err(TreeError::Cycle { parent, child });
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), TreeError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference`, or last when
    /// `reference` is `None`. A child that already has a parent is moved.
    pub fn insert_before(&mut self, parent: NodeKey, child: NodeKey, reference: Option<NodeKey>) -> Result<(), TreeError> {
        let parent_id = self.resolve(parent)?;
        let child_id = self.resolve(child)?;
        self.ensure_insertable(parent, parent_id, child, child_id)?;
        let mut anchor = match reference {
            Some(reference_key) => {
                let reference_id = self.resolve(reference_key)?;
                if self.parent_id(reference_id) != Some(parent_id) {
                    return Err(TreeError::NotAChild {
                        parent,
                        child: reference_key,
                    });
                }
                Some(reference_id)
            }
            None => None,
        };
        if anchor == Some(child_id) {
            anchor = self.arena[child_id].next_sibling();
        }

        let old_parent = self.parent_id(child_id);
        let was_connected = self.is_connected_id(child_id);
        let old_index = old_parent.map(|_| self.index_in_parent(child_id));
        let old_neighbours = old_parent.map(|_| self.neighbours(child_id));

        let linked = match anchor {
            Some(anchor_id) => anchor_id.checked_insert_before(child_id, &mut self.arena),
            None => parent_id.checked_append(child_id, &mut self.arena),
        };
        linked.map_err(|_| TreeError::HierarchyRequest {
            parent,
            child,
            reason: "arena refused the link",
        })?;

        let index = self.index_in_parent(child_id);
        let departure = old_parent.zip(old_index).map(|(old, from)| (self.key_of(old), from));
        match departure.filter(|_| was_connected) {
            Some((old_key, from)) if self.is_connected_id(parent_id) => {
                if old_key != parent {
                    self.recorder.record_move(child, parent, index, (old_key, from));
                } else if from != index {
                    self.recorder.record_reorder(child, parent, from, index);
                }
            }
            Some((old_key, from)) => self.recorder.record_remove(child, old_key, from),
            None if self.is_connected_id(parent_id) => {
                let snapshot = self.snapshot_id(child_id);
                self.recorder.record_insert(child, parent, index, snapshot);
            }
            None => {}
        }

        if let (Some(old), Some((previous, next))) = (old_parent, old_neighbours) {
            self.queue_mutation(
                old,
                MutationRecord::child_list(self.key_of(old), Vec::new(), vec![child], previous, next),
            );
        }
        let (previous, next) = self.neighbours(child_id);
        self.queue_mutation(
            parent_id,
            MutationRecord::child_list(parent, vec![child], Vec::new(), previous, next),
        );
        Ok(())
    }

    /// Detach `child` from `parent`. The node stays alive, detached, until it
    /// is reinserted or destroyed.
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<NodeKey, TreeError> {
        let parent_id = self.resolve(parent)?;
        let child_id = self.resolve(child)?;
        if self.parent_id(child_id) != Some(parent_id) {
            return Err(TreeError::NotAChild { parent, child });
        }
        let was_connected = self.is_connected_id(child_id);
        let (previous, next) = self.neighbours(child_id);
        let index = self.index_in_parent(child_id);
        child_id.detach(&mut self.arena);
        if was_connected {
            self.recorder.record_remove(child, parent, index);
        }
        self.queue_mutation(
            parent_id,
            MutationRecord::child_list(parent, Vec::new(), vec![child], previous, next),
        );
        Ok(child)
    }

    /// Put `new_child` where `old_child` is, returning `old_child`. Recorded
    /// as an insert before the old child followed by its removal.
    pub fn replace_child(&mut self, parent: NodeKey, new_child: NodeKey, old_child: NodeKey) -> Result<NodeKey, TreeError> {
        let parent_id = self.resolve(parent)?;
        let old_id = self.resolve(old_child)?;
        if self.parent_id(old_id) != Some(parent_id) {
            return Err(TreeError::NotAChild {
                parent,
                child: old_child,
            });
        }
        if new_child == old_child {
            return Ok(old_child);
        }
        self.insert_before(parent, new_child, Some(old_child))?;
        self.remove_child(parent, old_child)
    }

    /// Set an attribute. A string `style` attribute replaces the inline style.
    pub fn set_attribute(&mut self, key: NodeKey, name: &str, value: impl Into<AttrValue>) -> Result<(), TreeError> {
        let value = value.into();
        if name == "style" {
            if let AttrValue::Text(css) = &value {
                return self.set_style_text(key, css);
            }
        }
        let id = self.resolve(key)?;
        let data = self.node_mut(id).element_mut().ok_or(TreeError::WrongKind {
            key,
            expected: "an element",
        })?;
        let old = data.set_attr(name, value.clone());
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        if self.is_connected_id(id) {
            self.recorder.record_write(
                key,
                Slot::Attribute(name.to_owned()),
                PatchOp::SetAttribute {
                    attr_name: name.to_owned(),
                    value: value.to_wire(),
                },
            );
        }
        let old_text = old.as_ref().and_then(AttrValue::as_text).map(str::to_owned);
        self.queue_mutation(id, MutationRecord::attribute(key, name, old_text));
        Ok(())
    }

    /// Remove an attribute. Registered removal hooks may claim the removal,
    /// in which case the attribute stays and nothing is recorded.
    pub fn remove_attribute(&mut self, key: NodeKey, name: &str) -> Result<(), TreeError> {
        if name == "style" {
            return self.set_style_text(key, "");
        }
        let id = self.resolve(key)?;
        let data = self.element_data(key)?;
        if data.attr(name).is_none() {
            return Ok(());
        }
        let tag = data.tag.clone();
        let hooks = self.registry.try_resolve_all(&ON_REMOVE_ATTRIBUTE);
        if hooks.iter().any(|hook| hook.on_remove_attribute(key, &tag, name)) {
            debug!("removal of `{name}` on {key} claimed by a hook");
            return Ok(());
        }
        let old = self.node_mut(id).element_mut().and_then(|element| element.remove_attr(name));
        if self.is_connected_id(id) {
            self.recorder.record_write(
                key,
                Slot::Attribute(name.to_owned()),
                PatchOp::RemoveAttribute {
                    attr_name: name.to_owned(),
                },
            );
        }
        let old_text = old.as_ref().and_then(AttrValue::as_text).map(str::to_owned);
        self.queue_mutation(id, MutationRecord::attribute(key, name, old_text));
        Ok(())
    }

    /// Replace the character data of a text node.
    pub fn set_text(&mut self, key: NodeKey, value: &str) -> Result<(), TreeError> {
        let id = self.resolve(key)?;
        let NodeKind::Text { text } = &mut self.node_mut(id).kind else {
            return Err(TreeError::WrongKind {
                key,
                expected: "a text node",
            });
        };
        if text == value {
            return Ok(());
        }
        let old = core::mem::replace(text, value.to_owned());
        if self.is_connected_id(id) {
            self.recorder.record_write(
                key,
                Slot::Text,
                PatchOp::SetText {
                    value: value.to_owned(),
                },
            );
        }
        self.queue_mutation(
            id,
            MutationRecord {
                old_value: Some(old),
                ..MutationRecord::new(MutationKind::CharacterData, key)
            },
        );
        Ok(())
    }

    /// On a text node, set its data. On an element or the root, replace
    /// every child with a single text node (none for an empty string).
    pub fn set_text_content(&mut self, key: NodeKey, text: &str) -> Result<(), TreeError> {
        let id = self.resolve(key)?;
        if matches!(self.node(id).kind, NodeKind::Text { .. }) {
            return self.set_text(key, text);
        }
        for child in self.children(key)? {
            self.remove_child(key, child)?;
        }
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(key, text_node)?;
        }
        Ok(())
    }

    fn update_style(&mut self, key: NodeKey, edit: impl FnOnce(&mut Style)) -> Result<(), TreeError> {
        let id = self.resolve(key)?;
        let data = self.node_mut(id).element_mut().ok_or(TreeError::WrongKind {
            key,
            expected: "an element",
        })?;
        let before = data.style.clone();
        edit(&mut data.style);
        let after = data.style.clone();
        if after == before {
            return Ok(());
        }
        let serialized = self.style_engine.serialize(&after);
        if self.is_connected_id(id) {
            self.recorder
                .record_write(key, Slot::Style, PatchOp::SetStyle { value: serialized });
        }
        let old_css = (!before.is_empty()).then(|| before.css_text());
        self.queue_mutation(id, MutationRecord::attribute(key, "style", old_css));
        Ok(())
    }

    pub fn set_style_property(&mut self, key: NodeKey, name: &str, value: &str) -> Result<(), TreeError> {
        self.update_style(key, |style| {
            style.set_property(name, value);
        })
    }

    pub fn remove_style_property(&mut self, key: NodeKey, name: &str) -> Result<(), TreeError> {
        self.update_style(key, |style| {
            style.remove_property(name);
        })
    }

    /// Replace the whole inline style from css text.
    pub fn set_style_text(&mut self, key: NodeKey, css_text: &str) -> Result<(), TreeError> {
        self.update_style(key, |style| style.set_css_text(css_text))
    }

    /// Hand out every pending operation as one batch and start a new
    /// generation. `None` when nothing is pending.
    pub fn flush(&mut self) -> Option<PatchBatch> {
        let _span = info_span!("document.flush").entered();
        if self.recorder.is_empty() {
            return None;
        }
        let ops = self.recorder.drain();
        self.generation += 1;
        debug!("flushed {} patches at generation {}", ops.len(), self.generation);
        Some(PatchBatch {
            root_id: self.root(),
            generation: self.generation,
            reset: false,
            ops,
        })
    }

    /// Rebuild the host tree from current state: a reset batch inserting a
    /// full snapshot of every root child. Supersedes anything pending.
    pub fn full_snapshot_batch(&mut self) -> PatchBatch {
        let _span = info_span!("document.resync").entered();
        let superseded = self.recorder.discard();
        self.generation += 1;
        let root = self.root();
        let children: Vec<NodeId> = self.root.children(&self.arena).collect();
        let mut ops = Vec::with_capacity(children.len());
        for (index, child) in children.into_iter().enumerate() {
            let target = self.key_of(child);
            ops.push(Patch {
                target_id: target,
                seq: self.recorder.stamp(target),
                op: PatchOp::Insert {
                    parent_id: root,
                    index,
                    node: Some(self.snapshot_id(child)),
                },
            });
        }
        debug!(
            "resync batch with {} top-level nodes at generation {} ({superseded} pending superseded)",
            ops.len(),
            self.generation
        );
        PatchBatch {
            root_id: root,
            generation: self.generation,
            reset: true,
            ops,
        }
    }

    /// Pending operations, in emission order.
    pub fn pending(&self) -> impl Iterator<Item = &Patch> {
        self.recorder.pending()
    }
}
