//! Host-side mirror of a document, rebuilt purely from patch batches.
//!
//! The mirror is strict: a patch that names a node the host never saw, an
//! index past the end of a child list, or a parent that does not hold the
//! target is an error rather than something to paper over. Adapters use it as
//! the consistency oracle for their native tree.

use crate::patch::{NodeSnapshot, Patch, PatchOp, SnapshotKind, WireValue};
use crate::{NodeKey, PatchSubscriber};
use anyhow::{Result, anyhow, bail};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug)]
struct HostNode {
    kind: SnapshotKind,
    tag: Option<String>,
    attrs: BTreeMap<String, WireValue>,
    style: Option<String>,
    text: Option<String>,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl HostNode {
    fn empty(kind: SnapshotKind) -> Self {
        Self {
            kind,
            tag: None,
            attrs: BTreeMap::new(),
            style: None,
            text: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// The render host's view of one document.
#[derive(Clone, Debug)]
pub struct HostTree {
    root: NodeKey,
    nodes: HashMap<NodeKey, HostNode>,
    applied: u64,
}

impl HostTree {
    /// Create a mirror holding only the document root.
    pub fn new(root: NodeKey) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root, HostNode::empty(SnapshotKind::Root));
        Self {
            root,
            nodes,
            applied: 0,
        }
    }

    #[inline]
    pub const fn root(&self) -> NodeKey {
        self.root
    }

    /// Number of nodes the host currently materializes, root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Whether the host materializes the given key.
    #[inline]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Number of patches applied so far.
    #[inline]
    pub const fn applied(&self) -> u64 {
        self.applied
    }

    /// Children of a node in host order.
    pub fn children(&self, key: NodeKey) -> Option<&[NodeKey]> {
        self.nodes.get(&key).map(|node| node.children.as_slice())
    }

    /// Plain attribute value of a node.
    pub fn attribute(&self, key: NodeKey, name: &str) -> Option<&WireValue> {
        self.nodes.get(&key)?.attrs.get(name)
    }

    /// Character data of a text node.
    pub fn text(&self, key: NodeKey) -> Option<&str> {
        self.nodes.get(&key)?.text.as_deref()
    }

    /// Serialized style of an element.
    pub fn style(&self, key: NodeKey) -> Option<&str> {
        self.nodes.get(&key)?.style.as_deref()
    }

    /// Snapshot of the whole mirrored tree.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot_of(self.root)
    }

    fn snapshot_of(&self, key: NodeKey) -> NodeSnapshot {
        let Some(node) = self.nodes.get(&key) else {
            return NodeSnapshot {
                id: key,
                kind: SnapshotKind::Text,
                tag: None,
                attrs: BTreeMap::new(),
                style: None,
                text: None,
                children: Vec::new(),
            };
        };
        NodeSnapshot {
            id: key,
            kind: node.kind,
            tag: node.tag.clone(),
            attrs: node.attrs.clone(),
            style: node.style.clone(),
            text: node.text.clone(),
            children: node
                .children
                .iter()
                .map(|child| self.snapshot_of(*child))
                .collect(),
        }
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut HostNode> {
        self.nodes
            .get_mut(&key)
            .ok_or_else(|| anyhow!("host has no node {key}"))
    }

    fn is_ancestor_or_self(&self, ancestor: NodeKey, mut node: NodeKey) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(&node).and_then(|entry| entry.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Materialize a snapshot subtree; the caller links its top node.
    fn materialize(&mut self, snapshot: &NodeSnapshot, parent: Option<NodeKey>) -> Result<()> {
        if self.nodes.contains_key(&snapshot.id) {
            bail!("host already holds node {}", snapshot.id);
        }
        let mut node = HostNode::empty(snapshot.kind);
        node.tag.clone_from(&snapshot.tag);
        node.attrs.clone_from(&snapshot.attrs);
        node.style.clone_from(&snapshot.style);
        node.text.clone_from(&snapshot.text);
        node.parent = parent;
        node.children = snapshot.children.iter().map(|child| child.id).collect();
        self.nodes.insert(snapshot.id, node);
        for child in &snapshot.children {
            self.materialize(child, Some(snapshot.id))?;
        }
        Ok(())
    }

    fn drop_subtree(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.remove(&key) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }

    fn unlink(&mut self, key: NodeKey, expected_parent: Option<NodeKey>) -> Result<usize> {
        let parent = self
            .nodes
            .get(&key)
            .ok_or_else(|| anyhow!("host has no node {key}"))?
            .parent
            .ok_or_else(|| anyhow!("node {key} is not attached on the host"))?;
        if let Some(expected) = expected_parent {
            if expected != parent {
                bail!("node {key} is a child of {parent}, not {expected}");
            }
        }
        let siblings = &mut self.node_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|child| *child == key)
            .ok_or_else(|| anyhow!("parent {parent} does not list child {key}"))?;
        siblings.remove(position);
        self.node_mut(key)?.parent = None;
        Ok(position)
    }

    fn link(&mut self, key: NodeKey, parent: NodeKey, index: usize) -> Result<()> {
        let siblings = &mut self.node_mut(parent)?.children;
        if index > siblings.len() {
            bail!(
                "insert index {index} out of range for parent {parent} with {} children",
                siblings.len()
            );
        }
        siblings.insert(index, key);
        self.node_mut(key)?.parent = Some(parent);
        Ok(())
    }
}

impl PatchSubscriber for HostTree {
    fn apply_patch(&mut self, patch: &Patch) -> Result<()> {
        let target = patch.target_id;
        match &patch.op {
            PatchOp::Insert {
                parent_id,
                index,
                node,
            } => {
                if !self.nodes.contains_key(parent_id) {
                    bail!("insert into unknown parent {parent_id}");
                }
                match node {
                    Some(snapshot) => {
                        if snapshot.id != target {
                            bail!("snapshot {} does not match insert target {target}", snapshot.id);
                        }
                        self.materialize(snapshot, None)?;
                    }
                    None => {
                        if self.is_ancestor_or_self(target, *parent_id) {
                            bail!("moving {target} under {parent_id} would create a cycle");
                        }
                        self.unlink(target, None)?;
                    }
                }
                self.link(target, *parent_id, *index)?;
            }
            PatchOp::Remove { parent_id } => {
                self.unlink(target, Some(*parent_id))?;
                self.drop_subtree(target);
            }
            PatchOp::Reorder { parent_id, index } => {
                self.unlink(target, Some(*parent_id))?;
                self.link(target, *parent_id, *index)?;
            }
            PatchOp::SetAttribute { attr_name, value } => {
                self.node_mut(target)?
                    .attrs
                    .insert(attr_name.clone(), value.clone());
            }
            PatchOp::RemoveAttribute { attr_name } => {
                self.node_mut(target)?.attrs.remove(attr_name);
            }
            PatchOp::SetText { value } => {
                let node = self.node_mut(target)?;
                if node.kind != SnapshotKind::Text {
                    bail!("setText on non-text node {target}");
                }
                node.text = Some(value.clone());
            }
            PatchOp::SetStyle { value } => {
                self.node_mut(target)?.style = Some(value.clone());
            }
        }
        self.applied += 1;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let children = self
            .nodes
            .get_mut(&self.root)
            .map(|root| core::mem::take(&mut root.children))
            .unwrap_or_default();
        for child in children {
            self.drop_subtree(child);
        }
        Ok(())
    }
}
