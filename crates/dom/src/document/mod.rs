use crate::capabilities::{ELEMENT_FACTORY, ElementFactory, STYLE_ENGINE, StyleEngine};
use crate::error::TreeError;
use crate::events::ListenerMap;
use crate::node::{AttrValue, DOMNode, ElementData, NodeKind};
use crate::observer::ObserverRegistry;
use crate::patch::{PatchCounters, PatchRecorder};
use crate::style::Style;
use bridge::{ConsoleLogger, HostLogger, KeySpace, NodeKey, NodeKeyManager};
use container::{CapabilityMissingError, Registry};
use indextree::{Arena, NodeId};
use log::debug;
use std::sync::Arc;
use std::time::Instant;

mod mutation;
mod printing;

/// Construction options of a [`Document`].
#[derive(Clone)]
pub struct DocumentOptions {
    /// Fold repeated writes to the same node slot into one pending operation.
    pub coalesce: bool,
    /// Sink for handler failures and other diagnostics.
    pub logger: Arc<dyn HostLogger>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            coalesce: true,
            logger: Arc::new(ConsoleLogger),
        }
    }
}

/// One virtual document: the node arena, its identity table, the pending patch
/// list and the listener/observer registries hanging off it.
pub struct Document {
    pub(crate) arena: Arena<DOMNode>,
    pub(crate) root: NodeId,
    pub(crate) keys: NodeKeyManager<NodeId>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) element_factory: Arc<dyn ElementFactory>,
    pub(crate) style_engine: Arc<dyn StyleEngine>,
    pub(crate) logger: Arc<dyn HostLogger>,
    pub(crate) recorder: PatchRecorder,
    pub(crate) listeners: ListenerMap,
    pub(crate) observers: ObserverRegistry,
    pub(crate) generation: u64,
    pub(crate) live: usize,
    pub(crate) time_origin: Instant,
}

impl Document {
    /// A document backed by the built-in capability defaults.
    pub fn new() -> Self {
        let registry = crate::capabilities::default_registry();
        let element_factory: Arc<dyn ElementFactory> = Arc::new(crate::capabilities::DefaultElementFactory);
        let style_engine: Arc<dyn StyleEngine> = Arc::new(crate::capabilities::CssTextStyleEngine);
        Self::assemble(
            registry,
            element_factory,
            style_engine,
            DocumentOptions::default(),
            KeySpace::register_shared(),
        )
    }

    /// A document whose element factory and style engine are resolved from
    /// `registry`.
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self, CapabilityMissingError> {
        Self::with_options(registry, DocumentOptions::default())
    }

    pub fn with_options(registry: Arc<Registry>, options: DocumentOptions) -> Result<Self, CapabilityMissingError> {
        Self::with_key_manager(registry, options, KeySpace::register_shared())
    }

    /// Like [`Document::with_options`] with an explicit key shard.
    pub fn with_key_manager(
        registry: Arc<Registry>,
        options: DocumentOptions,
        keys: NodeKeyManager<NodeId>,
    ) -> Result<Self, CapabilityMissingError> {
        let element_factory = registry.resolve(&ELEMENT_FACTORY)?;
        let style_engine = registry.resolve(&STYLE_ENGINE)?;
        Ok(Self::assemble(registry, element_factory, style_engine, options, keys))
    }

    fn assemble(
        registry: Arc<Registry>,
        element_factory: Arc<dyn ElementFactory>,
        style_engine: Arc<dyn StyleEngine>,
        options: DocumentOptions,
        mut keys: NodeKeyManager<NodeId>,
    ) -> Self {
        let mut arena = Arena::new();
        let root_key = keys.root_key();
        let root = arena.new_node(DOMNode {
            key: root_key,
            kind: NodeKind::Root,
        });
        keys.seed(root, root_key);
        debug!("document created with root {root_key}");
        Self {
            arena,
            root,
            keys,
            registry,
            element_factory,
            style_engine,
            logger: options.logger,
            recorder: PatchRecorder::new(options.coalesce),
            listeners: ListenerMap::default(),
            observers: ObserverRegistry::default(),
            generation: 0,
            live: 1,
            time_origin: Instant::now(),
        }
    }

    /// Key of the document root.
    #[inline]
    pub fn root(&self) -> NodeKey {
        self.keys.root_key()
    }

    /// Generation counter; advanced by every flush that produced a batch.
    #[inline]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live nodes, root included.
    #[inline]
    pub const fn node_count(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[inline]
    pub fn logger(&self) -> &Arc<dyn HostLogger> {
        &self.logger
    }

    /// Number of operations waiting for the next flush.
    #[inline]
    pub fn pending_patches(&self) -> usize {
        self.recorder.len()
    }

    #[inline]
    pub const fn patch_counters(&self) -> PatchCounters {
        self.recorder.counters()
    }

    pub fn set_coalescing(&mut self, coalesce: bool) {
        self.recorder.set_coalesce(coalesce);
    }

    // ---------------------------------
    // Identity resolution
    // ---------------------------------

    pub(crate) fn resolve(&self, key: NodeKey) -> Result<NodeId, TreeError> {
        self.keys
            .local_of(key)
            .filter(|id| !id.is_removed(&self.arena))
            .ok_or(TreeError::UnknownNode(key))
    }

    // Ids handed out by `resolve` and arena traversal are always live.
    pub(crate) fn node(&self, id: NodeId) -> &DOMNode {
        self.arena[id].get()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut DOMNode {
        self.arena[id].get_mut()
    }

    pub(crate) fn key_of(&self, id: NodeId) -> NodeKey {
        self.node(id).key
    }

    pub(crate) fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(indextree::Node::parent)
    }

    pub(crate) fn is_connected_id(&self, id: NodeId) -> bool {
        id.ancestors(&self.arena).any(|ancestor| ancestor == self.root)
    }

    /// Position of `child` within its parent's child list.
    pub(crate) fn index_in_parent(&self, child: NodeId) -> usize {
        child.preceding_siblings(&self.arena).count().saturating_sub(1)
    }

    /// Resolve an element key and hand out its payload.
    pub(crate) fn element_data(&self, key: NodeKey) -> Result<&ElementData, TreeError> {
        let id = self.resolve(key)?;
        self.node(id).element().ok_or(TreeError::WrongKind {
            key,
            expected: "an element",
        })
    }

    // ---------------------------------
    // Node construction
    // ---------------------------------

    fn adopt(&mut self, kind: NodeKind) -> NodeKey {
        let id = self.arena.new_node(DOMNode {
            key: NodeKey(0),
            kind,
        });
        let key = self.keys.key_of(id);
        self.node_mut(id).key = key;
        self.live += 1;
        key
    }

    /// Create a detached element through the registered element factory.
    pub fn create_element(&mut self, tag: &str) -> NodeKey {
        let data = self.element_factory.create_element(tag);
        self.adopt(NodeKind::Element(data))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeKey {
        self.adopt(NodeKind::Text {
            text: text.to_owned(),
        })
    }

    /// Copy a node, detached. Listeners are not copied; callback attributes
    /// keep pointing at the same handlers.
    pub fn clone_node(&mut self, key: NodeKey, deep: bool) -> Result<NodeKey, TreeError> {
        let id = self.resolve(key)?;
        if id == self.root {
            return Err(TreeError::WrongKind {
                key,
                expected: "a non-root node",
            });
        }
        self.clone_id(id, deep)
    }

    fn clone_id(&mut self, id: NodeId, deep: bool) -> Result<NodeKey, TreeError> {
        let kind = self.node(id).kind.clone();
        let copy = self.adopt(kind);
        if deep {
            let copy_id = self.resolve(copy)?;
            let children: Vec<NodeId> = id.children(&self.arena).collect();
            for child in children {
                let child_copy = self.clone_id(child, true)?;
                let child_id = self.resolve(child_copy)?;
                copy_id
                    .checked_append(child_id, &mut self.arena)
                    .map_err(|_| TreeError::HierarchyRequest {
                        parent: copy,
                        child: child_copy,
                        reason: "arena refused the link",
                    })?;
            }
        }
        Ok(copy)
    }

    /// Reclaim a detached subtree. Its keys stop resolving.
    pub fn destroy(&mut self, key: NodeKey) -> Result<usize, TreeError> {
        let id = self.resolve(key)?;
        if id == self.root || self.parent_id(id).is_some() {
            return Err(TreeError::StillAttached(key));
        }
        let doomed: Vec<NodeId> = id.descendants(&self.arena).collect();
        for node in &doomed {
            let node_key = self.key_of(*node);
            self.keys.forget(*node);
            self.recorder.forget(node_key);
            self.listeners.forget(*node);
            self.observers.forget_target(*node);
        }
        id.remove_subtree(&mut self.arena);
        self.live = self.live.saturating_sub(doomed.len());
        debug!("destroyed {} nodes under {key}", doomed.len());
        Ok(doomed.len())
    }

    // ---------------------------------
    // Queries
    // ---------------------------------

    pub fn parent(&self, key: NodeKey) -> Result<Option<NodeKey>, TreeError> {
        let id = self.resolve(key)?;
        Ok(self.parent_id(id).map(|parent| self.key_of(parent)))
    }

    pub fn children(&self, key: NodeKey) -> Result<Vec<NodeKey>, TreeError> {
        let id = self.resolve(key)?;
        Ok(id.children(&self.arena).map(|child| self.key_of(child)).collect())
    }

    pub fn first_child(&self, key: NodeKey) -> Result<Option<NodeKey>, TreeError> {
        let id = self.resolve(key)?;
        Ok(id.children(&self.arena).next().map(|child| self.key_of(child)))
    }

    pub fn next_sibling(&self, key: NodeKey) -> Result<Option<NodeKey>, TreeError> {
        let id = self.resolve(key)?;
        Ok(self
            .arena
            .get(id)
            .and_then(indextree::Node::next_sibling)
            .map(|sibling| self.key_of(sibling)))
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Result<Option<NodeKey>, TreeError> {
        let id = self.resolve(key)?;
        Ok(self
            .arena
            .get(id)
            .and_then(indextree::Node::previous_sibling)
            .map(|sibling| self.key_of(sibling)))
    }

    /// Whether the node is reachable from the root.
    pub fn is_connected(&self, key: NodeKey) -> Result<bool, TreeError> {
        Ok(self.is_connected_id(self.resolve(key)?))
    }

    /// Whether `other` is `key` or one of its descendants.
    pub fn contains(&self, key: NodeKey, other: NodeKey) -> Result<bool, TreeError> {
        let id = self.resolve(key)?;
        let other_id = self.resolve(other)?;
        Ok(other_id.ancestors(&self.arena).any(|ancestor| ancestor == id))
    }

    pub fn kind(&self, key: NodeKey) -> Result<&NodeKind, TreeError> {
        Ok(&self.node(self.resolve(key)?).kind)
    }

    /// Tag of an element, `None` for root and text nodes.
    pub fn tag_name(&self, key: NodeKey) -> Result<Option<&str>, TreeError> {
        let id = self.resolve(key)?;
        Ok(self.node(id).element().map(|data| data.tag.as_str()))
    }

    /// Whether the element factory classified the node as an SVG element.
    pub fn is_svg(&self, key: NodeKey) -> Result<bool, TreeError> {
        let id = self.resolve(key)?;
        Ok(self.node(id).element().is_some_and(|data| data.svg))
    }

    /// String value of an attribute. Callback attributes read as `None`.
    pub fn get_attribute(&self, key: NodeKey, name: &str) -> Result<Option<&str>, TreeError> {
        Ok(self.element_data(key)?.attr(name).and_then(AttrValue::as_text))
    }

    pub fn attribute_value(&self, key: NodeKey, name: &str) -> Result<Option<&AttrValue>, TreeError> {
        Ok(self.element_data(key)?.attr(name))
    }

    pub fn has_attribute(&self, key: NodeKey, name: &str) -> Result<bool, TreeError> {
        Ok(self.element_data(key)?.attr(name).is_some())
    }

    pub fn style(&self, key: NodeKey) -> Result<&Style, TreeError> {
        Ok(&self.element_data(key)?.style)
    }

    /// Character data of a text node.
    pub fn text(&self, key: NodeKey) -> Result<&str, TreeError> {
        let id = self.resolve(key)?;
        match &self.node(id).kind {
            NodeKind::Text { text } => Ok(text),
            NodeKind::Root | NodeKind::Element(_) => Err(TreeError::WrongKind {
                key,
                expected: "a text node",
            }),
        }
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, key: NodeKey) -> Result<String, TreeError> {
        let id = self.resolve(key)?;
        let mut out = String::new();
        for node in id.descendants(&self.arena) {
            if let NodeKind::Text { text } = &self.node(node).kind {
                out.push_str(text);
            }
        }
        Ok(out)
    }

    /// First connected element, in tree order, whose `id` attribute matches.
    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeKey> {
        self.root
            .descendants(&self.arena)
            .find(|id| {
                self.node(*id)
                    .element()
                    .and_then(|data| data.attr("id"))
                    .and_then(AttrValue::as_text)
                    == Some(element_id)
            })
            .map(|id| self.key_of(id))
    }

    /// Milliseconds since the document was created; the event timestamp base.
    pub fn now(&self) -> f64 {
        self.time_origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
