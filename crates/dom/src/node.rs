use crate::document::Document;
use crate::events::SyntheticEvent;
use crate::style::Style;
use bridge::{NodeKey, WireValue};
use core::fmt;
use smallvec::SmallVec;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Signature of an event handler. Failures are reported, never propagated
/// into the dispatch walk.
pub type HandlerFn = dyn Fn(&mut SyntheticEvent, &mut Document) -> anyhow::Result<()>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct HandlerId(pub u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// A shareable event handler with a stable identity. The identity is what the
/// host sees for callback attributes and what listener de-duplication uses.
#[derive(Clone)]
pub struct EventHandler {
    id: HandlerId,
    func: Rc<HandlerFn>,
}

impl EventHandler {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut SyntheticEvent, &mut Document) -> anyhow::Result<()> + 'static,
    {
        Self {
            id: HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)),
            func: Rc::new(func),
        }
    }

    #[inline]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    pub(crate) fn call(&self, event: &mut SyntheticEvent, document: &mut Document) -> anyhow::Result<()> {
        (self.func)(event, document)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "EventHandler({})", self.id.0)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Attribute payload: a string, or a callback the host binds natively.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Text(String),
    Callback(EventHandler),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Callback(_) => None,
        }
    }

    pub fn to_wire(&self) -> WireValue {
        match self {
            Self::Text(text) => WireValue::Text(text.clone()),
            Self::Callback(handler) => WireValue::Callback {
                callback: handler.id().0,
            },
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<EventHandler> for AttrValue {
    fn from(value: EventHandler) -> Self {
        Self::Callback(value)
    }
}

/// Element payload. Built by the registered element factory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: SmallVec<(String, AttrValue), 4>,
    pub style: Style,
    /// Form controls mirror the value the host reports through input events.
    pub form: bool,
    pub svg: bool,
}

impl ElementData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attr(&mut self, name: &str, value: AttrValue) -> Option<AttrValue> {
        if let Some(slot) = self.attrs.iter_mut().find(|(existing, _)| existing == name) {
            return Some(core::mem::replace(&mut slot.1, value));
        }
        self.attrs.push((name.to_owned(), value));
        None
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<AttrValue> {
        let position = self.attrs.iter().position(|(existing, _)| existing == name)?;
        Some(self.attrs.remove(position).1)
    }

    /// Inline handler registered through an `on<type>` callback attribute.
    pub fn inline_handler(&self, event_type: &str) -> Option<&EventHandler> {
        self.attrs.iter().find_map(|(name, value)| match value {
            AttrValue::Callback(handler)
                if name
                    .strip_prefix("on")
                    .is_some_and(|suffix| suffix.eq_ignore_ascii_case(event_type)) =>
            {
                Some(handler)
            }
            AttrValue::Callback(_) | AttrValue::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum NodeKind {
    #[default]
    Root,
    Element(ElementData),
    Text {
        text: String,
    },
}

impl NodeKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Root => "the root",
            Self::Element(_) => "an element",
            Self::Text { .. } => "a text node",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DOMNode {
    pub key: NodeKey,
    pub kind: NodeKind,
}

impl DOMNode {
    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Root | NodeKind::Text { .. } => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Root | NodeKind::Text { .. } => None,
        }
    }
}
