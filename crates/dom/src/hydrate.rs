//! Building from templates and hydrating existing subtrees.
//!
//! Hydration walks the existing children of a parent and the expanded
//! template list in lockstep. A position whose kind and tag agree is reused:
//! only values that differ are written, so hydrating a tree against the
//! templates it was built from records nothing. A position that disagrees is
//! replaced by a freshly built subtree; partial hydration is the norm.

use crate::document::Document;
use crate::error::HydrationError;
use crate::node::{AttrValue, NodeKind};
use crate::style::Style;
use bridge::NodeKey;
use log::warn;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info_span;

/// Declarative description of a subtree.
#[derive(Clone, Debug, PartialEq)]
pub enum Template {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        style: Option<String>,
        children: Vec<Template>,
        /// Name under which the bound node is reported.
        ref_name: Option<String>,
    },
    Text(String),
    /// Expanded by a [`ComponentRenderer`] into a list of templates.
    Component { name: String, props: Value },
}

impl Template {
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            style: None,
            children: Vec::new(),
            ref_name: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn component(name: impl Into<String>, props: Value) -> Self {
        Self::Component {
            name: name.into(),
            props,
        }
    }

    /// Add an attribute (elements only).
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        if let Self::Element { attrs, .. } = &mut self {
            attrs.push((name.to_owned(), value.to_owned()));
        }
        self
    }

    #[must_use]
    pub fn style(mut self, css_text: &str) -> Self {
        if let Self::Element { style, .. } = &mut self {
            *style = Some(css_text.to_owned());
        }
        self
    }

    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    #[must_use]
    pub fn with_ref(mut self, name: &str) -> Self {
        if let Self::Element { ref_name, .. } = &mut self {
            *ref_name = Some(name.to_owned());
        }
        self
    }
}

/// Expands components. `Ok(None)` means the name is unknown.
pub trait ComponentRenderer {
    fn render(&self, name: &str, props: &Value) -> anyhow::Result<Option<Vec<Template>>>;
}

/// Document generation a hydration was prepared against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HydrationTicket {
    generation: u64,
}

impl HydrationTicket {
    #[inline]
    pub const fn generation(self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HydrationReport {
    /// Existing nodes bound without recreation.
    pub reused: usize,
    /// Nodes created from templates.
    pub created: usize,
    /// Existing nodes discarded, descendants included.
    pub removed: usize,
    pub refs: BTreeMap<String, NodeKey>,
}

/// Reclaim a detached subtree that will never be attached.
fn discard(document: &mut Document, key: NodeKey) {
    if let Err(error) = document.destroy(key) {
        warn!("could not discard abandoned node {key}: {error}");
    }
}

/// Append `fresh` to `parent`, or put it in place of `replacing`. A fresh
/// subtree that cannot be attached is discarded.
fn attach(document: &mut Document, parent: NodeKey, fresh: NodeKey, replacing: Option<NodeKey>) -> Result<NodeKey, HydrationError> {
    let linked = match replacing {
        Some(old) => document.replace_child(parent, fresh, old).map(|_| ()),
        None => document.append_child(parent, fresh),
    };
    if let Err(error) = linked {
        discard(document, fresh);
        return Err(error.into());
    }
    Ok(fresh)
}

struct Session<'r> {
    renderer: Option<&'r dyn ComponentRenderer>,
    limit: usize,
    report: HydrationReport,
}

impl Session<'_> {
    /// Flatten components into element/text templates, each tagged with the
    /// component depth its own children expand at.
    fn expand(&self, templates: &[Template], depth: usize, out: &mut Vec<(Template, usize)>) -> Result<(), HydrationError> {
        for template in templates {
            let Template::Component { name, props } = template else {
                out.push((template.clone(), depth));
                continue;
            };
            let next = depth + 1;
            if next > self.limit {
                warn!("component `{name}` exceeds the expansion depth of {}", self.limit);
                return Err(HydrationError::RecursionLimit { limit: self.limit });
            }
            let unknown = || HydrationError::UnknownComponent { name: name.clone() };
            let renderer = self.renderer.ok_or_else(unknown)?;
            let rendered = renderer
                .render(name, props)
                .map_err(|error| HydrationError::Render {
                    name: name.clone(),
                    message: format!("{error:#}"),
                })?
                .ok_or_else(unknown)?;
            self.expand(&rendered, next, out)?;
        }
        Ok(())
    }

    /// Build one expanded template as a detached subtree. On failure nothing
    /// built for it survives.
    fn build_detached(&mut self, document: &mut Document, template: &Template, depth: usize) -> Result<NodeKey, HydrationError> {
        match template {
            Template::Element {
                tag,
                attrs,
                style,
                children,
                ref_name,
            } => {
                let key = document.create_element(tag);
                if let Err(error) = self.populate(document, key, attrs, style.as_deref(), children, depth) {
                    discard(document, key);
                    return Err(error);
                }
                if let Some(name) = ref_name {
                    self.report.refs.insert(name.clone(), key);
                }
                self.report.created += 1;
                Ok(key)
            }
            Template::Text(text) => {
                self.report.created += 1;
                Ok(document.create_text(text))
            }
            Template::Component { name, .. } => Err(HydrationError::UnknownComponent { name: name.clone() }),
        }
    }

    fn populate(
        &mut self,
        document: &mut Document,
        key: NodeKey,
        attrs: &[(String, String)],
        style: Option<&str>,
        children: &[Template],
        depth: usize,
    ) -> Result<(), HydrationError> {
        for (name, value) in attrs {
            document.set_attribute(key, name, value.as_str())?;
        }
        if let Some(css_text) = style {
            document.set_style_text(key, css_text)?;
        }
        self.build_children(document, key, children, depth)?;
        Ok(())
    }

    /// Build and append every template, or nothing: siblings appended before
    /// a failure are taken out again.
    fn build_children(
        &mut self,
        document: &mut Document,
        parent: NodeKey,
        templates: &[Template],
        depth: usize,
    ) -> Result<Vec<NodeKey>, HydrationError> {
        let mut expanded = Vec::new();
        self.expand(templates, depth, &mut expanded)?;
        let mut built = Vec::with_capacity(expanded.len());
        for (template, template_depth) in &expanded {
            let appended = self
                .build_detached(document, template, *template_depth)
                .and_then(|key| attach(document, parent, key, None));
            match appended {
                Ok(key) => built.push(key),
                Err(error) => {
                    for key in built {
                        if document.remove_child(parent, key).is_ok() {
                            discard(document, key);
                        }
                    }
                    return Err(error);
                }
            }
        }
        Ok(built)
    }

    fn matches(document: &Document, node: NodeKey, template: &Template) -> bool {
        match (document.kind(node), template) {
            (Ok(NodeKind::Element(data)), Template::Element { tag, .. }) => data.tag.eq_ignore_ascii_case(tag.trim()),
            (Ok(NodeKind::Text { .. }), Template::Text(_)) => true,
            _ => false,
        }
    }

    fn hydrate_children(
        &mut self,
        document: &mut Document,
        parent: NodeKey,
        templates: &[Template],
        depth: usize,
    ) -> Result<(), HydrationError> {
        let mut expanded = Vec::new();
        self.expand(templates, depth, &mut expanded)?;
        let existing = document.children(parent)?;
        for (position, (template, template_depth)) in expanded.iter().enumerate() {
            match existing.get(position) {
                Some(&node) if Self::matches(document, node, template) => {
                    self.reconcile(document, node, template, *template_depth)?;
                }
                Some(&node) => {
                    let fresh = self.build_detached(document, template, *template_depth)?;
                    attach(document, parent, fresh, Some(node))?;
                    self.report.removed += document.destroy(node)?;
                }
                None => {
                    let fresh = self.build_detached(document, template, *template_depth)?;
                    attach(document, parent, fresh, None)?;
                }
            }
        }
        for &surplus in existing.iter().skip(expanded.len()) {
            document.remove_child(parent, surplus)?;
            self.report.removed += document.destroy(surplus)?;
        }
        Ok(())
    }

    fn reconcile(&mut self, document: &mut Document, node: NodeKey, template: &Template, depth: usize) -> Result<(), HydrationError> {
        match template {
            Template::Element {
                attrs,
                style,
                children,
                ref_name,
                ..
            } => {
                for (name, value) in attrs {
                    if document.get_attribute(node, name)? != Some(value.as_str()) {
                        document.set_attribute(node, name, value.as_str())?;
                    }
                }
                let stale: Vec<String> = document
                    .element_data(node)?
                    .attrs
                    .iter()
                    .filter(|(name, value)| {
                        matches!(value, AttrValue::Text(_)) && !attrs.iter().any(|(wanted, _)| wanted == name)
                    })
                    .map(|(name, _)| name.clone())
                    .collect();
                for name in stale {
                    document.remove_attribute(node, &name)?;
                }
                let css_text = style.as_deref().unwrap_or_default();
                if *document.style(node)? != Style::parse(css_text) {
                    document.set_style_text(node, css_text)?;
                }
                if let Some(name) = ref_name {
                    self.report.refs.insert(name.clone(), node);
                }
                self.report.reused += 1;
                self.hydrate_children(document, node, children, depth)
            }
            Template::Text(text) => {
                if document.text(node)? != text {
                    document.set_text(node, text)?;
                }
                self.report.reused += 1;
                Ok(())
            }
            Template::Component { name, .. } => Err(HydrationError::UnknownComponent { name: name.clone() }),
        }
    }
}

/// Binds templates to existing nodes of a document.
pub struct Hydrator<'r> {
    ticket: HydrationTicket,
    depth_limit: usize,
    renderer: Option<&'r dyn ComponentRenderer>,
}

impl<'r> Hydrator<'r> {
    pub fn new(ticket: HydrationTicket, depth_limit: usize) -> Self {
        Self {
            ticket,
            depth_limit,
            renderer: None,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: &'r dyn ComponentRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    fn session(&self) -> Session<'r> {
        Session {
            renderer: self.renderer,
            limit: self.depth_limit,
            report: HydrationReport::default(),
        }
    }

    /// Hydrate the children of `parent` against `templates`.
    pub fn hydrate(&self, document: &mut Document, parent: NodeKey, templates: &[Template]) -> Result<HydrationReport, HydrationError> {
        let _span = info_span!("document.hydrate").entered();
        if self.ticket.generation != document.generation() {
            return Err(HydrationError::Stale {
                ticket: self.ticket.generation,
                current: document.generation(),
            });
        }
        let mut session = self.session();
        session.hydrate_children(document, parent, templates, 0)?;
        Ok(session.report)
    }

    /// Append freshly built subtrees to `parent`, expanding components.
    pub fn build(&self, document: &mut Document, parent: NodeKey, templates: &[Template]) -> Result<HydrationReport, HydrationError> {
        let mut session = self.session();
        session.build_children(document, parent, templates, 0)?;
        Ok(session.report)
    }
}

impl Document {
    /// Ticket for a hydration against the current generation.
    pub fn hydration_ticket(&self) -> HydrationTicket {
        HydrationTicket {
            generation: self.generation,
        }
    }

    /// Append nodes built from `templates` to `parent` through the ordinary
    /// creation path. Components need a [`Hydrator`] with a renderer.
    pub fn build(&mut self, parent: NodeKey, templates: &[Template]) -> Result<Vec<NodeKey>, HydrationError> {
        let mut session = Session {
            renderer: None,
            limit: usize::MAX,
            report: HydrationReport::default(),
        };
        session.build_children(self, parent, templates, 0)
    }
}
