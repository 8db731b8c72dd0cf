//! Capabilities the document resolves from the registry.
//!
//! Platform adapters override these by registering their own implementation
//! against the identifiers below before constructing documents.

use crate::events::SyntheticEvent;
use crate::node::ElementData;
use crate::style::Style;
use bridge::{InboundEvent, NodeKey};
use container::{Identifier, Registry};
use std::sync::Arc;

/// Builds the element payload for a tag name.
pub trait ElementFactory: Send + Sync {
    fn create_element(&self, tag: &str) -> ElementData;
}

/// Serializes an element's opaque style to its wire value.
pub trait StyleEngine: Send + Sync {
    fn serialize(&self, style: &Style) -> String;
}

/// Rewrites a host message before its target is resolved.
pub trait HostEventHook: Send + Sync {
    fn modify_host_event(&self, event: &mut InboundEvent);
}

/// Adjusts a synthetic event built from a host message before dispatch.
pub trait SyntheticEventHook: Send + Sync {
    fn modify_synthetic_event(&self, event: &mut SyntheticEvent);
}

/// Returning `true` claims the removal: the attribute stays and no patch is
/// recorded.
pub trait RemoveAttributeHook: Send + Sync {
    fn on_remove_attribute(&self, node: NodeKey, tag: &str, name: &str) -> bool;
}

pub const ELEMENT_FACTORY: Identifier<dyn ElementFactory> = Identifier::single("elementFactory");
pub const STYLE_ENGINE: Identifier<dyn StyleEngine> = Identifier::single("styleEngine");
pub const MODIFY_HOST_EVENT: Identifier<dyn HostEventHook> = Identifier::pipeline("modifyHostEvent");
pub const MODIFY_SYNTHETIC_EVENT: Identifier<dyn SyntheticEventHook> =
    Identifier::pipeline("modifySyntheticEvent");
pub const ON_REMOVE_ATTRIBUTE: Identifier<dyn RemoveAttributeHook> =
    Identifier::pipeline("onRemoveAttribute");

const FORM_TAGS: [&str; 6] = ["input", "textarea", "select", "picker", "slider", "switch"];

/// SVG tags in their canonical spelling. SVG names are case-sensitive on
/// the host.
const SVG_TAGS: [&str; 22] = [
    "svg",
    "g",
    "defs",
    "symbol",
    "use",
    "path",
    "circle",
    "ellipse",
    "line",
    "polyline",
    "polygon",
    "rect",
    "tspan",
    "textPath",
    "linearGradient",
    "radialGradient",
    "stop",
    "clipPath",
    "mask",
    "pattern",
    "marker",
    "foreignObject",
];

/// Lower-cases tags and marks form controls. SVG tags keep their canonical
/// case and are marked as SVG.
#[derive(Debug, Default)]
pub struct DefaultElementFactory;

impl ElementFactory for DefaultElementFactory {
    fn create_element(&self, tag: &str) -> ElementData {
        let trimmed = tag.trim();
        if let Some(canonical) = SVG_TAGS.iter().find(|svg| svg.eq_ignore_ascii_case(trimmed)) {
            let mut data = ElementData::new(*canonical);
            data.svg = true;
            return data;
        }
        let mut data = ElementData::new(trimmed.to_ascii_lowercase());
        data.form = FORM_TAGS.contains(&data.tag.as_str());
        data
    }
}

/// Emits plain css text.
#[derive(Debug, Default)]
pub struct CssTextStyleEngine;

impl StyleEngine for CssTextStyleEngine {
    fn serialize(&self, style: &Style) -> String {
        style.css_text()
    }
}

/// Install the built-in implementations as registry defaults.
pub fn install_defaults(registry: &Registry) {
    registry.set_default(&ELEMENT_FACTORY, Arc::new(DefaultElementFactory));
    registry.set_default(&STYLE_ENGINE, Arc::new(CssTextStyleEngine));
}

/// A fresh registry populated with the built-in defaults.
pub fn default_registry() -> Arc<Registry> {
    let registry = Registry::new();
    install_defaults(&registry);
    Arc::new(registry)
}
