use core::fmt;

use super::Document;
use crate::error::TreeError;
use crate::node::{AttrValue, NodeKind};
use bridge::{NodeKey, NodeSnapshot, SnapshotKind};
use indextree::NodeId;
use serde_json::Value;
use std::collections::BTreeMap;

fn write_indent(formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        formatter.write_str("  ")?;
    }
    Ok(())
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

impl Document {
    /// Serialize a subtree in the wire snapshot form.
    pub(crate) fn snapshot_id(&self, id: NodeId) -> NodeSnapshot {
        let node = self.node(id);
        let children = id.children(&self.arena).map(|child| self.snapshot_id(child)).collect();
        let mut snapshot = NodeSnapshot {
            id: node.key,
            kind: SnapshotKind::Root,
            tag: None,
            attrs: BTreeMap::new(),
            style: None,
            text: None,
            children,
        };
        match &node.kind {
            NodeKind::Root => {}
            NodeKind::Element(data) => {
                snapshot.kind = SnapshotKind::Element;
                snapshot.tag = Some(data.tag.clone());
                snapshot.attrs = data
                    .attrs
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_wire()))
                    .collect();
                if !data.style.is_empty() {
                    snapshot.style = Some(self.style_engine.serialize(&data.style));
                }
            }
            NodeKind::Text { text } => {
                snapshot.kind = SnapshotKind::Text;
                snapshot.text = Some(text.clone());
            }
        }
        snapshot
    }

    /// Wire snapshot of the subtree rooted at `key`.
    pub fn snapshot(&self, key: NodeKey) -> Result<NodeSnapshot, TreeError> {
        Ok(self.snapshot_id(self.resolve(key)?))
    }

    /// Build a deterministic JSON representation of the document.
    /// Schema:
    /// - Root: { "type":"document", "children":[ ... ] }
    /// - Element: { "type":"element", "tag": "div", "attrs": {..}, "style": "..", "children":[ ... ] }
    /// - Text: { "type":"text", "text":"..." }
    ///
    /// The host-side mirror prints the same schema, so both can be compared.
    pub fn to_json_value(&self) -> Value {
        self.snapshot_id(self.root).to_json_value()
    }

    /// Pretty JSON string for snapshots and test comparisons.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_value()).unwrap_or_else(|_| String::from("{}"))
    }

    fn fmt_node(&self, id: NodeId, formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write_indent(formatter, depth)?;
        match &self.node(id).kind {
            NodeKind::Root => writeln!(formatter, "#document")?,
            NodeKind::Element(data) => {
                write!(formatter, "<{}", data.tag)?;
                let mut pairs: Vec<&(String, AttrValue)> = data.attrs.iter().collect();
                pairs.sort_by(|left, right| left.0.cmp(&right.0));
                for (name, value) in pairs {
                    match value {
                        AttrValue::Text(text) => write!(formatter, " {name}=\"{}\"", escape_text(text))?,
                        AttrValue::Callback(handler) => write!(formatter, " {name}={{{}}}", handler.id().0)?,
                    }
                }
                if !data.style.is_empty() {
                    write!(formatter, " style=\"{}\"", escape_text(&data.style.css_text()))?;
                }
                writeln!(formatter, ">")?;
            }
            NodeKind::Text { text } => writeln!(formatter, "\"{}\"", escape_text(text))?,
        }
        for child in id.children(&self.arena) {
            self.fmt_node(child, formatter, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            formatter,
            "Document(root={}, generation={}, nodes={}, pending={})",
            self.root(),
            self.generation,
            self.live,
            self.recorder.len()
        )?;
        self.fmt_node(self.root, formatter, 0)
    }
}
