use crate::NodeKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

// Keys travel as decimal strings: 64-bit integers do not survive every host's
// number type.
impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyRepr {
    Text(String),
    Number(u64),
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match KeyRepr::deserialize(deserializer)? {
            KeyRepr::Number(raw) => Ok(Self(raw)),
            KeyRepr::Text(text) => text
                .parse::<u64>()
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Value carried by an attribute patch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    /// Plain string attribute.
    Text(String),
    /// Callback-valued attribute; the host binds a native handler and forwards
    /// events for it.
    Callback {
        /// Handler id on the logic side.
        callback: u64,
    },
}

impl WireValue {
    /// The string payload, if this is a plain attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Callback { .. } => None,
        }
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Kind tag of a serialized node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotKind {
    Root,
    Element,
    Text,
}

/// A full serialized subtree, attached to inserts of nodes the host has not
/// seen yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: NodeKey,
    pub kind: SnapshotKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, WireValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Render this snapshot with the same JSON schema the logic-side document
    /// prints, so both sides can be compared directly.
    pub fn to_json_value(&self) -> Value {
        match self.kind {
            SnapshotKind::Root => json!({
                "type": "document",
                "children": self.children.iter().map(Self::to_json_value).collect::<Vec<_>>(),
            }),
            SnapshotKind::Text => json!({
                "type": "text",
                "text": self.text.clone().unwrap_or_default(),
            }),
            SnapshotKind::Element => {
                let mut attrs = Map::new();
                for (name, value) in &self.attrs {
                    let rendered = match value {
                        WireValue::Text(text) => Value::String(text.clone()),
                        WireValue::Callback { callback } => json!({ "callback": callback }),
                    };
                    attrs.insert(name.clone(), rendered);
                }
                json!({
                    "type": "element",
                    "tag": self.tag.clone().unwrap_or_default(),
                    "attrs": Value::Object(attrs),
                    "style": self.style.clone().unwrap_or_default(),
                    "children": self.children.iter().map(Self::to_json_value).collect::<Vec<_>>(),
                })
            }
        }
    }
}

/// Operation payload of a patch, tagged by `op`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PatchOp {
    /// Attach the target under `parent_id` at `index`. `node` is present when
    /// the host has never materialized the target.
    Insert {
        parent_id: NodeKey,
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<NodeSnapshot>,
    },
    /// Detach the target (and its subtree) from `parent_id`.
    Remove { parent_id: NodeKey },
    SetAttribute { attr_name: String, value: WireValue },
    RemoveAttribute { attr_name: String },
    SetText { value: String },
    SetStyle { value: String },
    /// Move the target to `index` within its current parent.
    Reorder { parent_id: NodeKey, index: usize },
}

impl PatchOp {
    /// Whether this operation changes tree shape.
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Insert { .. } | Self::Remove { .. } | Self::Reorder { .. }
        )
    }

    /// The parent this operation refers to, for structural operations.
    pub const fn parent(&self) -> Option<NodeKey> {
        match self {
            Self::Insert { parent_id, .. }
            | Self::Remove { parent_id }
            | Self::Reorder { parent_id, .. } => Some(*parent_id),
            Self::SetAttribute { .. }
            | Self::RemoveAttribute { .. }
            | Self::SetText { .. }
            | Self::SetStyle { .. } => None,
        }
    }
}

/// One patch operation addressed to a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub target_id: NodeKey,
    /// Per-node sequence number.
    pub seq: u64,
    #[serde(flatten)]
    pub op: PatchOp,
}

/// All patches produced by one flush of one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBatch {
    pub root_id: NodeKey,
    pub generation: u64,
    /// The host must drop everything below the root before applying `ops`.
    /// Set on resynchronization batches rebuilt from the current tree.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub reset: bool,
    pub ops: Vec<Patch>,
}

impl PatchBatch {
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Event message posted by the render host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub target_id: NodeKey,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub bubbles: bool,
    #[serde(default)]
    pub payload: Value,
}

impl InboundEvent {
    pub fn new(target_id: NodeKey, event_type: impl Into<String>, bubbles: bool) -> Self {
        Self {
            target_id,
            event_type: event_type.into(),
            bubbles,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_flattens_operation_fields() {
        let patch = Patch {
            target_id: NodeKey(7),
            seq: 2,
            op: PatchOp::SetAttribute {
                attr_name: "class".to_owned(),
                value: WireValue::from("big"),
            },
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({ "targetId": "7", "seq": 2, "op": "setAttribute", "attrName": "class", "value": "big" })
        );
    }

    #[test]
    fn move_insert_omits_node_snapshot() {
        let patch = Patch {
            target_id: NodeKey(3),
            seq: 1,
            op: PatchOp::Insert {
                parent_id: NodeKey(1),
                index: 0,
                node: None,
            },
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({ "targetId": "3", "seq": 1, "op": "insert", "parentId": "1", "index": 0 })
        );
    }

    #[test]
    fn inbound_event_accepts_numeric_ids_and_missing_payload() {
        let event: InboundEvent =
            serde_json::from_str(r#"{ "targetId": 12, "type": "tap", "bubbles": true }"#).unwrap();
        assert_eq!(event.target_id, NodeKey(12));
        assert_eq!(event.event_type, "tap");
        assert!(event.bubbles);
        assert_eq!(event.payload, Value::Null);
    }

    #[test]
    fn callback_attributes_serialize_as_objects() {
        let value = serde_json::to_value(WireValue::Callback { callback: 9 }).unwrap();
        assert_eq!(value, json!({ "callback": 9 }));
    }
}
