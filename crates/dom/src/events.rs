//! Synthetic events and three-phase dispatch.
//!
//! Dispatch walks a path fixed when it starts: capture listeners from the top
//! of the path down to the target's parent, then the target's capture and
//! bubble listeners, then bubble listeners back up when the event bubbles.
//! A failing handler is logged and counted; the walk carries on.

use crate::capabilities::{MODIFY_HOST_EVENT, MODIFY_SYNTHETIC_EVENT};
use crate::document::Document;
use crate::error::{DomError, TreeError};
use crate::node::{EventHandler, HandlerId, NodeKind};
use bridge::{InboundEvent, LogLevel, NodeKey};
use indextree::NodeId;
use log::{debug, trace};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info_span;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventPhase {
    #[default]
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

#[derive(Clone, Debug)]
pub struct SyntheticEvent {
    event_type: String,
    target: Option<NodeKey>,
    current_target: Option<NodeKey>,
    phase: EventPhase,
    bubbles: bool,
    cancelable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
    /// Milliseconds since the owning document was created.
    time_stamp: f64,
    /// Original host payload for inbound events, `Null` otherwise.
    pub payload: Value,
}

impl SyntheticEvent {
    pub fn new(event_type: impl Into<String>, bubbles: bool, cancelable: bool) -> Self {
        Self {
            event_type: event_type.into(),
            target: None,
            current_target: None,
            phase: EventPhase::None,
            bubbles,
            cancelable,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            time_stamp: 0.0,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[inline]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Rename the event; only meaningful before dispatch starts.
    pub fn set_event_type(&mut self, event_type: impl Into<String>) {
        self.event_type = event_type.into();
    }

    #[inline]
    pub const fn target(&self) -> Option<NodeKey> {
        self.target
    }

    #[inline]
    pub const fn current_target(&self) -> Option<NodeKey> {
        self.current_target
    }

    #[inline]
    pub const fn phase(&self) -> EventPhase {
        self.phase
    }

    #[inline]
    pub const fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn set_bubbles(&mut self, bubbles: bool) {
        self.bubbles = bubbles;
    }

    #[inline]
    pub const fn cancelable(&self) -> bool {
        self.cancelable
    }

    #[inline]
    pub const fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    #[inline]
    pub const fn time_stamp(&self) -> f64 {
        self.time_stamp
    }

    /// Mark the default action as cancelled. Has no effect on events that
    /// are not cancelable and never halts propagation.
    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    /// Finish the current node, then stop.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Stop before the next listener, even on the current node.
    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    #[inline]
    pub const fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
}

impl ListenerOptions {
    pub const CAPTURE: Self = Self {
        capture: true,
        once: false,
    };
    pub const ONCE: Self = Self {
        capture: false,
        once: true,
    };
}

#[derive(Clone, Debug)]
struct Listener {
    event_type: String,
    handler: EventHandler,
    capture: bool,
    once: bool,
}

/// Listeners per node, in registration order.
#[derive(Default)]
pub(crate) struct ListenerMap {
    by_node: HashMap<NodeId, Vec<Listener>>,
}

impl ListenerMap {
    pub(crate) fn forget(&mut self, node: NodeId) {
        self.by_node.remove(&node);
    }

    fn snapshot(&self, node: NodeId, event_type: &str, capture: bool) -> Vec<Listener> {
        self.by_node
            .get(&node)
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|listener| listener.capture == capture && listener.event_type == event_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove(&mut self, node: NodeId, event_type: &str, handler: HandlerId, capture: bool) -> bool {
        let Some(listeners) = self.by_node.get_mut(&node) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|listener| {
            !(listener.capture == capture && listener.event_type == event_type && listener.handler.id() == handler)
        });
        before != listeners.len()
    }

    fn contains(&self, node: NodeId, event_type: &str, handler: HandlerId, capture: bool) -> bool {
        self.by_node.get(&node).is_some_and(|listeners| {
            listeners.iter().any(|listener| {
                listener.capture == capture && listener.event_type == event_type && listener.handler.id() == handler
            })
        })
    }
}

/// What a dispatch did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    /// Handlers invoked, failed ones included.
    pub invoked: usize,
    pub handler_errors: usize,
}

impl Document {
    /// Register a listener. The same handler registered twice for the same
    /// type and capture flag is kept once.
    pub fn add_event_listener(
        &mut self,
        key: NodeKey,
        event_type: &str,
        handler: EventHandler,
        options: ListenerOptions,
    ) -> Result<(), TreeError> {
        let id = self.resolve(key)?;
        if self.listeners.contains(id, event_type, handler.id(), options.capture) {
            return Ok(());
        }
        self.listeners.by_node.entry(id).or_default().push(Listener {
            event_type: event_type.to_owned(),
            handler,
            capture: options.capture,
            once: options.once,
        });
        Ok(())
    }

    /// Unregister a listener; returns whether one was removed.
    pub fn remove_event_listener(
        &mut self,
        key: NodeKey,
        event_type: &str,
        handler: HandlerId,
        capture: bool,
    ) -> Result<bool, TreeError> {
        let id = self.resolve(key)?;
        Ok(self.listeners.remove(id, event_type, handler, capture))
    }

    /// Dispatch `event` at `target` through capture, target and bubble phases.
    pub fn dispatch_event(&mut self, target: NodeKey, mut event: SyntheticEvent) -> Result<DispatchOutcome, DomError> {
        let _span = info_span!("document.dispatch", event = event.event_type.as_str()).entered();
        let target_id = self.resolve(target)?;
        // Target first, topmost ancestor last.
        let path: Vec<NodeId> = target_id.ancestors(&self.arena).collect();
        event.target = Some(target);
        event.propagation_stopped = false;
        event.immediate_propagation_stopped = false;
        if event.time_stamp == 0.0 {
            event.time_stamp = self.now();
        }
        let mut outcome = DispatchOutcome::default();

        event.phase = EventPhase::Capturing;
        for node in path.iter().skip(1).rev() {
            if event.propagation_stopped {
                break;
            }
            self.invoke_listeners(*node, true, &mut event, &mut outcome);
        }

        if !event.propagation_stopped {
            event.phase = EventPhase::AtTarget;
            self.invoke_listeners(target_id, true, &mut event, &mut outcome);
            if !event.immediate_propagation_stopped {
                self.invoke_listeners(target_id, false, &mut event, &mut outcome);
            }
        }

        if event.bubbles {
            event.phase = EventPhase::Bubbling;
            for node in path.iter().skip(1) {
                if event.propagation_stopped {
                    break;
                }
                self.invoke_listeners(*node, false, &mut event, &mut outcome);
            }
        }

        event.phase = EventPhase::None;
        event.current_target = None;
        outcome.default_prevented = event.default_prevented;
        trace!(
            "dispatched `{}` at {target}: {} handlers, {} failed",
            event.event_type, outcome.invoked, outcome.handler_errors
        );
        Ok(outcome)
    }

    fn invoke_listeners(&mut self, node: NodeId, capture: bool, event: &mut SyntheticEvent, outcome: &mut DispatchOutcome) {
        // Nodes destroyed by an earlier handler drop out of the walk.
        if node.is_removed(&self.arena) {
            return;
        }
        event.current_target = Some(self.key_of(node));
        let mut handlers: Vec<(Listener, bool)> = self
            .listeners
            .snapshot(node, &event.event_type, capture)
            .into_iter()
            .map(|listener| (listener, false))
            .collect();
        // An `on<type>` callback attribute acts as the last bubble listener.
        if !capture {
            if let Some(inline) = self.node(node).element().and_then(|data| data.inline_handler(&event.event_type)) {
                let listener = Listener {
                    event_type: event.event_type.clone(),
                    handler: inline.clone(),
                    capture: false,
                    once: false,
                };
                handlers.push((listener, true));
            }
        }
        for (position, (listener, inline)) in handlers.into_iter().enumerate() {
            if event.immediate_propagation_stopped {
                break;
            }
            if !inline {
                let still_registered = if listener.once {
                    self.listeners.remove(node, &listener.event_type, listener.handler.id(), capture)
                } else {
                    self.listeners.contains(node, &listener.event_type, listener.handler.id(), capture)
                };
                // Removed by an earlier handler of this dispatch.
                if !still_registered {
                    continue;
                }
            }
            outcome.invoked += 1;
            if let Err(error) = listener.handler.call(event, self) {
                outcome.handler_errors += 1;
                self.logger.log(
                    LogLevel::Error,
                    &format!(
                        "`{}` handler #{position} on {} failed: {error:#}",
                        event.event_type,
                        event.current_target.map_or_else(String::new, |key| key.to_string())
                    ),
                );
            }
        }
    }

    /// Turn a host message into a synthetic event and dispatch it.
    ///
    /// Host-event hooks run first, then the target is resolved by key; an
    /// unknown key yields [`DomError::EventTargetMissing`]. The synthetic event
    /// is cancelable and bubbles as the message says. For form controls,
    /// `input` and `change` events copy `payload.detail.value` into the `value`
    /// attribute without recording a patch.
    pub fn dispatch_host_event(&mut self, mut message: InboundEvent) -> Result<DispatchOutcome, DomError> {
        let _span = info_span!("document.host_event", event = message.event_type.as_str()).entered();
        for hook in self.registry.try_resolve_all(&MODIFY_HOST_EVENT) {
            hook.modify_host_event(&mut message);
        }
        let Ok(target_id) = self.resolve(message.target_id) else {
            return Err(DomError::EventTargetMissing {
                target: message.target_id,
                event_type: message.event_type,
            });
        };
        let mut event = SyntheticEvent::new(message.event_type, message.bubbles, true).with_payload(message.payload);
        for hook in self.registry.try_resolve_all(&MODIFY_SYNTHETIC_EVENT) {
            hook.modify_synthetic_event(&mut event);
        }
        if matches!(event.event_type.as_str(), "input" | "change") {
            self.mirror_form_value(target_id, &event.payload);
        }
        self.dispatch_event(message.target_id, event)
    }

    fn mirror_form_value(&mut self, id: NodeId, payload: &Value) {
        let Some(value) = payload.pointer("/detail/value") else {
            return;
        };
        let text = match value {
            Value::String(text) => text.clone(),
            Value::Null => return,
            other => other.to_string(),
        };
        if let NodeKind::Element(data) = &mut self.node_mut(id).kind {
            if data.form {
                debug!("form control {} now holds {text:?}", data.tag);
                data.set_attr("value", text.into());
            }
        }
    }
}
