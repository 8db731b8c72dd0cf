use bridge::{HostLogger, InboundEvent, LogLevel};
use dom::{
    DocumentOptions, DomError, EventHandler, EventPhase, ListenerOptions, NodeKey, SyntheticEvent,
    default_registry, Document,
};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

type Trail = Rc<RefCell<Vec<String>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recorder(trail: &Trail, label: &str) -> EventHandler {
    let trail = Rc::clone(trail);
    let label = label.to_owned();
    EventHandler::new(move |event, _doc| {
        let phase = match event.phase() {
            EventPhase::Capturing => "capture",
            EventPhase::AtTarget => "target",
            EventPhase::Bubbling => "bubble",
            EventPhase::None => "none",
        };
        trail.borrow_mut().push(format!("{label}:{phase}"));
        Ok(())
    })
}

/// root > outer > inner
fn nested() -> (Document, NodeKey, NodeKey) {
    let mut doc = Document::new();
    let root = doc.root();
    let outer = doc.create_element("div");
    let inner = doc.create_element("button");
    doc.append_child(outer, inner).unwrap();
    doc.append_child(root, outer).unwrap();
    (doc, outer, inner)
}

#[test]
fn phases_run_capture_then_target_then_bubble() {
    init_logging();
    let (mut doc, outer, inner) = nested();
    let trail: Trail = Rc::default();
    doc.add_event_listener(outer, "tap", recorder(&trail, "outer"), ListenerOptions::CAPTURE)
        .unwrap();
    doc.add_event_listener(outer, "tap", recorder(&trail, "outer"), ListenerOptions::default())
        .unwrap();
    doc.add_event_listener(inner, "tap", recorder(&trail, "inner-bubble"), ListenerOptions::default())
        .unwrap();
    doc.add_event_listener(inner, "tap", recorder(&trail, "inner-capture"), ListenerOptions::CAPTURE)
        .unwrap();

    let outcome = doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(outcome.invoked, 4);
    assert_eq!(
        *trail.borrow(),
        vec!["outer:capture", "inner-capture:target", "inner-bubble:target", "outer:bubble"]
    );
}

#[test]
fn non_bubbling_events_stop_at_the_target() {
    let (mut doc, outer, inner) = nested();
    let trail: Trail = Rc::default();
    doc.add_event_listener(outer, "focus", recorder(&trail, "outer"), ListenerOptions::default())
        .unwrap();
    doc.add_event_listener(inner, "focus", recorder(&trail, "inner"), ListenerOptions::default())
        .unwrap();
    doc.dispatch_event(inner, SyntheticEvent::new("focus", false, false)).unwrap();
    assert_eq!(*trail.borrow(), vec!["inner:target"]);
}

#[test]
fn stop_propagation_finishes_the_current_node() {
    let (mut doc, outer, inner) = nested();
    let trail: Trail = Rc::default();
    let stopper = EventHandler::new(|event, _doc| {
        event.stop_propagation();
        Ok(())
    });
    doc.add_event_listener(inner, "tap", stopper, ListenerOptions::default()).unwrap();
    doc.add_event_listener(inner, "tap", recorder(&trail, "inner"), ListenerOptions::default())
        .unwrap();
    doc.add_event_listener(outer, "tap", recorder(&trail, "outer"), ListenerOptions::default())
        .unwrap();

    doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(*trail.borrow(), vec!["inner:target"]);
}

#[test]
fn stop_immediate_propagation_skips_remaining_listeners() {
    let (mut doc, _outer, inner) = nested();
    let trail: Trail = Rc::default();
    let stopper = EventHandler::new(|event, _doc| {
        event.stop_immediate_propagation();
        Ok(())
    });
    doc.add_event_listener(inner, "tap", stopper, ListenerOptions::default()).unwrap();
    doc.add_event_listener(inner, "tap", recorder(&trail, "inner"), ListenerOptions::default())
        .unwrap();
    let outcome = doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(outcome.invoked, 1);
    assert!(trail.borrow().is_empty());
}

#[test]
fn once_listeners_and_duplicates() {
    let (mut doc, _outer, inner) = nested();
    let trail: Trail = Rc::default();
    let handler = recorder(&trail, "once");
    doc.add_event_listener(inner, "tap", handler.clone(), ListenerOptions::ONCE).unwrap();
    // Same handler, same type and phase: kept once.
    doc.add_event_listener(inner, "tap", handler.clone(), ListenerOptions::ONCE).unwrap();

    doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(trail.borrow().len(), 1);
    assert!(!doc.remove_event_listener(inner, "tap", handler.id(), false).unwrap());
}

#[test]
fn listeners_removed_mid_dispatch_are_skipped() {
    let (mut doc, _outer, inner) = nested();
    let trail: Trail = Rc::default();
    let victim = recorder(&trail, "victim");
    let victim_id = victim.id();
    let remover = EventHandler::new(move |event, doc| {
        if let Some(target) = event.current_target() {
            doc.remove_event_listener(target, "tap", victim_id, false)?;
        }
        Ok(())
    });
    doc.add_event_listener(inner, "tap", remover, ListenerOptions::default()).unwrap();
    doc.add_event_listener(inner, "tap", victim, ListenerOptions::default()).unwrap();
    let outcome = doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(outcome.invoked, 1);
    assert!(trail.borrow().is_empty());
}

#[derive(Default)]
struct CapturingLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl HostLogger for CapturingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_owned()));
    }
}

#[test]
fn failing_handlers_are_logged_and_isolated() {
    init_logging();
    let logger = Arc::new(CapturingLogger::default());
    let options = DocumentOptions {
        logger: logger.clone(),
        ..DocumentOptions::default()
    };
    let mut doc = Document::with_options(default_registry(), options).unwrap();
    let root = doc.root();
    let button = doc.create_element("button");
    doc.append_child(root, button).unwrap();

    let trail: Trail = Rc::default();
    let failing = EventHandler::new(|_event, _doc| anyhow::bail!("boom"));
    doc.add_event_listener(button, "tap", failing, ListenerOptions::default()).unwrap();
    doc.add_event_listener(button, "tap", recorder(&trail, "after"), ListenerOptions::default())
        .unwrap();
    doc.add_event_listener(root, "tap", recorder(&trail, "root"), ListenerOptions::default())
        .unwrap();

    let outcome = doc.dispatch_event(button, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(outcome.handler_errors, 1);
    assert_eq!(*trail.borrow(), vec!["after:target", "root:bubble"]);
    let lines = logger.lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].0, LogLevel::Error);
    assert!(lines[0].1.contains("boom"));
}

#[test]
fn prevent_default_is_reported() {
    let (mut doc, outer, inner) = nested();
    let canceller = EventHandler::new(|event, _doc| {
        event.prevent_default();
        Ok(())
    });
    doc.add_event_listener(outer, "submit", canceller, ListenerOptions::default()).unwrap();
    let cancelable = doc.dispatch_event(inner, SyntheticEvent::new("submit", true, true)).unwrap();
    assert!(cancelable.default_prevented);
    let fixed = doc.dispatch_event(inner, SyntheticEvent::new("submit", true, false)).unwrap();
    assert!(!fixed.default_prevented);
}

#[test]
fn inline_callback_attribute_runs_after_bubble_listeners() {
    let (mut doc, _outer, inner) = nested();
    let trail: Trail = Rc::default();
    doc.set_attribute(inner, "ontap", recorder(&trail, "inline")).unwrap();
    doc.add_event_listener(inner, "tap", recorder(&trail, "listener"), ListenerOptions::default())
        .unwrap();
    doc.dispatch_event(inner, SyntheticEvent::new("tap", true, false)).unwrap();
    assert_eq!(*trail.borrow(), vec!["listener:target", "inline:target"]);
}

#[test]
fn host_events_for_unknown_nodes_are_rejected() {
    let (mut doc, _outer, inner) = nested();
    let missing = NodeKey(inner.0 + 1000);
    let result = doc.dispatch_host_event(InboundEvent::new(missing, "tap", true));
    assert_eq!(
        result,
        Err(DomError::EventTargetMissing {
            target: missing,
            event_type: "tap".into()
        })
    );
}

#[test]
fn host_input_updates_form_value_without_patches() {
    init_logging();
    let mut doc = Document::new();
    let root = doc.root();
    let input = doc.create_element("input");
    doc.append_child(root, input).unwrap();
    doc.flush().unwrap();

    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let handler = EventHandler::new(move |event, doc| {
        let target = event.target().unwrap_or(NodeKey(0));
        *sink.borrow_mut() = doc.get_attribute(target, "value")?.map(str::to_owned);
        Ok(())
    });
    doc.add_event_listener(input, "input", handler, ListenerOptions::default()).unwrap();

    let message = InboundEvent::new(input, "input", true).with_payload(json!({ "detail": { "value": "hello" } }));
    let outcome = doc.dispatch_host_event(message).unwrap();
    assert_eq!(outcome.invoked, 1);
    assert_eq!(seen.borrow().as_deref(), Some("hello"));
    assert_eq!(doc.get_attribute(input, "value").unwrap(), Some("hello"));
    assert_eq!(doc.pending_patches(), 0);
}
