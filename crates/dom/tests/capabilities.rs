use bridge::InboundEvent;
use container::Registry;
use dom::capabilities::{
    ELEMENT_FACTORY, ElementFactory, HostEventHook, MODIFY_HOST_EVENT, MODIFY_SYNTHETIC_EVENT, ON_REMOVE_ATTRIBUTE,
    RemoveAttributeHook, SyntheticEventHook, install_defaults,
};
use dom::{AttrValue, Document, ElementData, EventHandler, ListenerOptions, NodeKey, SyntheticEvent};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> Arc<Registry> {
    let registry = Registry::new();
    install_defaults(&registry);
    Arc::new(registry)
}

struct PrefixedFactory;

impl ElementFactory for PrefixedFactory {
    fn create_element(&self, tag: &str) -> ElementData {
        let mut data = ElementData::new(format!("x-{}", tag.to_ascii_lowercase()));
        data.set_attr("data-platform", AttrValue::from("mini"));
        data
    }
}

#[test]
fn registered_factory_replaces_the_default() {
    init_logging();
    let registry = registry();
    let factory: Arc<dyn ElementFactory> = Arc::new(PrefixedFactory);
    registry.register(&ELEMENT_FACTORY, factory, None);
    let mut doc = Document::with_registry(registry).unwrap();
    let view = doc.create_element("View");
    assert_eq!(doc.tag_name(view).unwrap(), Some("x-view"));
    assert_eq!(doc.get_attribute(view, "data-platform").unwrap(), Some("mini"));
}

#[test]
fn missing_capabilities_fail_construction() {
    let registry = Arc::new(Registry::new());
    let error = Document::with_registry(registry).err().unwrap();
    assert_eq!(error.name, "elementFactory");
}

struct KeepValue;

impl RemoveAttributeHook for KeepValue {
    fn on_remove_attribute(&self, _node: NodeKey, tag: &str, name: &str) -> bool {
        tag == "input" && name == "value"
    }
}

#[test]
fn removal_hooks_can_claim_an_attribute() {
    let registry = registry();
    let hook: Arc<dyn RemoveAttributeHook> = Arc::new(KeepValue);
    registry.register(&ON_REMOVE_ATTRIBUTE, hook, None);
    let mut doc = Document::with_registry(registry).unwrap();
    let root = doc.root();
    let input = doc.create_element("input");
    doc.set_attribute(input, "value", "typed").unwrap();
    doc.set_attribute(input, "placeholder", "name").unwrap();
    doc.append_child(root, input).unwrap();
    doc.flush().unwrap();

    doc.remove_attribute(input, "value").unwrap();
    assert_eq!(doc.get_attribute(input, "value").unwrap(), Some("typed"));
    assert_eq!(doc.pending_patches(), 0);

    doc.remove_attribute(input, "placeholder").unwrap();
    assert!(!doc.has_attribute(input, "placeholder").unwrap());
    assert_eq!(doc.pending_patches(), 1);
}

struct ClickIsTap;

impl HostEventHook for ClickIsTap {
    fn modify_host_event(&self, event: &mut InboundEvent) {
        if event.event_type == "click" {
            event.event_type = "tap".into();
        }
    }
}

struct NeverBubble;

impl SyntheticEventHook for NeverBubble {
    fn modify_synthetic_event(&self, event: &mut SyntheticEvent) {
        event.set_bubbles(false);
    }
}

#[test]
fn event_hooks_rewrite_host_messages() {
    let registry = registry();
    let host_hook: Arc<dyn HostEventHook> = Arc::new(ClickIsTap);
    let synthetic_hook: Arc<dyn SyntheticEventHook> = Arc::new(NeverBubble);
    registry.register(&MODIFY_HOST_EVENT, host_hook, None);
    registry.register(&MODIFY_SYNTHETIC_EVENT, synthetic_hook, None);
    let mut doc = Document::with_registry(registry).unwrap();
    let root = doc.root();
    let button = doc.create_element("button");
    doc.append_child(root, button).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    for (node, label) in [(button, "button"), (root, "root")] {
        let sink = Rc::clone(&seen);
        let handler = EventHandler::new(move |_event, _doc| {
            sink.borrow_mut().push(label);
            Ok(())
        });
        doc.add_event_listener(node, "tap", handler, ListenerOptions::default()).unwrap();
    }

    doc.dispatch_host_event(InboundEvent::new(button, "click", true)).unwrap();
    assert_eq!(*seen.borrow(), vec!["button"]);
}
