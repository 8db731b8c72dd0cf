//! Registration and resolution behaviour of the capability registry.

use container::{CapabilityMissingError, Identifier, Registry};
use std::sync::Arc;
use std::thread;

trait ElementMaker: Send + Sync {
    fn label(&self) -> String;
}

struct Maker(&'static str);

impl ElementMaker for Maker {
    fn label(&self) -> String {
        self.0.to_owned()
    }
}

const ELEMENT_MAKER: Identifier<dyn ElementMaker> = Identifier::single("elementFactory");
const ELEMENT_HOOKS: Identifier<dyn ElementMaker> = Identifier::pipeline("elementFactory");

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn labels(resolved: &[Arc<dyn ElementMaker>]) -> Vec<String> {
    resolved.iter().map(|maker| maker.label()).collect()
}

#[test]
fn single_identifier_is_last_write_wins() {
    init_logging();
    let registry = Registry::new();
    registry.register(&ELEMENT_MAKER, Arc::new(Maker("first")), None);
    registry.register(&ELEMENT_MAKER, Arc::new(Maker("second")), None);

    assert_eq!(registry.resolve(&ELEMENT_MAKER).unwrap().label(), "second");
    assert_eq!(labels(&registry.resolve_all(&ELEMENT_MAKER).unwrap()), ["second"]);
}

#[test]
fn pipeline_identifier_keeps_both_in_order() {
    init_logging();
    let registry = Registry::new();
    registry.register(&ELEMENT_HOOKS, Arc::new(Maker("first")), None);
    registry.register(&ELEMENT_HOOKS, Arc::new(Maker("second")), None);

    assert_eq!(labels(&registry.resolve_all(&ELEMENT_HOOKS).unwrap()), ["first", "second"]);
    assert_eq!(registry.resolve(&ELEMENT_HOOKS).unwrap().label(), "first");
}

#[test]
fn pipeline_orders_by_descending_priority() {
    init_logging();
    let registry = Registry::new();
    registry.register(&ELEMENT_HOOKS, Arc::new(Maker("low")), Some(-5));
    registry.register(&ELEMENT_HOOKS, Arc::new(Maker("plain")), None);
    registry.register(&ELEMENT_HOOKS, Arc::new(Maker("high")), Some(10));
    registry.register(&ELEMENT_HOOKS, Arc::new(Maker("plain2")), Some(0));

    assert_eq!(
        labels(&registry.resolve_all(&ELEMENT_HOOKS).unwrap()),
        ["high", "plain", "plain2", "low"]
    );
}

#[test]
fn missing_capability_fails_unless_default_is_set() {
    init_logging();
    let registry = Registry::new();
    assert_eq!(
        registry.resolve(&ELEMENT_MAKER).err(),
        Some(CapabilityMissingError { name: "elementFactory" })
    );
    assert!(registry.try_resolve_all(&ELEMENT_HOOKS).is_empty());

    registry.set_default(&ELEMENT_MAKER, Arc::new(Maker("fallback")));
    assert_eq!(registry.resolve(&ELEMENT_MAKER).unwrap().label(), "fallback");

    registry.register(&ELEMENT_MAKER, Arc::new(Maker("platform")), None);
    assert_eq!(registry.resolve(&ELEMENT_MAKER).unwrap().label(), "platform");

    assert!(registry.unregister(&ELEMENT_MAKER));
    assert_eq!(registry.resolve(&ELEMENT_MAKER).unwrap().label(), "fallback");

    registry.clear();
    assert!(!registry.contains(&ELEMENT_MAKER));
}

#[test]
fn concurrent_registration_is_synchronized() {
    init_logging();
    let registry = Arc::new(Registry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let shared = Arc::clone(&registry);
            thread::spawn(move || {
                shared.register(&ELEMENT_HOOKS, Arc::new(Maker("hook")), None);
                shared.resolve(&ELEMENT_HOOKS).is_ok()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(registry.resolve_all(&ELEMENT_HOOKS).unwrap().len(), 8);
}

#[test]
fn global_registry_is_shared() {
    const SHARED_NAME: Identifier<str> = Identifier::single("test.globalName");
    init_logging();
    Registry::global().register(&SHARED_NAME, Arc::from("shared"), None);
    assert_eq!(&*Registry::global().resolve(&SHARED_NAME).unwrap(), "shared");
}
