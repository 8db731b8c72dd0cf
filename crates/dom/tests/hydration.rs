use bridge::{HostTree, PatchSubscriber};
use dom::{ComponentRenderer, Document, HydrationError, Hydrator, NodeKey, Template};
use serde_json::{Value, json};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn page() -> Vec<Template> {
    vec![
        Template::element("header")
            .attr("class", "top")
            .style("color: red")
            .child(Template::text("Title")),
        Template::element("main")
            .with_ref("main")
            .child(Template::element("p").child(Template::text("one")))
            .child(Template::element("p").child(Template::text("two"))),
    ]
}

fn built_page() -> (Document, HostTree) {
    let mut doc = Document::new();
    let root = doc.root();
    let mut host = HostTree::new(root);
    doc.build(root, &page()).unwrap();
    host.apply_batch(&doc.flush().unwrap()).unwrap();
    (doc, host)
}

struct Components;

impl ComponentRenderer for Components {
    fn render(&self, name: &str, props: &Value) -> anyhow::Result<Option<Vec<Template>>> {
        match name {
            "card" => {
                let title = props["title"].as_str().unwrap_or("untitled");
                Ok(Some(vec![
                    Template::element("div")
                        .attr("class", "card")
                        .with_ref("card")
                        .child(Template::text(title)),
                ]))
            }
            "pair" => Ok(Some(vec![
                Template::component("card", json!({ "title": "left" })),
                Template::component("card", json!({ "title": "right" })),
            ])),
            "loop" => Ok(Some(vec![Template::element("div").child(Template::component("loop", Value::Null))])),
            "broken" => anyhow::bail!("missing data"),
            _ => Ok(None),
        }
    }
}

#[test]
fn hydrating_a_matching_tree_changes_nothing() {
    init_logging();
    let (mut doc, _host) = built_page();
    let root = doc.root();
    let count_before = doc.node_count();

    let ticket = doc.hydration_ticket();
    let report = Hydrator::new(ticket, 8).hydrate(&mut doc, root, &page()).unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.reused, 7);
    assert_eq!(doc.pending_patches(), 0);
    assert_eq!(doc.node_count(), count_before);
    let main = report.refs["main"];
    assert_eq!(doc.tag_name(main).unwrap(), Some("main"));
}

#[test]
fn partial_hydration_patches_only_the_differences() {
    init_logging();
    let (mut doc, mut host) = built_page();
    let root = doc.root();
    let header = doc.children(root).unwrap()[0];
    doc.set_attribute(header, "data-stale", "1").unwrap();
    host.apply_batch(&doc.flush().unwrap()).unwrap();

    let templates = vec![
        Template::element("header")
            .attr("class", "top")
            .child(Template::text("New title")),
        Template::element("main").child(Template::element("ul")),
    ];
    let ticket = doc.hydration_ticket();
    let report = Hydrator::new(ticket, 8).hydrate(&mut doc, root, &templates).unwrap();
    // header, its text and main are reused; the first <p> is swapped for a
    // <ul>; the second <p> goes away.
    assert_eq!(report.reused, 3);
    assert_eq!(report.created, 1);
    assert_eq!(report.removed, 4);
    assert_eq!(doc.get_attribute(header, "data-stale").unwrap(), None);
    assert!(doc.style(header).unwrap().is_empty());
    assert_eq!(doc.text_content(header).unwrap(), "New title");

    host.apply_batch(&doc.flush().unwrap()).unwrap();
    assert_eq!(host.snapshot().to_json_value(), doc.to_json_value());
}

#[test]
fn surplus_templates_are_appended() {
    let (mut doc, mut host) = built_page();
    let root = doc.root();
    let mut templates = page();
    templates.push(Template::element("footer").child(Template::text("bye")));
    let ticket = doc.hydration_ticket();
    let report = Hydrator::new(ticket, 8).hydrate(&mut doc, root, &templates).unwrap();
    assert_eq!(report.created, 2);

    let batch = doc.flush().unwrap();
    assert_eq!(batch.ops.len(), 1);
    host.apply_batch(&batch).unwrap();
    assert_eq!(host.snapshot().to_json_value(), doc.to_json_value());
}

#[test]
fn stale_tickets_are_refused() {
    let (mut doc, _host) = built_page();
    let root = doc.root();
    let ticket = doc.hydration_ticket();
    let header = doc.children(root).unwrap()[0];
    doc.set_attribute(header, "class", "moved-on").unwrap();
    doc.flush().unwrap();

    let result = Hydrator::new(ticket, 8).hydrate(&mut doc, root, &page());
    assert_eq!(
        result,
        Err(HydrationError::Stale {
            ticket: 1,
            current: 2
        })
    );
}

#[test]
fn components_expand_in_place() {
    init_logging();
    let mut doc = Document::new();
    let root = doc.root();
    let templates = vec![
        Template::element("section").child(Template::component("pair", Value::Null)),
    ];
    let ticket = doc.hydration_ticket();
    let report = Hydrator::new(ticket, 4)
        .with_renderer(&Components)
        .build(&mut doc, root, &templates)
        .unwrap();
    assert_eq!(report.created, 5);
    let section = doc.children(root).unwrap()[0];
    let cards: Vec<NodeKey> = doc.children(section).unwrap();
    assert_eq!(cards.len(), 2);
    assert_eq!(doc.text_content(cards[1]).unwrap(), "right");
    assert_eq!(report.refs["card"], cards[1]);

    // The whole section reaches the host as one insert.
    assert_eq!(doc.flush().unwrap().ops.len(), 1);

    let ticket = doc.hydration_ticket();
    let again = Hydrator::new(ticket, 4)
        .with_renderer(&Components)
        .hydrate(&mut doc, root, &templates)
        .unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(doc.pending_patches(), 0);
}

#[test]
fn runaway_components_hit_the_depth_limit() {
    let mut doc = Document::new();
    let root = doc.root();
    let ticket = doc.hydration_ticket();
    let result = Hydrator::new(ticket, 3)
        .with_renderer(&Components)
        .build(&mut doc, root, &[Template::component("loop", Value::Null)]);
    assert_eq!(result, Err(HydrationError::RecursionLimit { limit: 3 }));
}

#[test]
fn component_failures_are_reported() {
    let mut doc = Document::new();
    let root = doc.root();
    let ticket = doc.hydration_ticket();
    let hydrator = Hydrator::new(ticket, 3).with_renderer(&Components);

    let unknown = hydrator.build(&mut doc, root, &[Template::component("nope", Value::Null)]);
    assert_eq!(unknown, Err(HydrationError::UnknownComponent { name: "nope".into() }));

    let broken = hydrator.build(&mut doc, root, &[Template::component("broken", Value::Null)]);
    assert!(matches!(broken, Err(HydrationError::Render { ref name, .. }) if name == "broken"));

    let plain = doc.build(root, &[Template::component("card", Value::Null)]);
    assert_eq!(plain, Err(HydrationError::UnknownComponent { name: "card".into() }));
}

#[test]
fn failed_builds_leave_no_nodes_behind() {
    init_logging();
    let mut doc = Document::new();
    let root = doc.root();
    let before = doc.node_count();
    let ticket = doc.hydration_ticket();
    let hydrator = Hydrator::new(ticket, 3).with_renderer(&Components);

    let templates = [
        Template::element("section").child(Template::text("first")),
        Template::element("div")
            .child(Template::element("span"))
            .child(Template::component("broken", Value::Null)),
    ];
    let broken = hydrator.build(&mut doc, root, &templates);
    assert!(matches!(broken, Err(HydrationError::Render { ref name, .. }) if name == "broken"));
    assert_eq!(doc.node_count(), before);
    assert!(doc.children(root).unwrap().is_empty());
    assert_eq!(doc.pending_patches(), 0);

    let nested_loop = [Template::element("div").child(Template::component("loop", Value::Null))];
    let runaway = hydrator.build(&mut doc, root, &nested_loop);
    assert_eq!(runaway, Err(HydrationError::RecursionLimit { limit: 3 }));
    assert_eq!(doc.node_count(), before);
    assert!(doc.flush().is_none());
}

#[test]
fn failed_replacement_keeps_the_existing_node() {
    let (mut doc, _host) = built_page();
    let root = doc.root();
    let before = doc.node_count();
    let header = doc.children(root).unwrap()[0];
    let ticket = doc.hydration_ticket();
    let templates = [Template::element("nav").child(Template::component("broken", Value::Null))];
    let result = Hydrator::new(ticket, 3).with_renderer(&Components).hydrate(&mut doc, root, &templates);
    assert!(matches!(result, Err(HydrationError::Render { .. })));
    assert_eq!(doc.node_count(), before);
    assert_eq!(doc.children(root).unwrap()[0], header);
}
