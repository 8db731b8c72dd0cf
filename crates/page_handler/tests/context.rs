use dom::default_registry;
use page_handler::{ContextError, Page, PageLifecycle, Query, RuntimeConfig, RuntimeContext};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

type Journal = Rc<RefCell<Vec<String>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Recorder {
    name: &'static str,
    journal: Journal,
    fail_on_show: bool,
}

impl Recorder {
    fn boxed(name: &'static str, journal: &Journal) -> Box<Self> {
        Box::new(Self {
            name,
            journal: Rc::clone(journal),
            fail_on_show: false,
        })
    }

    fn note(&self, step: &str) {
        self.journal.borrow_mut().push(format!("{}:{step}", self.name));
    }
}

impl PageLifecycle for Recorder {
    fn on_load(&mut self, page: &mut Page, query: &Query) -> anyhow::Result<()> {
        self.note(&format!("load({})", query.get("id").map_or("", String::as_str)));
        let doc = page.document_mut();
        let root = doc.root();
        let title = doc.create_element("h1");
        doc.append_child(root, title)?;
        Ok(())
    }

    fn on_show(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        self.note("show");
        if self.fail_on_show {
            anyhow::bail!("show failed");
        }
        Ok(())
    }

    fn on_ready(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        self.note("ready");
        Ok(())
    }

    fn on_hide(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        self.note("hide");
        Ok(())
    }

    fn on_unload(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        self.note("unload");
        Ok(())
    }
}

fn context() -> RuntimeContext {
    RuntimeContext::new(default_registry(), RuntimeConfig::default())
}

#[test]
fn lifecycle_runs_in_order_across_navigation() {
    init_logging();
    let journal: Journal = Rc::default();
    let mut ctx = context();
    let (outbound, _batches) = mpsc::unbounded_channel();
    let query = Query::from([("id".to_owned(), "7".to_owned())]);

    ctx.mount("home", Recorder::boxed("home", &journal), &query, outbound.clone())
        .unwrap();
    ctx.mount("detail", Recorder::boxed("detail", &journal), &Query::new(), outbound)
        .unwrap();
    assert_eq!(ctx.current(), Some("detail"));
    ctx.navigate("home").unwrap();
    let page = ctx.unmount("home").unwrap();
    assert_eq!(page.document().children(page.document().root()).unwrap().len(), 1);
    assert_eq!(ctx.current(), None);

    assert_eq!(
        *journal.borrow(),
        vec![
            "home:load(7)",
            "home:show",
            "home:ready",
            "detail:load()",
            "home:hide",
            "detail:show",
            "detail:ready",
            "detail:hide",
            "home:show",
            "home:hide",
            "home:unload",
        ]
    );
}

#[test]
fn lifecycle_failures_are_contained() {
    let journal: Journal = Rc::default();
    let mut ctx = context();
    let (outbound, _batches) = mpsc::unbounded_channel();
    let mut failing = Recorder::boxed("flaky", &journal);
    failing.fail_on_show = true;
    ctx.mount("flaky", failing, &Query::new(), outbound).unwrap();
    assert_eq!(ctx.current(), Some("flaky"));
    assert_eq!(*journal.borrow(), vec!["flaky:load()", "flaky:show", "flaky:ready"]);
}

#[test]
fn unknown_and_duplicate_paths_are_errors() {
    let journal: Journal = Rc::default();
    let mut ctx = context();
    let (outbound, _batches) = mpsc::unbounded_channel();
    ctx.mount("home", Recorder::boxed("home", &journal), &Query::new(), outbound.clone())
        .unwrap();
    assert_eq!(
        ctx.mount("home", Recorder::boxed("again", &journal), &Query::new(), outbound),
        Err(ContextError::AlreadyMounted("home".into()))
    );
    assert_eq!(ctx.navigate("nowhere"), Err(ContextError::UnknownPage("nowhere".into())));
    assert!(matches!(ctx.unmount("nowhere"), Err(ContextError::UnknownPage(_))));
}

#[test]
fn lifecycle_changes_are_announced() {
    let journal: Journal = Rc::default();
    let mut ctx = context();
    let (outbound, _batches) = mpsc::unbounded_channel();
    let shown = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&shown);
    ctx.events().on("page:show", move |payload| {
        sink.borrow_mut().push(payload["path"].as_str().unwrap_or_default().to_owned());
    });
    ctx.mount("a", Recorder::boxed("a", &journal), &Query::new(), outbound.clone()).unwrap();
    ctx.mount("b", Recorder::boxed("b", &journal), &Query::new(), outbound).unwrap();
    ctx.navigate("a").unwrap();
    assert_eq!(*shown.borrow(), vec!["a", "b", "a"]);
    assert_eq!(ctx.mounted().collect::<Vec<_>>(), vec!["a", "b"]);
}
