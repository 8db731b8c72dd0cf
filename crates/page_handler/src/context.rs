//! Explicit runtime context: which pages are mounted and which one is shown.
//!
//! Lifecycle callbacks receive the page they belong to. Their errors are
//! logged by [`safe_execute`] and never escape into the caller.

use crate::config::RuntimeConfig;
use crate::events::EventCenter;
use crate::state::Page;
use bridge::PatchBatch;
use container::{CapabilityMissingError, Registry};
use log::{debug, error};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Query parameters handed to `on_load`.
pub type Query = BTreeMap<String, String>;

/// Hooks a page implementation can provide. All default to doing nothing.
pub trait PageLifecycle {
    fn on_load(&mut self, _page: &mut Page, _query: &Query) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_show(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_ready(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_hide(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_unload(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("no page is mounted at `{0}`")]
    UnknownPage(String),
    #[error("a page is already mounted at `{0}`")]
    AlreadyMounted(String),
    #[error(transparent)]
    Capability(#[from] CapabilityMissingError),
}

/// Run a lifecycle step, logging its failure. Returns whether it succeeded.
pub fn safe_execute<F>(path: &str, step: &str, callback: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match callback() {
        Ok(()) => true,
        Err(err) => {
            error!("{step} of page `{path}` failed: {err:#}");
            false
        }
    }
}

struct MountedPage {
    page: Page,
    lifecycle: Box<dyn PageLifecycle>,
}

pub struct RuntimeContext {
    registry: Arc<Registry>,
    config: RuntimeConfig,
    pages: BTreeMap<String, MountedPage>,
    current: Option<String>,
    events: EventCenter,
}

impl RuntimeContext {
    pub fn new(registry: Arc<Registry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            pages: BTreeMap::new(),
            current: None,
            events: EventCenter::new(),
        }
    }

    /// Lifecycle announcements go out on `page:load`, `page:show`,
    /// `page:hide` and `page:unload` with `{ "path": .. }` payloads.
    pub fn events(&mut self) -> &mut EventCenter {
        &mut self.events
    }

    /// Path of the page currently shown.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn page(&self, path: &str) -> Option<&Page> {
        self.pages.get(path).map(|mounted| &mounted.page)
    }

    pub fn page_mut(&mut self, path: &str) -> Option<&mut Page> {
        self.pages.get_mut(path).map(|mounted| &mut mounted.page)
    }

    pub fn mounted(&self) -> impl Iterator<Item = &str> {
        self.pages.keys().map(String::as_str)
    }

    /// Create a page, run `on_load`, show it and run `on_ready`. The page
    /// shown before is hidden.
    pub fn mount(
        &mut self,
        path: &str,
        lifecycle: Box<dyn PageLifecycle>,
        query: &Query,
        outbound: UnboundedSender<PatchBatch>,
    ) -> Result<(), ContextError> {
        if self.pages.contains_key(path) {
            return Err(ContextError::AlreadyMounted(path.to_owned()));
        }
        let page = Page::new(Arc::clone(&self.registry), self.config.clone(), outbound)?;
        let mut mounted = MountedPage { page, lifecycle };
        safe_execute(path, "onLoad", || mounted.lifecycle.on_load(&mut mounted.page, query));
        self.events.trigger("page:load", &json!({ "path": path }));
        self.pages.insert(path.to_owned(), mounted);
        debug!("mounted page `{path}`");
        self.show(path)?;
        if let Some(mounted) = self.pages.get_mut(path) {
            safe_execute(path, "onReady", || mounted.lifecycle.on_ready(&mut mounted.page));
        }
        Ok(())
    }

    /// Hide the current page and show the one mounted at `path`.
    pub fn navigate(&mut self, path: &str) -> Result<(), ContextError> {
        if !self.pages.contains_key(path) {
            return Err(ContextError::UnknownPage(path.to_owned()));
        }
        self.show(path)
    }

    fn show(&mut self, path: &str) -> Result<(), ContextError> {
        if self.current.as_deref() == Some(path) {
            return Ok(());
        }
        if let Some(previous) = self.current.take() {
            self.hide(&previous);
        }
        let mounted = self
            .pages
            .get_mut(path)
            .ok_or_else(|| ContextError::UnknownPage(path.to_owned()))?;
        safe_execute(path, "onShow", || mounted.lifecycle.on_show(&mut mounted.page));
        self.current = Some(path.to_owned());
        self.events.trigger("page:show", &json!({ "path": path }));
        Ok(())
    }

    fn hide(&mut self, path: &str) {
        if let Some(mounted) = self.pages.get_mut(path) {
            safe_execute(path, "onHide", || mounted.lifecycle.on_hide(&mut mounted.page));
            self.events.trigger("page:hide", &json!({ "path": path }));
        }
    }

    /// Run `on_unload` and hand the page back. Unmounting the current page
    /// leaves no page shown.
    pub fn unmount(&mut self, path: &str) -> Result<Page, ContextError> {
        let mut mounted = self
            .pages
            .remove(path)
            .ok_or_else(|| ContextError::UnknownPage(path.to_owned()))?;
        if self.current.as_deref() == Some(path) {
            safe_execute(path, "onHide", || mounted.lifecycle.on_hide(&mut mounted.page));
            self.events.trigger("page:hide", &json!({ "path": path }));
            self.current = None;
        }
        safe_execute(path, "onUnload", || mounted.lifecycle.on_unload(&mut mounted.page));
        self.events.trigger("page:unload", &json!({ "path": path }));
        debug!("unmounted page `{path}`");
        Ok(mounted.page)
    }
}
