//! Scripted in-memory page for tests.
//!
//! A [`FakePage`] is a flat map from exact selector strings to nodes. Nodes
//! may hold children (matched by [`PageElement::find_all`]) and may reveal
//! further nodes on the page when clicked or submitted with Enter. Selectors
//! that are absent time out immediately instead of waiting, unless a delay
//! was scripted for them with [`FakePage::with_delay`].
use crate::browser::page::{Page, PageElement};
use crate::error::DriverError;
use crate::session::{BrowserSession, Launcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One scripted element.
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    text: Option<String>,
    attrs: HashMap<String, String>,
    children: Vec<(String, FakeNode)>,
    on_activate: Vec<(String, FakeNode)>,
}

impl FakeNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A node whose text cannot be read.
    pub fn unreadable() -> Self {
        Self::default()
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, selector: &str, child: FakeNode) -> Self {
        self.children.push((selector.to_string(), child));
        self
    }

    /// Add `node` to the page under `selector` once this node is clicked or
    /// receives Enter.
    pub fn reveals(mut self, selector: &str, node: FakeNode) -> Self {
        self.on_activate.push((selector.to_string(), node));
        self
    }
}

#[derive(Debug, Default)]
struct FakeDom {
    nodes: HashMap<String, Vec<FakeNode>>,
    delays: HashMap<String, Duration>,
    page_text: String,
    page_source: String,
    navigation_failure: Option<String>,
    visited: Vec<String>,
    typed: Vec<String>,
    clicks: usize,
    scrolls: usize,
}

/// [`Page`] over a scripted DOM. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    dom: Arc<Mutex<FakeDom>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn dom(&self) -> MutexGuard<'_, FakeDom> {
        self.dom.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `node` to the matches for `selector`.
    pub fn with(self, selector: &str, node: FakeNode) -> Self {
        self.dom()
            .nodes
            .entry(selector.to_string())
            .or_default()
            .push(node);
        self
    }

    /// Make every `wait_for(selector)` take `delay` before it resolves.
    pub fn with_delay(self, selector: &str, delay: Duration) -> Self {
        self.dom().delays.insert(selector.to_string(), delay);
        self
    }

    pub fn with_page_text(self, text: impl Into<String>) -> Self {
        self.dom().page_text = text.into();
        self
    }

    pub fn with_page_source(self, markup: impl Into<String>) -> Self {
        self.dom().page_source = markup.into();
        self
    }

    pub fn failing_navigation(self, reason: impl Into<String>) -> Self {
        self.dom().navigation_failure = Some(reason.into());
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.dom().visited.clone()
    }

    /// Everything typed into any element, one entry per `type_text` call.
    pub fn typed(&self) -> Vec<String> {
        self.dom().typed.clone()
    }

    pub fn clicks(&self) -> usize {
        self.dom().clicks
    }

    pub fn scrolls(&self) -> usize {
        self.dom().scrolls
    }

    fn element(&self, node: FakeNode) -> FakeElement {
        FakeElement {
            node,
            page: self.clone(),
        }
    }
}

#[async_trait]
impl Page for FakePage {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let mut dom = self.dom();
        dom.visited.push(url.to_string());
        match &dom.navigation_failure {
            Some(reason) => Err(DriverError::Other(reason.clone())),
            None => Ok(()),
        }
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<FakeElement, DriverError> {
        let delay = self.dom().delays.get(selector).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay.min(timeout)).await;
            if delay > timeout {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    waited: timeout,
                });
            }
        }
        let first = self
            .dom()
            .nodes
            .get(selector)
            .and_then(|nodes| nodes.first().cloned());
        match first {
            Some(node) => Ok(self.element(node)),
            None => Err(DriverError::Timeout {
                selector: selector.to_string(),
                waited: timeout,
            }),
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeElement>, DriverError> {
        let nodes = self.dom().nodes.get(selector).cloned().unwrap_or_default();
        Ok(nodes.into_iter().map(|n| self.element(n)).collect())
    }

    async fn text_content(&self) -> Result<String, DriverError> {
        Ok(self.dom().page_text.clone())
    }

    async fn source(&self) -> Result<String, DriverError> {
        Ok(self.dom().page_source.clone())
    }

    async fn scroll_through(&self) -> Result<(), DriverError> {
        self.dom().scrolls += 1;
        Ok(())
    }
}

/// Handle to one [`FakeNode`] on a [`FakePage`].
#[derive(Debug, Clone)]
pub struct FakeElement {
    node: FakeNode,
    page: FakePage,
}

impl FakeElement {
    fn activate(&self) {
        let mut dom = self.page.dom();
        for (selector, node) in &self.node.on_activate {
            dom.nodes
                .entry(selector.clone())
                .or_default()
                .push(node.clone());
        }
    }
}

#[async_trait]
impl PageElement for FakeElement {
    async fn text(&self) -> Result<String, DriverError> {
        self.node
            .text
            .clone()
            .ok_or_else(|| DriverError::Other("stale element reference".into()))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError> {
        Ok(self.node.attrs.get(name).cloned())
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.page.dom().clicks += 1;
        self.activate();
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.page.dom().typed.push(text.to_string());
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), DriverError> {
        self.activate();
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeElement>, DriverError> {
        Ok(self
            .node
            .children
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, node)| self.page.element(node.clone()))
            .collect())
    }
}

/// [`Launcher`] handing out sessions over one shared [`FakePage`].
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    page: FakePage,
    failure: Option<String>,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    /// A launcher whose every launch fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self) -> Result<FakeSession, DriverError> {
        if let Some(reason) = &self.failure {
            return Err(DriverError::Other(reason.clone()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            page: self.page.clone(),
            closes: Arc::clone(&self.closes),
        })
    }
}

pub struct FakeSession {
    page: FakePage,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Page = FakePage;

    fn page(&self) -> FakePage {
        self.page.clone()
    }

    async fn close(self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
