use crate::browser::{behavioral::BehavioralEngine, stealth::StealthProfile};
use crate::error::DriverError;
use async_trait::async_trait;
use fantoccini::{elements::Element, error::CmdError, Client, Locator};
use std::time::Duration;
use tracing::debug;

/// WebDriver key code for Enter.
const ENTER_KEY: &str = "\u{E007}";

const PAGE_TEXT_SCRIPT: &str = r#"
    const root = document.body || document.documentElement;
    return root ? (root.innerText || root.textContent || "") : "";
"#;

/// What extractors need from a loaded page.
///
/// Implementations hand out element handles that are only valid for the
/// lifetime of the session the page belongs to.
#[async_trait]
pub trait Page: Send + Sync {
    type Element: PageElement;

    /// Load `url`. Callers bound the wait themselves.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Wait up to `timeout` for `selector` and return its first match.
    async fn wait_for(&self, selector: &str, timeout: Duration)
        -> Result<Self::Element, DriverError>;

    /// Every element currently matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>, DriverError>;

    /// Rendered text of the whole document.
    async fn text_content(&self) -> Result<String, DriverError>;

    /// Serialized markup of the current document, as the browser holds it.
    async fn source(&self) -> Result<String, DriverError>;

    /// Scroll to the bottom and back so lazily loaded content renders.
    async fn scroll_through(&self) -> Result<(), DriverError>;
}

/// One element of a [`Page`].
#[async_trait]
pub trait PageElement: Send + Sync + Sized {
    async fn text(&self) -> Result<String, DriverError>;

    /// Attribute value, falling back to the DOM property of the same name.
    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError>;

    async fn click(&self) -> Result<(), DriverError>;

    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    async fn press_enter(&self) -> Result<(), DriverError>;

    /// Descendants matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Self>, DriverError>;

    /// First descendant matching `selector`, if any.
    async fn first(&self, selector: &str) -> Result<Option<Self>, DriverError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }
}

/// [`Page`] backed by a live WebDriver session.
#[derive(Clone)]
pub struct GleanerPage {
    pub(crate) client: Client,
    pub(crate) stealth_profile: StealthProfile,
    pub(crate) behavioral_engine: BehavioralEngine,
}

impl GleanerPage {
    pub fn new(
        client: Client,
        stealth_profile: StealthProfile,
        behavioral_engine: BehavioralEngine,
    ) -> Self {
        Self {
            client,
            stealth_profile,
            behavioral_engine,
        }
    }

    async fn apply_evasions(&self) {
        for script in self.stealth_profile.page_scripts() {
            if let Err(e) = self.client.execute(script, vec![]).await {
                debug!(target: "gleaner.session", error = %e, "evasion script rejected");
            }
        }
    }

    fn wrap(&self, element: Element) -> GleanerElement {
        GleanerElement::new(element, &self.behavioral_engine)
    }
}

#[async_trait]
impl Page for GleanerPage {
    type Element = GleanerElement;

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.behavioral_engine.pause_before_navigation().await;
        self.client.goto(url).await?;
        self.apply_evasions().await;
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<GleanerElement, DriverError> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(element) => Ok(self.wrap(element)),
            Err(CmdError::WaitTimeout) => Err(DriverError::Timeout {
                selector: selector.to_string(),
                waited: timeout,
            }),
            Err(e) if e.is_no_such_element() => Err(DriverError::NotFound(selector.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<GleanerElement>, DriverError> {
        let elements = self.client.find_all(Locator::Css(selector)).await?;
        Ok(elements.into_iter().map(|e| self.wrap(e)).collect())
    }

    async fn text_content(&self) -> Result<String, DriverError> {
        match self.client.execute(PAGE_TEXT_SCRIPT, vec![]).await? {
            serde_json::Value::String(text) => Ok(text),
            other => Err(DriverError::Other(format!(
                "page text script returned {other}"
            ))),
        }
    }

    async fn source(&self) -> Result<String, DriverError> {
        Ok(self.client.source().await?)
    }

    async fn scroll_through(&self) -> Result<(), DriverError> {
        self.client
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
        self.behavioral_engine.pause_for_lazy_content().await;
        self.client.execute("window.scrollTo(0, 0);", vec![]).await?;
        Ok(())
    }
}

/// [`PageElement`] backed by a WebDriver element reference.
#[derive(Clone)]
pub struct GleanerElement {
    pub element: Element,
    pub behavioral_engine: BehavioralEngine,
}

impl GleanerElement {
    pub fn new(element: Element, behavioral: &BehavioralEngine) -> Self {
        Self {
            element,
            behavioral_engine: behavioral.clone(),
        }
    }
}

#[async_trait]
impl PageElement for GleanerElement {
    async fn text(&self) -> Result<String, DriverError> {
        Ok(self.element.text().await?)
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError> {
        match self.element.attr(name).await? {
            Some(value) => Ok(Some(value)),
            None => Ok(self.element.prop(name).await?),
        }
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.element.click().await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.behavioral_engine
            .type_text_human_like(&self.element, text)
            .await
    }

    async fn press_enter(&self) -> Result<(), DriverError> {
        self.element.send_keys(ENTER_KEY).await?;
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<GleanerElement>, DriverError> {
        let elements = self.element.find_all(Locator::Css(selector)).await?;
        Ok(elements
            .into_iter()
            .map(|element| GleanerElement::new(element, &self.behavioral_engine))
            .collect())
    }
}
