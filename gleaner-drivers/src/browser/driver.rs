use crate::browser::{
    behavioral::BehavioralEngine,
    page::GleanerPage,
    stealth::{build_browser_arguments, pick_user_agent, StealthProfile},
};
use crate::error::DriverError;
use crate::session::{BrowserSession, Launcher};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use gleaner_common::settings::BrowserSettings;
use serde_json::json;
use tracing::debug;
use webdriver::capabilities::Capabilities;

/// Opens a brand-new Chrome session against a running WebDriver service for
/// every [`Launcher::launch`].
///
/// Default endpoint is `http://localhost:9515` (Chromedriver); see
/// [`BrowserSettings::webdriver_url`].
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    settings: BrowserSettings,
    behavioral_engine: BehavioralEngine,
}

impl WebDriverLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            behavioral_engine: BehavioralEngine::new(),
        }
    }

    fn capabilities(&self) -> Capabilities {
        let user_agent = pick_user_agent(&self.settings);
        let args = build_browser_arguments(&self.settings, &user_agent);

        let mut caps = Capabilities::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "excludeSwitches": ["enable-automation"],
            }),
        );
        caps
    }
}

#[async_trait]
impl Launcher for WebDriverLauncher {
    type Session = WebDriverSession;

    async fn launch(&self) -> Result<WebDriverSession, DriverError> {
        debug!(
            target: "gleaner.session",
            webdriver_url = %self.settings.webdriver_url,
            headless = self.settings.headless,
            "connecting to webdriver"
        );
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.settings.webdriver_url)
            .await?;

        Ok(WebDriverSession {
            client,
            stealth_profile: StealthProfile::from(self.settings.stealth),
            behavioral_engine: self.behavioral_engine.clone(),
        })
    }
}

/// A live WebDriver session. Closing it ends the browser process.
pub struct WebDriverSession {
    client: Client,
    stealth_profile: StealthProfile,
    behavioral_engine: BehavioralEngine,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    type Page = GleanerPage;

    fn page(&self) -> GleanerPage {
        GleanerPage::new(
            self.client.clone(),
            self.stealth_profile,
            self.behavioral_engine.clone(),
        )
    }

    async fn close(self) -> Result<(), DriverError> {
        self.client.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_carry_chrome_arguments() {
        let settings = BrowserSettings {
            user_agent: Some("TestAgent/1.0".into()),
            extra_args: vec!["--no-sandbox".into()],
            ..BrowserSettings::default()
        };
        let caps = WebDriverLauncher::new(settings).capabilities();
        let args = caps["goog:chromeOptions"]["args"]
            .as_array()
            .expect("args array");
        let args: Vec<&str> = args.iter().filter_map(|a| a.as_str()).collect();
        assert!(args.contains(&"--user-agent=TestAgent/1.0"));
        assert!(args.contains(&"--headless=new"));
        assert_eq!(args.last(), Some(&"--no-sandbox"));
    }
}
