//! Launch arguments and page-load evasions for each stealth level.
use gleaner_common::settings::{BrowserSettings, StealthLevel};
use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};

/// Levels of stealth applied to a browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StealthProfile {
    Lightweight,
    Balanced,
    Maximum,
}

impl From<StealthLevel> for StealthProfile {
    fn from(level: StealthLevel) -> Self {
        match level {
            StealthLevel::Lightweight => StealthProfile::Lightweight,
            StealthLevel::Balanced => StealthProfile::Balanced,
            StealthLevel::Maximum => StealthProfile::Maximum,
        }
    }
}

const HIDE_WEBDRIVER: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    if (!window.chrome) window.chrome = { runtime: {} };
"#;

const SPOOF_LANGUAGES: &str = r#"
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3] });
"#;

const SPOOF_WEBGL_VENDOR: &str = r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) return 'Intel Inc.';
        if (parameter === 37446) return 'Intel Iris OpenGL Engine';
        return getParameter.call(this, parameter);
    };
"#;

impl StealthProfile {
    /// Scripts run after every navigation.
    pub fn page_scripts(&self) -> Vec<&'static str> {
        match self {
            StealthProfile::Lightweight => vec![HIDE_WEBDRIVER],
            StealthProfile::Balanced => vec![HIDE_WEBDRIVER, SPOOF_LANGUAGES],
            StealthProfile::Maximum => vec![HIDE_WEBDRIVER, SPOOF_LANGUAGES, SPOOF_WEBGL_VENDOR],
        }
    }
}

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// The configured user agent, or one picked from the desktop pool.
pub fn pick_user_agent(settings: &BrowserSettings) -> String {
    settings.user_agent.clone().unwrap_or_else(|| {
        DESKTOP_USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(DESKTOP_USER_AGENTS[0])
            .to_string()
    })
}

/// Chrome command-line arguments for one session.
pub fn build_browser_arguments(settings: &BrowserSettings, user_agent: &str) -> Vec<String> {
    let profile = StealthProfile::from(settings.stealth);
    let (width, height) = settings.window_size;
    let mut args = vec![
        "--disable-dev-shm-usage".to_string(),
        "--disable-infobars".to_string(),
        "--lang=en-US,en".to_string(),
        format!("--window-size={width},{height}"),
        format!("--user-agent={user_agent}"),
    ];
    if profile != StealthProfile::Lightweight {
        args.push("--disable-blink-features=AutomationControlled".to_string());
        args.push("--disable-extensions".to_string());
    }
    if settings.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args.extend(settings.extra_args.iter().cloned());
    args
}
