//! Typed settings sections.
//!
//! Each section deserializes with defaults so partial YAML documents are
//! valid. `gleaner-config` assembles them into one document.
use crate::model::FieldRule;
use crate::GleanerError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    #[default]
    Balanced,
    Maximum,
}

/// How a browser session is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// WebDriver endpoint (Chromedriver by default).
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    pub window_size: (u32, u32),
    /// Overrides the user agent picked from the built-in desktop pool.
    pub user_agent: Option<String>,
    /// Host-specific flags (sandbox policy, binary quirks) appended verbatim.
    pub extra_args: Vec<String>,
    /// Scroll to the bottom and back before reading fields so lazy content loads.
    pub scroll_before_extract: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            stealth: StealthLevel::Balanced,
            window_size: (1920, 1080),
            user_agent: None,
            extra_args: Vec::new(),
            scroll_before_extract: true,
        }
    }
}

/// Timeouts in milliseconds, one per cancellation granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub job_ms: u64,
    pub navigation_ms: u64,
    pub selector_ms: u64,
    pub interaction_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            job_ms: 120_000,
            navigation_ms: 30_000,
            selector_ms: 5_000,
            interaction_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn job(&self) -> Duration {
        Duration::from_millis(self.job_ms)
    }
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }
    pub fn selector(&self) -> Duration {
        Duration::from_millis(self.selector_ms)
    }
    pub fn interaction(&self) -> Duration {
        Duration::from_millis(self.interaction_ms)
    }
}

/// Feed recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Opening tags that mark the start of feed markup, e.g. `<rss`.
    pub root_markers: Vec<String>,
    /// Named entities left unescaped by the sanitizer, with the text they
    /// resolve to when parsed.
    pub allowed_entities: BTreeMap<String, String>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            root_markers: vec!["<rss".into(), "<feed".into(), "<rdf:RDF".into()],
            allowed_entities: BTreeMap::from([("nbsp".to_string(), "\u{a0}".to_string())]),
        }
    }
}

/// Selectors for the video transcript UI sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSelectors {
    pub description_expander: String,
    pub transcript_button: String,
    pub segment: String,
    pub segment_timestamp: String,
    pub segment_text: String,
}

impl Default for TranscriptSelectors {
    fn default() -> Self {
        Self {
            description_expander: "#description-inline-expander #expand".into(),
            transcript_button: "ytd-video-description-transcript-section-renderer button".into(),
            segment: "ytd-transcript-segment-renderer".into(),
            segment_timestamp: ".segment-timestamp".into(),
            segment_text: ".segment-text".into(),
        }
    }
}

/// Search/alert site description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub url: String,
    pub search_input: String,
    pub results_container: String,
    /// Present only when the site reports no results in range.
    pub empty_marker: String,
    pub item: String,
    pub title: String,
    pub description: String,
    /// Element whose `href` is the result URL.
    pub link: String,
    pub submit_with_enter: bool,
    pub max_results: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            url: "https://www.google.com/alerts".into(),
            search_input: "#query_div input".into(),
            results_container: "#preview_results".into(),
            empty_marker: "#preview_results .empty_result".into(),
            item: "#preview_results li.result".into(),
            title: "a.result_title_link".into(),
            description: ".snippet".into(),
            link: "a.result_title_link".into(),
            submit_with_enter: true,
            max_results: 20,
        }
    }
}

/// Extra rules activated when the target matches `pattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalRules {
    pub pattern: String,
    pub rules: Vec<FieldRule>,
}

/// Base rules plus conditionally activated groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub base: Vec<FieldRule>,
    pub conditional: Vec<ConditionalRules>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            base: vec![
                FieldRule::single("title", "head title").with_fallback("textContent"),
                FieldRule::single("description", r#"meta[name="description"]"#)
                    .with_fallback("content"),
                FieldRule::single("article", "article"),
                FieldRule::single("main", "main"),
                FieldRule::multi("paragraphs", "p"),
                FieldRule::multi("headers", "h1"),
                FieldRule::multi("headers", "h2"),
                FieldRule::multi("headers", "h3"),
            ],
            conditional: vec![
                ConditionalRules {
                    pattern: r"(?i)^https?://([a-z0-9-]+\.)*yahoo\.com/".into(),
                    rules: vec![
                        FieldRule::single("price", r#"[data-test="qsp-price"]"#),
                        FieldRule::single("summary", "#quote-summary"),
                        FieldRule::single(
                            "statistics",
                            r#"#quote-summary [data-test="qsp-statistics"]"#,
                        ),
                    ],
                },
                ConditionalRules {
                    pattern: r"(?i)^https?://(www\.|m\.)?(youtube\.com/watch|youtu\.be/)".into(),
                    rules: vec![
                        FieldRule::single("description", "#description-inline-expander"),
                        FieldRule::multi("related_links", "ytd-compact-video-renderer a#thumbnail")
                            .with_fallback("href"),
                    ],
                },
            ],
        }
    }
}

impl RuleSet {
    /// Base rules followed by every conditional group whose pattern matches
    /// `target`.
    pub fn rules_for(&self, target: &str) -> crate::Result<Vec<FieldRule>> {
        let mut rules = self.base.clone();
        for group in &self.conditional {
            if compile(&group.pattern)?.is_match(target) {
                rules.extend(group.rules.iter().cloned());
            }
        }
        Ok(rules)
    }

    /// Check that every conditional pattern compiles.
    pub fn validate(&self) -> crate::Result<()> {
        self.conditional
            .iter()
            .try_for_each(|group| compile(&group.pattern).map(|_| ()))
    }
}

fn compile(pattern: &str) -> crate::Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| GleanerError::Config(format!("invalid rule pattern `{pattern}`: {e}")))
}

/// Summarizer backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmSettings {
    Ollama {
        model: String,
        #[serde(default = "default_ollama_endpoint")]
        endpoint: String,
        /// Pull the model when the server does not have it yet.
        #[serde(default = "default_true")]
        pull_missing: bool,
        #[serde(default = "default_llm_request_secs")]
        request_timeout_secs: u64,
    },
    #[default]
    None,
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}

fn default_llm_request_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_targets_activate_extra_rules() {
        let rules = RuleSet::default();
        let video = rules
            .rules_for("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .unwrap();
        assert!(video.iter().any(|r| r.property_name == "related_links"));

        let plain = rules.rules_for("https://example.com/").unwrap();
        assert_eq!(plain.len(), rules.base.len());
    }

    #[test]
    fn yahoo_subdomains_activate_quote_rules() {
        let rules = RuleSet::default()
            .rules_for("https://finance.yahoo.com/quote/MSFT")
            .unwrap();
        assert!(rules.iter().any(|r| r.property_name == "price"));
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let rules = RuleSet {
            base: vec![],
            conditional: vec![ConditionalRules {
                pattern: "(".into(),
                rules: vec![],
            }],
        };
        assert!(matches!(rules.validate(), Err(GleanerError::Config(_))));
        assert!(rules.rules_for("https://x").is_err());
    }

    #[test]
    fn default_feed_allow_list_keeps_nbsp() {
        let feed = FeedSettings::default();
        assert_eq!(feed.allowed_entities.get("nbsp").map(String::as_str), Some("\u{a0}"));
    }
}
