//! Job dispatch: one target, one fresh session, one extractor.
use crate::alerts::search_and_scrape;
use crate::engine::extract;
use crate::feed::extract_feed;
use crate::transcript::attach_transcript;
use gleaner_common::settings::{AlertSettings, FeedSettings, RuleSet, Timeouts, TranscriptSelectors};
use gleaner_common::{AlertResult, ExtractionResult, FeedItem, FieldRule, GleanerError, Result};
use gleaner_drivers::{with_session, Launcher};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, info_span, Instrument};
use url::Url;

/// Which extractor a target is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Page,
    Video,
    Feed,
    Search,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Page => "page",
            JobKind::Video => "video",
            JobKind::Feed => "feed",
            JobKind::Search => "search",
        })
    }
}

/// A validated job target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTarget {
    Page(Url),
    Video(Url),
    Feed(Url),
    Search(String),
}

impl JobTarget {
    /// Validate `raw` for `kind`. URLs must be absolute `http`/`https`;
    /// search phrases must not be blank.
    pub fn parse(kind: JobKind, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GleanerError::InvalidTarget(format!("empty {kind} target")));
        }
        Ok(match kind {
            JobKind::Page => JobTarget::Page(web_url(raw)?),
            JobKind::Video => JobTarget::Video(web_url(raw)?),
            JobKind::Feed => JobTarget::Feed(web_url(raw)?),
            JobKind::Search => JobTarget::Search(raw.to_string()),
        })
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobTarget::Page(_) => JobKind::Page,
            JobTarget::Video(_) => JobKind::Video,
            JobTarget::Feed(_) => JobKind::Feed,
            JobTarget::Search(_) => JobKind::Search,
        }
    }
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobTarget::Page(url) | JobTarget::Video(url) | JobTarget::Feed(url) => {
                write!(f, "{url}")
            }
            JobTarget::Search(query) => write!(f, "{query:?}"),
        }
    }
}

fn web_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| GleanerError::InvalidTarget(format!("`{raw}` is not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(GleanerError::InvalidTarget(format!(
            "`{raw}` uses unsupported scheme `{other}`"
        ))),
    }
}

/// One bounded extraction request.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub target: JobTarget,
    /// Replaces the configured rule set (base and conditional) for page and
    /// video targets.
    pub rules: Option<Vec<FieldRule>>,
    pub timeout: Duration,
}

impl ExtractionJob {
    pub fn new(target: JobTarget, timeout: Duration) -> Self {
        Self {
            target,
            rules: None,
            timeout,
        }
    }

    pub fn with_rules(mut self, rules: Vec<FieldRule>) -> Self {
        self.rules = Some(rules);
        self
    }
}

/// What a job produced, tagged by shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum JobOutput {
    Page(ExtractionResult),
    Feed(Vec<FeedItem>),
    Alerts(Vec<AlertResult>),
}

impl JobOutput {
    /// Text a summarizer can work from.
    pub fn candidate_text(&self) -> String {
        match self {
            JobOutput::Page(result) => result.to_text(),
            JobOutput::Feed(items) => items
                .iter()
                .map(|i| match &i.published_at {
                    Some(at) => format!("{} ({at})\n{}\n{}", i.title, i.description, i.link),
                    None => format!("{}\n{}\n{}", i.title, i.description, i.link),
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
            JobOutput::Alerts(hits) => hits
                .iter()
                .map(|h| format!("{}\n{}\n{}", h.title, h.description, h.url))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// Everything the extractors read from configuration.
#[derive(Debug, Clone, Default)]
pub struct ExtractorSettings {
    pub timeouts: Timeouts,
    pub rules: RuleSet,
    pub feed: FeedSettings,
    pub transcript: TranscriptSelectors,
    pub alerts: AlertSettings,
    pub scroll_before_extract: bool,
}

/// Runs jobs, each in its own session from `launcher`.
pub struct Extractor<L> {
    launcher: L,
    settings: ExtractorSettings,
}

impl<L: Launcher> Extractor<L> {
    pub fn new(launcher: L, settings: ExtractorSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Shorthand for a job with the configured job timeout.
    pub fn job(&self, target: JobTarget) -> ExtractionJob {
        ExtractionJob::new(target, self.settings.timeouts.job())
    }

    pub async fn run(&self, job: ExtractionJob) -> Result<JobOutput> {
        let span = info_span!(
            target: "gleaner.job",
            "job",
            kind = %job.target.kind(),
            job_target = %job.target
        );
        let settings = &self.settings;
        let rules = match (&job.target, job.rules) {
            (_, Some(rules)) => rules,
            (JobTarget::Page(url) | JobTarget::Video(url), None) => {
                settings.rules.rules_for(url.as_str())?
            }
            _ => Vec::new(),
        };
        let target = job.target;

        async move {
            let output = with_session(&self.launcher, job.timeout, |page| async move {
                let timeouts = &settings.timeouts;
                match target {
                    JobTarget::Page(url) => {
                        extract(&page, &url, &rules, timeouts, settings.scroll_before_extract)
                            .await
                            .map(JobOutput::Page)
                    }
                    JobTarget::Video(url) => {
                        let mut result =
                            extract(&page, &url, &rules, timeouts, settings.scroll_before_extract)
                                .await?;
                        attach_transcript(
                            &page,
                            &settings.transcript,
                            timeouts.interaction(),
                            &mut result,
                        )
                        .await;
                        Ok(JobOutput::Page(result))
                    }
                    JobTarget::Feed(url) => {
                        extract_feed(&page, &url, &settings.feed, timeouts.navigation())
                            .await
                            .map(JobOutput::Feed)
                    }
                    JobTarget::Search(query) => {
                        search_and_scrape(&page, &query, &settings.alerts, timeouts)
                            .await
                            .map(JobOutput::Alerts)
                    }
                }
            })
            .await?;
            info!(target: "gleaner.job", "job finished");
            Ok(output)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_and_non_web_targets() {
        assert!(matches!(
            JobTarget::parse(JobKind::Page, "  "),
            Err(GleanerError::InvalidTarget(_))
        ));
        assert!(matches!(
            JobTarget::parse(JobKind::Feed, "ftp://example.com/feed"),
            Err(GleanerError::InvalidTarget(_))
        ));
        assert!(matches!(
            JobTarget::parse(JobKind::Video, "not a url"),
            Err(GleanerError::InvalidTarget(_))
        ));
        assert!(matches!(
            JobTarget::parse(JobKind::Search, "\t"),
            Err(GleanerError::InvalidTarget(_))
        ));
    }

    #[test]
    fn search_phrases_are_trimmed() {
        assert_eq!(
            JobTarget::parse(JobKind::Search, "  rate cut ").unwrap(),
            JobTarget::Search("rate cut".into())
        );
    }

    #[test]
    fn output_serializes_with_kind_tag() {
        let out = JobOutput::Alerts(vec![AlertResult {
            title: "t".into(),
            description: "d".into(),
            url: "https://u".into(),
        }]);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["kind"], "alerts");
        assert_eq!(json["data"][0]["url"], "https://u");
    }
}
