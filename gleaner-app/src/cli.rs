use clap::{Parser, Subcommand};
use gleaner_common::Result;
use gleaner_config::GleanerConfig;
use gleaner_extract::{ExtractorSettings, JobKind, JobTarget};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gleaner",
    about = "Extract structured content from one page, video, feed, or alert search",
    version
)]
pub struct Cli {
    /// Configuration file (YAML). Defaults to ./gleaner.yaml when present.
    #[arg(long, short, global = true, env = "GLEANER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Summarize the result against this message using the configured LLM
    #[arg(long, global = true, value_name = "MESSAGE")]
    pub summarize_against: Option<String>,

    /// Mirror logs to stderr at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Directory for the rolling log file
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract fields from a web page
    Page {
        url: String,
        /// YAML file with a top-level `rules:` list replacing the configured rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Extract fields and the transcript from a video page
    Video {
        url: String,
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Parse the RSS/Atom feed rendered at a URL
    Feed { url: String },
    /// Submit a query to the alert site and list the results
    Alerts { query: String },
}

impl Commands {
    pub fn target(&self) -> Result<JobTarget> {
        match self {
            Commands::Page { url, .. } => JobTarget::parse(JobKind::Page, url),
            Commands::Video { url, .. } => JobTarget::parse(JobKind::Video, url),
            Commands::Feed { url } => JobTarget::parse(JobKind::Feed, url),
            Commands::Alerts { query } => JobTarget::parse(JobKind::Search, query),
        }
    }

    pub fn rules_file(&self) -> Option<&PathBuf> {
        match self {
            Commands::Page { rules, .. } | Commands::Video { rules, .. } => rules.as_ref(),
            _ => None,
        }
    }
}

pub fn extractor_settings(cfg: &GleanerConfig) -> ExtractorSettings {
    ExtractorSettings {
        timeouts: cfg.timeouts.clone(),
        rules: cfg.rules.clone(),
        feed: cfg.feed.clone(),
        transcript: cfg.transcript.clone(),
        alerts: cfg.alerts.clone(),
        scroll_before_extract: cfg.browser.scroll_before_extract,
    }
}
