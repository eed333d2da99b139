use anyhow::{Context, Result};
use clap::Parser;
use gleaner_common::observability::{LogConfig, LogFormat, init_logging};
use gleaner_config::{GleanerConfig, GleanerConfigLoader, load_rules_file};
use gleaner_drivers::browser::driver::WebDriverLauncher;
use gleaner_extract::{Extractor, JobOutput};
use serde::Serialize;

mod cli;
use cli::{Cli, extractor_settings};

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    output: &'a JobOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let loader = match &cli.config {
        Some(path) => GleanerConfigLoader::new().with_file(path),
        None => GleanerConfigLoader::new().with_optional_file("gleaner.yaml"),
    };
    let cfg: GleanerConfig = loader.load().context("loading configuration")?;

    let log_path = init_logging(LogConfig {
        log_dir: cli.log_dir.clone(),
        emit_stderr: cli.verbose,
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        default_filter: if cli.verbose { "debug" } else { "info" },
        ..LogConfig::default()
    })?;
    tracing::debug!(log = %log_path.display(), "logging initialised");

    // 2) Validate the target before any browser is started
    let target = cli.command.target()?;
    let launcher = WebDriverLauncher::new(cfg.browser.clone());
    let extractor = Extractor::new(launcher, extractor_settings(&cfg));
    let mut job = extractor.job(target);
    if let Some(path) = cli.command.rules_file() {
        let rules = load_rules_file(path)
            .with_context(|| format!("loading rules from {}", path.display()))?;
        job = job.with_rules(rules);
    }

    // 3) Run one job in its own session; Ctrl-C drops the job, which closes the session
    let output = tokio::select! {
        output = extractor.run(job) => output?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(target: "gleaner.job", "interrupted, releasing browser session");
            anyhow::bail!("interrupted");
        }
    };

    // 4) Optional summary against the caller's message
    let summary = match &cli.summarize_against {
        Some(reference) => {
            let client = gleaner_llm::ensure_llm_ready(&cfg.llm).await?;
            Some(
                client
                    .summarize_relevant(&output.candidate_text(), reference)
                    .await?,
            )
        }
        None => None,
    };

    let report = Report {
        output: &output,
        summary,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
