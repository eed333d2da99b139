//! Search/alert result scraping.
use crate::engine::navigate;
use gleaner_common::settings::{AlertSettings, Timeouts};
use gleaner_common::{AlertResult, GleanerError, Result};
use gleaner_drivers::{DriverError, Page, PageElement};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

/// Submit `query` on the configured alert site and read the result list.
///
/// An empty vector means the site reported no results in range. Failing to
/// drive the form is a [`GleanerError::SearchInteraction`], never an empty
/// vector.
pub async fn search_and_scrape<P: Page>(
    page: &P,
    query: &str,
    settings: &AlertSettings,
    timeouts: &Timeouts,
) -> Result<Vec<AlertResult>> {
    let site = Url::parse(&settings.url)
        .map_err(|e| GleanerError::Config(format!("alerts.url `{}`: {e}", settings.url)))?;
    navigate(page, &site, timeouts.navigation()).await?;

    let input = page
        .wait_for(&settings.search_input, timeouts.interaction())
        .await
        .map_err(|e| interaction_failure("search input not found", e))?;
    input
        .type_text(query)
        .await
        .map_err(|e| interaction_failure("typing the query failed", e))?;
    if settings.submit_with_enter {
        input
            .press_enter()
            .await
            .map_err(|e| interaction_failure("submitting the query failed", e))?;
    }

    page.wait_for(&settings.results_container, timeouts.interaction())
        .await
        .map_err(|e| interaction_failure("results never rendered", e))?;

    if !page
        .find_all(&settings.empty_marker)
        .await
        .map_err(|e| interaction_failure("could not check for the empty marker", e))?
        .is_empty()
    {
        info!(target: "gleaner.alerts", query, "no results in range");
        return Ok(Vec::new());
    }

    let items = page
        .find_all(&settings.item)
        .await
        .map_err(|e| interaction_failure("could not list results", e))?;

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for item in &items {
        if results.len() >= settings.max_results {
            break;
        }
        match read_item(item, settings).await {
            Ok(Some(hit)) if seen.insert(hit.url.clone()) => results.push(hit),
            Ok(_) => {}
            Err(e) => debug!(target: "gleaner.alerts", error = %e, "skipping unreadable result"),
        }
    }
    info!(target: "gleaner.alerts", query, results = results.len(), "alert results scraped");
    Ok(results)
}

fn interaction_failure(step: &str, error: DriverError) -> GleanerError {
    warn!(target: "gleaner.alerts", step, %error, "search interaction failed");
    GleanerError::SearchInteraction(format!("{step}: {error}"))
}

/// Title, snippet, and link of one result; `None` when it has no link.
async fn read_item<E: PageElement>(
    item: &E,
    settings: &AlertSettings,
) -> std::result::Result<Option<AlertResult>, DriverError> {
    let title = match item.first(&settings.title).await? {
        Some(el) => el.text().await?.trim().to_string(),
        None => String::new(),
    };
    let description = match item.first(&settings.description).await? {
        Some(el) => el.text().await?.trim().to_string(),
        None => String::new(),
    };
    let url = match item.first(&settings.link).await? {
        Some(el) => el.attribute("href").await?.unwrap_or_default(),
        None => String::new(),
    };
    let url = url.trim();
    if url.is_empty() {
        return Ok(None);
    }
    Ok(Some(AlertResult {
        title,
        description,
        url: url.to_string(),
    }))
}
