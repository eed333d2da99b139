//! Declarative per-field extraction.
//!
//! One generic interpreter evaluates a table of [`FieldRule`]s. Rules run
//! concurrently after navigation; a rule that fails only drops its own
//! property and leaves a [`FieldDiagnostic`] behind.
use futures::future::join_all;
use gleaner_common::settings::Timeouts;
use gleaner_common::{
    ExtractionResult, FieldDiagnostic, FieldFailure, FieldRule, GleanerError, Result,
};
use gleaner_drivers::{DriverError, Page, PageElement};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Load `url`, bounded by `timeout`. Any failure is fatal for the job.
pub async fn navigate<P: Page>(page: &P, url: &Url, timeout: Duration) -> Result<()> {
    let reason = match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {} ms", timeout.as_millis()),
    };
    warn!(target: "gleaner.job", %url, %reason, "navigation failed");
    Err(GleanerError::Navigation {
        url: url.to_string(),
        reason,
    })
}

/// Navigate to `url` and evaluate every rule against the loaded page.
///
/// Only navigation can fail the call. With `scroll` set the page is scrolled
/// through first so lazily rendered content is present.
pub async fn extract<P: Page>(
    page: &P,
    url: &Url,
    rules: &[FieldRule],
    timeouts: &Timeouts,
    scroll: bool,
) -> Result<ExtractionResult> {
    navigate(page, url, timeouts.navigation()).await?;
    if scroll {
        if let Err(e) = page.scroll_through().await {
            debug!(target: "gleaner.selector", error = %e, "scroll before extraction failed");
        }
    }
    let mut result = ExtractionResult::new(url);
    read_fields(page, rules, timeouts.selector(), &mut result).await;
    Ok(result)
}

/// Evaluate `rules` concurrently and fold their outcomes into `result` in
/// rule order, so rules sharing a property append to one entry.
pub async fn read_fields<P: Page>(
    page: &P,
    rules: &[FieldRule],
    selector_timeout: Duration,
    result: &mut ExtractionResult,
) {
    let outcomes = join_all(
        rules
            .iter()
            .map(|rule| evaluate_rule(page, rule, selector_timeout)),
    )
    .await;

    for (rule, outcome) in rules.iter().zip(outcomes) {
        match outcome {
            Ok(values) => result
                .fields
                .entry(rule.property_name.clone())
                .or_default()
                .extend(values),
            Err(failure) => {
                warn!(
                    target: "gleaner.selector",
                    property = %rule.property_name,
                    selector = %rule.selector,
                    reason = %failure,
                    "field extraction failed"
                );
                result.diagnostics.push(FieldDiagnostic {
                    property: rule.property_name.clone(),
                    selector: rule.selector.clone(),
                    failure,
                });
            }
        }
    }
}

async fn evaluate_rule<P: Page>(
    page: &P,
    rule: &FieldRule,
    timeout: Duration,
) -> std::result::Result<Vec<String>, FieldFailure> {
    let first = page
        .wait_for(&rule.selector, timeout)
        .await
        .map_err(failure_from)?;

    let elements = if rule.multi_valued {
        match page.find_all(&rule.selector).await.map_err(failure_from)? {
            found if found.is_empty() => vec![first],
            found => found,
        }
    } else {
        vec![first]
    };

    let mut values = Vec::with_capacity(elements.len());
    let mut last_error = None;
    for element in &elements {
        match read_value(element, rule.attribute_fallback.as_deref()).await {
            Ok(Some(value)) => values.push(value),
            Ok(None) => {}
            Err(e) => last_error = Some(e),
        }
    }

    match (values.is_empty(), last_error) {
        (false, _) => Ok(values),
        (true, Some(e)) => Err(FieldFailure::ReadFailed(e.to_string())),
        (true, None) => Err(FieldFailure::SelectorNotFound),
    }
}

/// Trimmed inner text, or the fallback attribute when the text is empty.
async fn read_value<E: PageElement>(
    element: &E,
    fallback: Option<&str>,
) -> std::result::Result<Option<String>, DriverError> {
    let text = element.text().await?;
    let text = text.trim();
    if !text.is_empty() {
        return Ok(Some(text.to_string()));
    }
    let Some(name) = fallback else {
        return Ok(None);
    };
    Ok(element
        .attribute(name)
        .await?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

fn failure_from(error: DriverError) -> FieldFailure {
    match error {
        DriverError::Timeout { waited, .. } => FieldFailure::SelectorTimeout {
            waited_ms: waited.as_millis() as u64,
        },
        DriverError::NotFound(_) => FieldFailure::SelectorNotFound,
        other => FieldFailure::ReadFailed(other.to_string()),
    }
}
