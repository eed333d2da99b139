//! Transcript panel state machine.
//!
//! The transcript is not in the initial document: the description panel has
//! to be expanded, then the "show transcript" control clicked, before the
//! segments render. Each step is one transition of [`TranscriptState`], and a
//! step that cannot complete within the interaction timeout ends in
//! [`TranscriptState::Unavailable`].
use gleaner_common::settings::TranscriptSelectors;
use gleaner_common::{ExtractionResult, FieldDiagnostic, FieldFailure, TranscriptSegment};
use gleaner_drivers::{Page, PageElement};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptState {
    Start,
    DescriptionOpened,
    TranscriptRevealed,
    SegmentsScraped(Vec<TranscriptSegment>),
    /// The control or content expected by the next step never showed up.
    Unavailable { selector: String, reason: String },
}

impl TranscriptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranscriptState::SegmentsScraped(_) | TranscriptState::Unavailable { .. }
        )
    }

    /// Perform the single transition out of the current state. Terminal
    /// states return themselves.
    pub async fn advance<P: Page>(
        self,
        page: &P,
        selectors: &TranscriptSelectors,
        timeout: Duration,
    ) -> TranscriptState {
        let next = match self {
            TranscriptState::Start => {
                activate(page, &selectors.description_expander, timeout)
                    .await
                    .map(|()| TranscriptState::DescriptionOpened)
            }
            TranscriptState::DescriptionOpened => {
                activate(page, &selectors.transcript_button, timeout)
                    .await
                    .map(|()| TranscriptState::TranscriptRevealed)
            }
            TranscriptState::TranscriptRevealed => scrape_segments(page, selectors, timeout)
                .await
                .map(TranscriptState::SegmentsScraped),
            terminal => return terminal,
        };
        let next = next.unwrap_or_else(|(selector, reason)| TranscriptState::Unavailable {
            selector: selector.to_string(),
            reason,
        });
        debug!(target: "gleaner.transcript", state = ?next, "transcript transition");
        next
    }
}

/// Drive the state machine from [`TranscriptState::Start`] to a terminal state.
pub async fn extract_transcript<P: Page>(
    page: &P,
    selectors: &TranscriptSelectors,
    timeout: Duration,
) -> TranscriptState {
    let mut state = TranscriptState::Start;
    while !state.is_terminal() {
        state = state.advance(page, selectors, timeout).await;
    }
    state
}

/// Run the transcript sequence and record its outcome on `result`: the
/// segments on success, otherwise a diagnostic and no `transcript` field.
pub async fn attach_transcript<P: Page>(
    page: &P,
    selectors: &TranscriptSelectors,
    timeout: Duration,
    result: &mut ExtractionResult,
) {
    match extract_transcript(page, selectors, timeout).await {
        TranscriptState::SegmentsScraped(segments) => {
            info!(target: "gleaner.transcript", segments = segments.len(), "transcript scraped");
            result.transcript = Some(segments);
        }
        TranscriptState::Unavailable { selector, reason } => {
            info!(target: "gleaner.transcript", %selector, %reason, "transcript unavailable");
            result.diagnostics.push(FieldDiagnostic {
                property: "transcript".into(),
                selector,
                failure: FieldFailure::TranscriptUnavailable(reason),
            });
        }
        // extract_transcript only returns terminal states
        _ => {}
    }
}

type StepFailure<'a> = (&'a str, String);

async fn activate<'a, P: Page>(
    page: &P,
    selector: &'a str,
    timeout: Duration,
) -> Result<(), StepFailure<'a>> {
    let control = page
        .wait_for(selector, timeout)
        .await
        .map_err(|e| (selector, e.to_string()))?;
    match tokio::time::timeout(timeout, control.click()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err((selector, format!("click failed: {e}"))),
        Err(_) => Err((selector, "click did not complete in time".to_string())),
    }
}

async fn scrape_segments<'a, P: Page>(
    page: &P,
    selectors: &'a TranscriptSelectors,
    timeout: Duration,
) -> Result<Vec<TranscriptSegment>, StepFailure<'a>> {
    let segment_selector = selectors.segment.as_str();
    page.wait_for(segment_selector, timeout)
        .await
        .map_err(|e| (segment_selector, e.to_string()))?;
    let nodes = page
        .find_all(segment_selector)
        .await
        .map_err(|e| (segment_selector, e.to_string()))?;

    let mut segments = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let timestamp = child_text(node, &selectors.segment_timestamp).await;
        let text = child_text(node, &selectors.segment_text).await;
        if !text.is_empty() {
            segments.push(TranscriptSegment { timestamp, text });
        }
    }

    if segments.is_empty() {
        return Err((segment_selector, "segments rendered without text".into()));
    }
    Ok(segments)
}

async fn child_text<E: PageElement>(node: &E, selector: &str) -> String {
    match node.first(selector).await {
        Ok(Some(child)) => child
            .text()
            .await
            .map(|t| t.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_drivers::fake::{FakeNode, FakePage};

    fn selectors() -> TranscriptSelectors {
        TranscriptSelectors::default()
    }

    fn segment(ts: &str, text: &str) -> FakeNode {
        let s = selectors();
        FakeNode::new("")
            .with_child(&s.segment_timestamp, FakeNode::new(ts))
            .with_child(&s.segment_text, FakeNode::new(text))
    }

    fn video_page() -> FakePage {
        let s = selectors();
        let button = FakeNode::new("Show transcript")
            .reveals(&s.segment, segment("0:00", "Welcome back"))
            .reveals(&s.segment, segment("0:04", " today we look at rates "));
        FakePage::new().with(
            &s.description_expander,
            FakeNode::new("...more").reveals(&s.transcript_button, button),
        )
    }

    #[tokio::test]
    async fn walks_every_state_to_segments() {
        let page = video_page();
        let s = selectors();
        let timeout = Duration::from_millis(10);

        let state = TranscriptState::Start.advance(&page, &s, timeout).await;
        assert_eq!(state, TranscriptState::DescriptionOpened);
        let state = state.advance(&page, &s, timeout).await;
        assert_eq!(state, TranscriptState::TranscriptRevealed);
        let state = state.advance(&page, &s, timeout).await;

        assert_eq!(
            state,
            TranscriptState::SegmentsScraped(vec![
                TranscriptSegment {
                    timestamp: "0:00".into(),
                    text: "Welcome back".into()
                },
                TranscriptSegment {
                    timestamp: "0:04".into(),
                    text: "today we look at rates".into()
                },
            ])
        );
        assert!(state.is_terminal());
        assert_eq!(page.clicks(), 2);
    }

    #[tokio::test]
    async fn missing_transcript_control_is_unavailable() {
        let s = selectors();
        let page = FakePage::new().with(&s.description_expander, FakeNode::new("...more"));
        let state = extract_transcript(&page, &s, Duration::from_millis(10)).await;
        match state {
            TranscriptState::Unavailable { selector, .. } => {
                assert_eq!(selector, s.transcript_button)
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_transcript_leaves_field_absent() {
        let page = FakePage::new();
        let mut result =
            ExtractionResult::new(&url::Url::parse("https://www.youtube.com/watch?v=x").unwrap());
        result.fields.insert("title".into(), vec!["Video".into()]);

        attach_transcript(&page, &selectors(), Duration::from_millis(10), &mut result).await;

        assert!(result.transcript.is_none());
        assert_eq!(result.get("title"), Some(&["Video".to_string()][..]));
        assert!(matches!(
            result.diagnostics[0].failure,
            FieldFailure::TranscriptUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn terminal_states_do_not_move() {
        let page = FakePage::new();
        let done = TranscriptState::SegmentsScraped(vec![]);
        let again = done
            .clone()
            .advance(&page, &selectors(), Duration::from_millis(1))
            .await;
        assert_eq!(again, done);
    }
}
