//! Scoped browser sessions.
//!
//! A job never sees a [`BrowserSession`] directly: [`with_session`] opens one,
//! lends its page to the job, and closes it afterwards whether the job
//! returned, failed, ran out of time, panicked, or was dropped by its caller.
use crate::browser::page::Page;
use crate::error::DriverError;
use async_trait::async_trait;
use futures::FutureExt;
use gleaner_common::{GleanerError, Result};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Opens fresh, isolated browser sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> std::result::Result<Self::Session, DriverError>;
}

/// One live browser session, owned by exactly one job.
#[async_trait]
pub trait BrowserSession: Send + Sized + 'static {
    type Page: Page;

    /// Handle to the session's page. Only valid until [`Self::close`].
    fn page(&self) -> Self::Page;

    async fn close(self) -> std::result::Result<(), DriverError>;
}

/// Owns a session until it is closed. If the owning future is dropped
/// before that, the session is closed from `Drop`.
struct SessionGuard<S: BrowserSession> {
    session: Option<S>,
}

impl<S: BrowserSession> SessionGuard<S> {
    async fn release(mut self) {
        if let Some(session) = self.session.take() {
            close_session(session).await;
        }
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        warn!(target: "gleaner.session", "job abandoned before completion, closing session");
        let Ok(handle) = Handle::try_current() else {
            warn!(target: "gleaner.session", "no runtime left to close the session");
            return;
        };
        let close = close_session(session).instrument(Span::current());
        match handle.runtime_flavor() {
            // Finish the close before the caller moves on (e.g. the process exits).
            RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| handle.block_on(close)),
            _ => {
                handle.spawn(close);
            }
        }
    }
}

async fn close_session<S: BrowserSession>(session: S) {
    match session.close().await {
        Ok(()) => debug!(target: "gleaner.session", "session closed"),
        Err(e) => warn!(target: "gleaner.session", error = %e, "failed to close session"),
    }
}

/// Run `job` against a page from a new session and release the session on
/// every exit path, including the returned future being dropped.
///
/// The job is bounded by `job_timeout`; running past it yields
/// [`GleanerError::JobTimeout`]. A failure to close is logged, not returned,
/// so it never masks the job's own outcome.
pub async fn with_session<L, T, F, Fut>(launcher: &L, job_timeout: Duration, job: F) -> Result<T>
where
    L: Launcher,
    F: FnOnce(<L::Session as BrowserSession>::Page) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let session_id = Uuid::new_v4();
    let span = info_span!(target: "gleaner.session", "session", %session_id);

    async move {
        let session = launcher
            .launch()
            .await
            .map_err(|e| GleanerError::Session(e.to_string()))?;
        debug!(target: "gleaner.session", "session opened");
        let page = session.page();
        let guard = SessionGuard {
            session: Some(session),
        };

        let outcome = AssertUnwindSafe(tokio::time::timeout(job_timeout, job(page)))
            .catch_unwind()
            .await;

        guard.release().await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => {
                warn!(
                    target: "gleaner.session",
                    timeout_ms = job_timeout.as_millis() as u64,
                    "job deadline exceeded"
                );
                Err(GleanerError::JobTimeout(job_timeout.as_millis() as u64))
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeLauncher, FakePage};

    #[tokio::test]
    async fn closes_after_success() {
        let launcher = FakeLauncher::new(FakePage::new());
        let value = with_session(&launcher, Duration::from_secs(1), |_page| async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn closes_after_failure() {
        let launcher = FakeLauncher::new(FakePage::new());
        let err = with_session(&launcher, Duration::from_secs(1), |_page| async {
            Err::<(), _>(GleanerError::FeedParse("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GleanerError::FeedParse(_)));
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn closes_after_timeout() {
        let launcher = FakeLauncher::new(FakePage::new());
        let err = with_session(&launcher, Duration::from_millis(20), |_page| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GleanerError::JobTimeout(20)));
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn closes_after_panic() {
        let launcher = FakeLauncher::new(FakePage::new());
        let joined = AssertUnwindSafe(with_session(
            &launcher,
            Duration::from_secs(1),
            |_page| async {
                panic!("extractor bug");
                #[allow(unreachable_code)]
                Ok(())
            },
        ))
        .catch_unwind()
        .await;
        assert!(joined.is_err());
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn launch_failure_is_a_session_error() {
        let launcher = FakeLauncher::failing("connection refused");
        let err = with_session(&launcher, Duration::from_secs(1), |_page| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GleanerError::Session(_)));
        assert_eq!(launcher.closes(), 0);
    }

    #[tokio::test]
    async fn sessions_are_not_reused() {
        let launcher = FakeLauncher::new(FakePage::new());
        for _ in 0..3 {
            with_session(&launcher, Duration::from_secs(1), |_page| async { Ok(()) })
                .await
                .unwrap();
        }
        assert_eq!(launcher.launches(), 3);
        assert_eq!(launcher.closes(), 3);
    }

    #[tokio::test]
    async fn closes_when_the_caller_gives_up() {
        let launcher = FakeLauncher::new(FakePage::new());
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            with_session(&launcher, Duration::from_secs(10), |_page| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(launcher.launches(), 1);

        // Single-threaded runtimes close on a spawned task.
        for _ in 0..50 {
            if launcher.closes() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closes_before_returning_when_dropped_on_a_worker_pool() {
        let launcher = FakeLauncher::new(FakePage::new());
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            with_session(&launcher, Duration::from_secs(10), |_page| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(launcher.closes(), 1);
    }
}
