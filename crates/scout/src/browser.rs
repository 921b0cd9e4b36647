// ABOUTME: Headless-browser rendering for JavaScript-heavy portals with a scroll-until-stable loop.
// ABOUTME: Each render owns its browser session and tears it down on success, error, cancellation or drop.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::cancel::CancelHandle;
use crate::error::ScrapeError;
use crate::options::ScrollPolicy;
use crate::pacing::Sleeper;
use crate::resource::RawDocument;

const HEIGHT_JS: &str =
    "Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight)";

const SCROLL_JS: &str = "window.scrollTo(0, document.documentElement.scrollHeight); true";

/// A page that can be measured and scrolled.
pub trait Scrollable: Send + Sync {
    fn scroll_height(&self) -> BoxFuture<'_, anyhow::Result<f64>>;
    fn scroll_to_bottom(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

impl Scrollable for Page {
    fn scroll_height(&self) -> BoxFuture<'_, anyhow::Result<f64>> {
        Box::pin(async move {
            let value = self.evaluate(HEIGHT_JS).await?;
            Ok(value.into_value::<f64>()?)
        })
    }

    fn scroll_to_bottom(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.evaluate(SCROLL_JS).await?;
            Ok(())
        })
    }
}

/// How a scroll loop ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOutcome {
    pub iterations: u32,
    pub final_height: f64,
    /// False when the iteration cap was hit while the page was still growing.
    pub stabilized: bool,
}

/// Scrolls to the bottom until the page height stops growing for
/// `stable_rounds` consecutive rounds or `max_iterations` is reached.
pub async fn scroll_until_stable<S: Scrollable + ?Sized>(
    page: &S,
    policy: &ScrollPolicy,
    sleeper: &dyn Sleeper,
) -> anyhow::Result<ScrollOutcome> {
    let mut last = page.scroll_height().await?;
    let mut stable = 0;
    let mut iterations = 0;
    while iterations < policy.max_iterations && stable < policy.stable_rounds {
        iterations += 1;
        page.scroll_to_bottom().await?;
        sleeper.sleep(policy.settle).await;
        let height = page.scroll_height().await?;
        if height > last {
            stable = 0;
            last = height;
        } else {
            stable += 1;
        }
        tracing::trace!(iteration = iterations, height, stable, "scroll round");
    }
    Ok(ScrollOutcome {
        iterations,
        final_height: last,
        stabilized: stable >= policy.stable_rounds,
    })
}

/// One headless browser process plus its CDP event loop.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    closed: bool,
}

impl BrowserSession {
    pub async fn launch(user_agent: &str) -> Result<Self, ScrapeError> {
        let config = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", user_agent))
            .build()
            .map_err(|e| {
                ScrapeError::browser("", "launch browser", Some(anyhow::anyhow!("config: {}", e)))
            })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            ScrapeError::browser("", "launch browser", Some(anyhow::Error::new(e)))
        })?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        tracing::debug!("browser session launched");

        Ok(Self {
            browser,
            handler,
            closed: false,
        })
    }

    /// Closes the browser and waits for the process to exit.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "browser close error");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "browser wait error");
        }
        self.handler.abort();
        self.closed = true;
        tracing::debug!("browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            // dropping Browser kills the child process; stop the event loop too
            self.handler.abort();
            tracing::debug!("browser session dropped without close");
        }
    }
}

async fn drive(
    session: &BrowserSession,
    url: &str,
    timeout: Duration,
    scroll: &ScrollPolicy,
    sleeper: &dyn Sleeper,
) -> Result<(String, String), ScrapeError> {
    let page = tokio::time::timeout(timeout, session.browser.new_page(url))
        .await
        .map_err(|_| {
            ScrapeError::network(url, "render", 1, Some(anyhow::anyhow!("navigation timed out")))
        })?
        .map_err(|e| ScrapeError::browser(url, "render", Some(anyhow::Error::new(e))))?;

    // best-effort; some pages never report navigation complete
    let _ = tokio::time::timeout(timeout, page.wait_for_navigation()).await;

    let outcome = scroll_until_stable(&page, scroll, sleeper)
        .await
        .map_err(|e| ScrapeError::browser(url, "scroll", Some(e)))?;
    tracing::debug!(
        url,
        iterations = outcome.iterations,
        height = outcome.final_height,
        stabilized = outcome.stabilized,
        "scroll finished"
    );

    let html = page
        .content()
        .await
        .map_err(|e| ScrapeError::browser(url, "render", Some(anyhow::Error::new(e))))?;
    let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());
    Ok((html, final_url))
}

/// Renders `url` in a fresh headless browser and returns the scrolled DOM.
///
/// The session is closed before returning on every path; if this future is
/// dropped mid-flight the session's `Drop` kills the browser instead.
pub async fn render(
    url: &str,
    user_agent: &str,
    timeout: Duration,
    scroll: &ScrollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancelHandle,
) -> Result<RawDocument, ScrapeError> {
    if cancel.is_cancelled() {
        return Err(ScrapeError::cancelled(url, "render"));
    }
    let session = BrowserSession::launch(user_agent).await.map_err(|mut e| {
        e.url = url.to_string();
        e
    })?;

    let result = tokio::select! {
        r = drive(&session, url, timeout, scroll, sleeper) => r,
        _ = cancel.cancelled() => Err(ScrapeError::cancelled(url, "render")),
    };
    session.close().await;

    let (html, final_url) = result?;
    Ok(RawDocument {
        url: url.to_string(),
        final_url,
        html,
        user_agent: user_agent.to_string(),
        attempts: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct InstantSleeper;

    impl Sleeper for InstantSleeper {
        fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    /// Page whose height follows a script, one entry per measurement.
    struct FakePage {
        heights: Mutex<Vec<f64>>,
        scrolls: Mutex<u32>,
    }

    impl FakePage {
        fn new(heights: &[f64]) -> Self {
            let mut heights = heights.to_vec();
            heights.reverse();
            Self {
                heights: Mutex::new(heights),
                scrolls: Mutex::new(0),
            }
        }
    }

    impl Scrollable for FakePage {
        fn scroll_height(&self) -> BoxFuture<'_, anyhow::Result<f64>> {
            Box::pin(async move {
                let mut heights = self.heights.lock().unwrap();
                // the last scripted height repeats forever
                let h = if heights.len() > 1 {
                    heights.pop().unwrap()
                } else {
                    *heights.last().unwrap()
                };
                Ok(h)
            })
        }

        fn scroll_to_bottom(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                *self.scrolls.lock().unwrap() += 1;
                Ok(())
            })
        }
    }

    fn policy(max_iterations: u32) -> ScrollPolicy {
        ScrollPolicy {
            settle: Duration::from_millis(1),
            stable_rounds: 3,
            max_iterations,
        }
    }

    #[tokio::test]
    async fn stops_after_three_rounds_without_growth() {
        let page = FakePage::new(&[1000.0, 2000.0, 3000.0, 3000.0]);
        let outcome = scroll_until_stable(&page, &policy(20), &InstantSleeper)
            .await
            .unwrap();
        // two growth rounds, then three flat ones
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.final_height, 3000.0);
        assert!(outcome.stabilized);
        assert_eq!(*page.scrolls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn infinite_scroll_hits_iteration_cap() {
        let heights: Vec<f64> = (1..=100).map(|i| i as f64 * 500.0).collect();
        let page = FakePage::new(&heights);
        let outcome = scroll_until_stable(&page, &policy(7), &InstantSleeper)
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 7);
        assert!(!outcome.stabilized);
    }

    #[tokio::test]
    async fn static_page_stops_quickly() {
        let page = FakePage::new(&[800.0]);
        let outcome = scroll_until_stable(&page, &policy(20), &InstantSleeper)
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.final_height, 800.0);
    }

    #[tokio::test]
    async fn cancelled_render_never_launches() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = render(
            "https://example.com",
            "ua",
            Duration::from_secs(1),
            &policy(1),
            &InstantSleeper,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
