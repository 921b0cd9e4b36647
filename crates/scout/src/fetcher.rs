// ABOUTME: Fetcher dispatching a page retrieval to static HTTP or headless-browser rendering.
// ABOUTME: Holds the shared reqwest client and the read-only identity pool; no per-crawl state.

use std::sync::Arc;

use crate::browser;
use crate::cancel::CancelHandle;
use crate::error::ScrapeError;
use crate::options::{Options, RenderMode, ScrollPolicy};
use crate::resource::{self, pick_user_agent, FetchOptions, RawDocument};

/// Retrieves raw page content.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    fetch_opts: FetchOptions,
    scroll: ScrollPolicy,
}

impl Fetcher {
    pub fn new(opts: &Options) -> Self {
        let client = opts.http_client.clone().unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(opts.timeout)
                .cookie_store(true)
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .build()
                .expect("failed to build HTTP client")
        });

        let fetch_opts = FetchOptions {
            headers: opts.headers.clone(),
            user_agents: Arc::from(opts.user_agents.clone()),
            timeout: opts.timeout,
            retry: opts.retry,
            sleeper: Arc::clone(&opts.sleeper),
        };

        Self {
            client,
            fetch_opts,
            scroll: opts.scroll,
        }
    }

    /// Fetches `url` statically or through a headless browser.
    pub async fn fetch(
        &self,
        url: &str,
        mode: RenderMode,
        cancel: &CancelHandle,
    ) -> Result<RawDocument, ScrapeError> {
        match mode {
            RenderMode::Static => resource::fetch(&self.client, url, &self.fetch_opts).await,
            RenderMode::Dynamic => {
                resource::validate_url(url, "render")?;
                let user_agent = pick_user_agent(&self.fetch_opts.user_agents);
                browser::render(
                    url,
                    &user_agent,
                    self.fetch_opts.timeout,
                    &self.scroll,
                    self.fetch_opts.sleeper.as_ref(),
                    cancel,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn static_mode_uses_http() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/list");
            then.status(200).body("<html></html>");
        });
        let fetcher = Fetcher::new(&Options::default());
        let doc = fetcher
            .fetch(&server.url("/list"), RenderMode::Static, &CancelHandle::new())
            .await
            .unwrap();
        mock.assert();
        assert_eq!(doc.html, "<html></html>");
    }

    #[tokio::test]
    async fn dynamic_mode_rejects_bad_urls_before_launching() {
        let fetcher = Fetcher::new(&Options::default());
        let err = fetcher
            .fetch("not-a-url", RenderMode::Dynamic, &CancelHandle::new())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
