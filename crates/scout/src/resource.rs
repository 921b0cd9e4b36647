// ABOUTME: Static HTTP fetching with user-agent rotation, bounded timeout, retry with exponential backoff and charset decoding.
// ABOUTME: Transport failures, timeouts, 429 and 5xx are retried; other non-2xx statuses fail immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::StatusCode;

use crate::error::ScrapeError;
use crate::options::{RetryPolicy, DEFAULT_USER_AGENTS};
use crate::pacing::{Sleeper, TokioSleeper};

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Options for fetching a page.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub user_agents: Arc<[String]>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// A fetched page, decoded to text.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub final_url: String,
    pub html: String,
    /// Identity used for the request that succeeded.
    pub user_agent: String,
    /// Number of attempts it took.
    pub attempts: u32,
}

/// Picks a random identity from the pool.
pub fn pick_user_agent(pool: &[String]) -> String {
    pool.choose(&mut rand::rng())
        .cloned()
        .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string())
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    for part in lower.split(';') {
        let trimmed = part.trim();
        if let Some(charset) = trimmed.strip_prefix("charset=") {
            let charset = charset.trim_matches('"').trim_matches('\'');
            return Some(charset.to_string());
        }
    }
    None
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

enum AttemptError {
    /// Worth another try.
    Transient(anyhow::Error),
    /// Retrying would not help.
    Fatal(ScrapeError),
}

/// Validates that `url` is an absolute http(s) URL.
pub fn validate_url(url: &str, op: &str) -> Result<url::Url, ScrapeError> {
    let parsed = url::Url::parse(url).map_err(|e| {
        ScrapeError::configuration(url, op, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(parsed),
        _ => Err(ScrapeError::configuration(
            url,
            op,
            Some(anyhow::anyhow!("scheme must be http or https")),
        )),
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
    user_agent: &str,
    attempt: u32,
) -> Result<RawDocument, AttemptError> {
    let mut request = client
        .get(url)
        .timeout(opts.timeout)
        .header(reqwest::header::USER_AGENT, user_agent);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| AttemptError::Transient(anyhow::anyhow!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let source = anyhow::anyhow!("HTTP status {}", status.as_u16());
        return Err(if is_retryable_status(status) {
            AttemptError::Transient(source)
        } else {
            AttemptError::Fatal(ScrapeError::http(url, "fetch", attempt, Some(source)))
        });
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(AttemptError::Fatal(ScrapeError::http(
                url,
                "fetch",
                attempt,
                Some(anyhow::anyhow!("content too large")),
            )));
        }
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response
        .bytes()
        .await
        .map_err(|e| AttemptError::Transient(anyhow::anyhow!("failed to read body: {}", e)))?;

    if body.len() > MAX_CONTENT_LENGTH {
        return Err(AttemptError::Fatal(ScrapeError::http(
            url,
            "fetch",
            attempt,
            Some(anyhow::anyhow!("content too large")),
        )));
    }

    Ok(RawDocument {
        url: url.to_string(),
        final_url,
        html: decode_body(&body, content_type.as_deref()),
        user_agent: user_agent.to_string(),
        attempts: attempt,
    })
}

/// Fetches a page with a fresh random identity per attempt.
///
/// Transient failures are retried up to `retry.max_attempts` times with a
/// `base_delay * 2^(attempt-1)` pause through the injected sleeper; when they
/// run out the error is a Network error carrying the attempt count.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<RawDocument, ScrapeError> {
    validate_url(url, "fetch")?;

    let max_attempts = opts.retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let user_agent = pick_user_agent(&opts.user_agents);
        match fetch_once(client, url, opts, &user_agent, attempt).await {
            Ok(doc) => {
                tracing::debug!(url, attempt, "fetched page");
                return Ok(doc);
            }
            Err(AttemptError::Fatal(err)) => {
                tracing::warn!(url, attempt, error = %err, "fetch failed");
                return Err(err);
            }
            Err(AttemptError::Transient(source)) => {
                if attempt >= max_attempts {
                    tracing::warn!(url, attempts = attempt, error = %source, "fetch retries exhausted");
                    return Err(ScrapeError::network(url, "fetch", attempt, Some(source)));
                }
                let delay = opts.retry.backoff(attempt);
                tracing::info!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %source,
                    "retrying fetch"
                );
                opts.sleeper.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use httpmock::prelude::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.slept.lock().unwrap().push(duration);
            Box::pin(async {})
        }
    }

    fn test_opts(sleeper: Arc<RecordingSleeper>) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(300),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
            },
            sleeper,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fetch_ok_with_rotated_identity() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jobs");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<html><body>ok</body></html>");
        });

        let opts = test_opts(Arc::new(RecordingSleeper::default()));
        let doc = fetch(&reqwest::Client::new(), &server.url("/jobs"), &opts)
            .await
            .expect("fetch should succeed");
        mock.assert();
        assert_eq!(doc.html, "<html><body>ok</body></html>");
        assert_eq!(doc.attempts, 1);
        assert!(DEFAULT_USER_AGENTS.contains(&doc.user_agent.as_str()));
    }

    #[tokio::test]
    async fn timeouts_exhaust_three_attempts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2)).body("late");
        });

        let sleeper = Arc::new(RecordingSleeper::default());
        let opts = test_opts(sleeper.clone());
        let err = fetch(&reqwest::Client::new(), &server.url("/slow"), &opts)
            .await
            .expect_err("should time out");

        assert!(err.is_network());
        assert_eq!(err.attempts, 3);
        assert_eq!(mock.calls(), 3);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(503);
        });

        let opts = test_opts(Arc::new(RecordingSleeper::default()));
        let err = fetch(&reqwest::Client::new(), &server.url("/busy"), &opts)
            .await
            .unwrap_err();
        assert!(err.is_network());
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("not found");
        });

        let sleeper = Arc::new(RecordingSleeper::default());
        let opts = test_opts(sleeper.clone());
        let err = fetch(&reqwest::Client::new(), &server.url("/gone"), &opts)
            .await
            .unwrap_err();
        assert!(err.is_http());
        assert_eq!(mock.calls(), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_is_configuration_error() {
        let opts = FetchOptions::default();
        let err = fetch(&reqwest::Client::new(), "ftp://example.com/x", &opts)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn decode_uses_declared_charset() {
        let iso_bytes: &[u8] = &[0x63, 0x61, 0x66, 0xe9];
        assert_eq!(
            decode_body(iso_bytes, Some("text/html; charset=iso-8859-1")),
            "café"
        );
        assert_eq!(decode_body("naïve".as_bytes(), Some("text/html; charset=utf-8")), "naïve");
    }

    #[test]
    fn extract_charset_variants() {
        assert_eq!(
            extract_charset("text/html; charset=ISO-8859-1"),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(
            extract_charset("text/html; charset=\"utf-8\""),
            Some("utf-8".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
    }
}
