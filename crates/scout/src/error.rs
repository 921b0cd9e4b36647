// ABOUTME: Error types for the extraction engine including ErrorCode enum and ScrapeError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Error codes representing different categories of scrape failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Transport failure or retryable HTTP status, after retries ran out.
    Network,
    /// Non-retryable HTTP status (403, 404, ...).
    Http,
    Parse,
    Configuration,
    Browser,
    Cancelled,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Network => "network error",
            ErrorCode::Http => "http error",
            ErrorCode::Parse => "parse error",
            ErrorCode::Configuration => "configuration error",
            ErrorCode::Browser => "browser error",
            ErrorCode::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for fetch, extraction and crawl operations.
#[derive(Debug, thiserror::Error)]
pub struct ScrapeError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    /// Number of fetch attempts made before giving up (0 when no fetch was involved).
    pub attempts: u32,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jobscout: {} {}: {}", self.op, self.url, self.code)?;
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ScrapeError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            attempts: 0,
            source,
        }
    }

    /// Create a Network error recording how many attempts were made.
    pub fn network(
        url: impl Into<String>,
        op: impl Into<String>,
        attempts: u32,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            attempts,
            ..Self::with_code(ErrorCode::Network, url, op, source)
        }
    }

    /// Create an Http error for a status that is not worth retrying.
    pub fn http(
        url: impl Into<String>,
        op: impl Into<String>,
        attempts: u32,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            attempts,
            ..Self::with_code(ErrorCode::Http, url, op, source)
        }
    }

    /// Create a Parse error.
    pub fn parse(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Parse, url, op, source)
    }

    /// Create a Configuration error.
    pub fn configuration(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Configuration, url, op, source)
    }

    /// Create a Browser error.
    pub fn browser(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Browser, url, op, source)
    }

    /// Create a Cancelled error.
    pub fn cancelled(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::Cancelled, url, op, None)
    }

    /// Returns true if this is a Network error.
    pub fn is_network(&self) -> bool {
        self.code == ErrorCode::Network
    }

    /// Returns true if this is an Http error.
    pub fn is_http(&self) -> bool {
        self.code == ErrorCode::Http
    }

    /// Returns true if this is a Parse error.
    pub fn is_parse(&self) -> bool {
        self.code == ErrorCode::Parse
    }

    /// Returns true if this is a Configuration error.
    pub fn is_configuration(&self) -> bool {
        self.code == ErrorCode::Configuration
    }

    /// Returns true if this is a Browser error.
    pub fn is_browser(&self) -> bool {
        self.code == ErrorCode::Browser
    }

    /// Returns true if this is a Cancelled error.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    /// Whether the orchestrator may absorb this error by skipping the page or detail.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Network | ErrorCode::Http | ErrorCode::Parse | ErrorCode::Browser
        )
    }
}
