// ABOUTME: Configuration for the scraper: Options, retry/politeness/scroll policies, RenderMode and ScraperBuilder.
// ABOUTME: ScraperBuilder provides a fluent API for constructing Scraper instances with custom settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::PortalsConfig;
use crate::crawl::Scraper;
use crate::pacing::{Sleeper, TokioSleeper};
use crate::strategy::StrategyRegistry;

/// Identity strings rotated across requests.
pub const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36 Edg/91.0.864.59",
];

/// How a page is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Plain HTTP GET.
    #[default]
    Static,
    /// Headless browser with scroll-to-load.
    Dynamic,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RenderMode::Static => "static",
            RenderMode::Dynamic => "dynamic",
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for RenderMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dynamic" | "browser" | "js" => RenderMode::Dynamic,
            _ => RenderMode::Static,
        }
    }
}

/// Retry policy for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Randomized pause enforced between requests to the same site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessPolicy {
    pub base: Duration,
    /// Upper bound of the uniformly random extra delay.
    pub jitter: Duration,
}

impl Default for PolitenessPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1500),
            jitter: Duration::from_millis(2000),
        }
    }
}

impl PolitenessPolicy {
    /// No delay at all. Only meant for offline parsing and tests.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Draws the next delay in `[base, base + jitter]`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        self.base + Duration::from_millis(extra)
    }
}

/// Scroll-until-stable settings for dynamic rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPolicy {
    /// Wait after each scroll before measuring the page again.
    pub settle: Duration,
    /// Consecutive no-growth rounds that end the loop.
    pub stable_rounds: u32,
    /// Hard cap on scroll iterations.
    pub max_iterations: u32,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            stable_rounds: 3,
            max_iterations: 20,
        }
    }
}

/// Configuration options for the scraper.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agents: Vec<String>,
    pub retry: RetryPolicy,
    pub politeness: PolitenessPolicy,
    pub render: RenderMode,
    pub scroll: ScrollPolicy,
    /// Offset step used when a search URL has no page parameter.
    pub page_size: u32,
    pub enrich_details: bool,
    pub detail_concurrency: usize,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
    pub registry: Option<StrategyRegistry>,
    pub portals: Option<PortalsConfig>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            retry: RetryPolicy::default(),
            politeness: PolitenessPolicy::default(),
            render: RenderMode::Static,
            scroll: ScrollPolicy::default(),
            page_size: 10,
            enrich_details: true,
            detail_concurrency: 1,
            http_client: None,
            headers: HashMap::new(),
            registry: None,
            portals: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Builder for constructing Scraper instances with custom configuration.
#[derive(Debug, Clone)]
pub struct ScraperBuilder {
    opts: Options,
}

impl ScraperBuilder {
    /// Create a new ScraperBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Replace the user-agent rotation pool.
    pub fn user_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.opts.retry = retry;
        self
    }

    pub fn politeness(mut self, politeness: PolitenessPolicy) -> Self {
        self.opts.politeness = politeness;
        self
    }

    pub fn render(mut self, render: RenderMode) -> Self {
        self.opts.render = render;
        self
    }

    pub fn scroll(mut self, scroll: ScrollPolicy) -> Self {
        self.opts.scroll = scroll;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.opts.page_size = page_size;
        self
    }

    /// Enable or disable the detail-page enrichment pass.
    pub fn enrich_details(mut self, enrich: bool) -> Self {
        self.opts.enrich_details = enrich;
        self
    }

    /// Bound on concurrent detail fetches. Clamped to at least 1.
    pub fn detail_concurrency(mut self, n: usize) -> Self {
        self.opts.detail_concurrency = n.max(1);
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Set a custom strategy registry.
    pub fn registry(mut self, reg: StrategyRegistry) -> Self {
        self.opts.registry = Some(reg);
        self
    }

    /// Set the portal → search URL mapping.
    pub fn portals(mut self, portals: PortalsConfig) -> Self {
        self.opts.portals = Some(portals);
        self
    }

    /// Inject the clock used for politeness delays and retry backoff.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.opts.sleeper = sleeper;
        self
    }

    /// Build the Scraper with the configured options.
    pub fn build(self) -> Scraper {
        Scraper::new(self.opts)
    }
}

impl Default for ScraperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
