// ABOUTME: Main library entry point for the jobscout job-listing extraction engine.
// ABOUTME: Re-exports the public API: Scraper, ScraperBuilder, JobRecord, ScrapeError, portal and crawl types.

//! jobscout - extracts structured job listings from job-portal result pages.
//!
//! Result pages are fetched statically or through a headless browser, listing
//! cards are located and deduplicated, fields are pulled out with per-portal
//! selector strategies and normalized, and each listing can be enriched from
//! its own detail page.
//!
//! # Example
//!
//! ```no_run
//! use jobscout::{Scraper, ScrapeError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ScrapeError> {
//!     let scraper = Scraper::builder().build();
//!     let jobs = scraper
//!         .scrape_multiple_pages("https://www.indeed.com/jobs?q=rust", 2)
//!         .await?;
//!     for job in &jobs {
//!         println!("{} @ {}", job.title(), job.company());
//!     }
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod cancel;
pub mod cards;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod ld_json;
pub mod model;
pub mod normalize;
pub mod options;
pub mod pacing;
pub mod resource;
pub mod selectors;
pub mod strategy;

pub use crate::cancel::CancelHandle;
pub use crate::config::{PortalConfig, PortalsConfig};
pub use crate::crawl::{CrawlReport, CrawlRequest, CrawlState, Scraper};
pub use crate::error::{ErrorCode, ScrapeError};
pub use crate::model::{ExtractionContext, Field, JobFields, JobRecord, RecordRejected};
pub use crate::options::{
    Options, PolitenessPolicy, RenderMode, RetryPolicy, ScraperBuilder, ScrollPolicy,
};
pub use crate::pacing::{Sleeper, TokioSleeper};
pub use crate::strategy::{
    load_builtin_registry, Portal, PortalStrategy, SelectorSpec, SelectorStrategy,
    StrategyRegistry,
};
