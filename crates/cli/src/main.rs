// ABOUTME: CLI for the jobscout job-listing scraper.
// ABOUTME: Scrapes a results URL, a portal search or a saved HTML file and prints the listings as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use jobscout::{
    CrawlRequest, JobRecord, Portal, PortalsConfig, RenderMode, Scraper, StrategyRegistry,
};
use tracing_subscriber::EnvFilter;

/// Extract structured job listings from job-portal result pages.
#[derive(Parser, Debug)]
#[command(name = "jobscout")]
#[command(about = "Scrape job listings and print them as JSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a results page URL, or a saved HTML file with --html.
    Scrape {
        /// Results page URL (detects the portal from the host unless --portal is given).
        url: Option<String>,

        /// Portal id (linkedin, indeed, generic, or one from --strategies).
        #[arg(long)]
        portal: Option<String>,

        /// HTML file to parse instead of fetching (requires --url).
        #[arg(long)]
        html: Option<PathBuf>,

        /// URL context for resolving links in --html mode.
        #[arg(long = "url", requires = "html")]
        context_url: Option<String>,

        #[command(flatten)]
        common: Common,
    },
    /// Build a portal search URL from keywords and location, then scrape it.
    Search {
        #[arg(long)]
        portal: String,

        #[arg(long)]
        keywords: String,

        #[arg(long, default_value = "")]
        location: String,

        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// Number of result pages to crawl.
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// Render pages in a headless browser.
    #[arg(long)]
    dynamic: bool,

    /// Skip fetching each listing's detail page.
    #[arg(long)]
    no_details: bool,

    /// JSON file with portal search configuration.
    #[arg(long)]
    portals: Option<PathBuf>,

    /// JSON file with additional selector strategies.
    #[arg(long)]
    strategies: Option<PathBuf>,

    /// Output compact JSON instead of pretty.
    #[arg(long, default_value_t = false)]
    compact: bool,

    /// Output file path (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn build_scraper(common: &Common) -> Result<Scraper> {
    let mut builder = Scraper::builder().enrich_details(!common.no_details);
    if common.dynamic {
        builder = builder.render(RenderMode::Dynamic);
    }
    if let Some(path) = &common.portals {
        builder = builder.portals(PortalsConfig::from_json(&read_file(path)?)?);
    }
    if let Some(path) = &common.strategies {
        builder = builder.registry(StrategyRegistry::from_json(&read_file(path)?)?);
    }
    Ok(builder.build())
}

fn write_output(records: &[JobRecord], common: &Common) -> Result<()> {
    let json = if common.compact {
        serde_json::to_string(records)?
    } else {
        serde_json::to_string_pretty(records)?
    };
    match &common.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn crawl(
    scraper: &Scraper,
    url: String,
    portal: Option<String>,
    common: &Common,
) -> Result<Vec<JobRecord>> {
    let mut request = CrawlRequest::new(url).pages(common.pages);
    if let Some(portal) = portal {
        request = request.portal(portal);
    }
    if common.dynamic {
        request = request.render(RenderMode::Dynamic);
    }
    let report = scraper.crawl(request).await?;
    tracing::info!(
        portal = %report.portal,
        records = report.records.len(),
        pages_skipped = report.pages_skipped,
        details_enriched = report.details_enriched,
        details_failed = report.details_failed,
        "done"
    );
    Ok(report.records)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scrape {
            url,
            portal,
            html,
            context_url,
            common,
        } => {
            let scraper = build_scraper(&common)?;
            let records = match (html, url) {
                (Some(path), None) => {
                    let Some(context_url) = context_url else {
                        bail!("--url is required when using --html");
                    };
                    let html = read_file(&path)?;
                    let portal = portal.unwrap_or_else(|| Portal::Generic.id().to_string());
                    scraper.scrape_html(&portal, &html, &context_url)?
                }
                (Some(_), Some(_)) => bail!("cannot use both --html and a positional URL"),
                (None, Some(url)) => crawl(&scraper, url, portal, &common).await?,
                (None, None) => bail!("a results URL is required, or use --html with --url"),
            };
            write_output(&records, &common)
        }
        Command::Search {
            portal,
            keywords,
            location,
            common,
        } => {
            let scraper = build_scraper(&common)?;
            let url = scraper
                .portals()
                .search_url(&Portal::from_id(&portal), &keywords, &location)?;
            tracing::info!(%url, "search url");
            let records = crawl(&scraper, url, Some(portal), &common).await?;
            write_output(&records, &common)
        }
    }
}
