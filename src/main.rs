//! Sitelens main entry point
//!
//! This is the command-line interface for the Sitelens SEO crawler.

use anyhow::{bail, Context};
use clap::Parser;
use sitelens::config::{load_config_with_hash, Config};
use sitelens::crawler::{CrawlOptions, Crawler, ExtractionResult, RateLimiter};
use sitelens::sitemap::SitemapResolver;
use sitelens::storage::{open_sink, page_key, ResultSink, RunStatus};
use sitelens::CrawlError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sitelens: a resilient SEO crawl-and-extract engine
///
/// Sitelens crawls the pages of a site, extracts SEO data points from each page,
/// scores them, and records what changed since the previous crawl.
#[derive(Parser, Debug)]
#[command(name = "sitelens")]
#[command(version)]
#[command(about = "A resilient SEO crawl-and-extract engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Page to crawl (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Sitemap whose pages are crawled (repeatable)
    #[arg(long = "sitemap", value_name = "URL")]
    sitemaps: Vec<String>,

    /// Site whose sitemaps are discovered through robots.txt
    #[arg(long, value_name = "URL")]
    site: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config, cli.json);
    }

    let resolver = SitemapResolver::new(&config.user_agent, config.sitemap.clone())
        .context("failed to build sitemap client")?;
    let sitemaps = collect_sitemaps(&cli, &resolver).await?;

    if cli.dry_run {
        return handle_dry_run(&config, &cli.urls, &sitemaps, &resolver).await;
    }

    handle_crawl(&config, &config_hash, &cli, &sitemaps, &resolver).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitelens=info,warn"),
            1 => EnvFilter::new("sitelens=debug,info"),
            2 => EnvFilter::new("sitelens=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn collect_sitemaps(cli: &Cli, resolver: &SitemapResolver) -> anyhow::Result<Vec<String>> {
    let mut sitemaps = cli.sitemaps.clone();
    if let Some(site) = &cli.site {
        let discovered = resolver
            .discover(site)
            .await
            .with_context(|| format!("failed to discover sitemaps for {}", site))?;
        tracing::info!("Discovered {} sitemap(s) for {}", discovered.len(), site);
        sitemaps.extend(discovered);
    }
    Ok(sitemaps)
}

/// Resolves sitemaps into page URLs, explaining bot protection to the user
async fn resolve_pages(
    resolver: &SitemapResolver,
    sitemaps: &[String],
) -> anyhow::Result<Vec<String>> {
    if sitemaps.is_empty() {
        return Ok(Vec::new());
    }
    match resolver.resolve_many(sitemaps).await {
        Ok(urls) => Ok(urls),
        Err(e) if e.is_bot_protection() => {
            eprintln!("The site blocks automated sitemap access. Pass page URLs with --url instead.");
            Err(e.into())
        }
        Err(e) => Err(anyhow::Error::from(e).context("sitemap resolution failed")),
    }
}

/// Handles the --stats mode: prints what the database holds
fn handle_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    let path = Path::new(&config.output.database_path);
    if !path.exists() {
        bail!("database not found: {}", path.display());
    }

    let sink = open_sink(path).context("failed to open database")?;
    let stats = sink.statistics()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("=== Sitelens Statistics ===\n");
    println!("Runs:               {}", stats.runs);
    println!("Pages:              {}", stats.pages);
    println!("Crawls:             {}", stats.crawls);
    println!("  successful:       {}", stats.successful_crawls);
    println!("  failed:           {}", stats.failed_crawls);
    println!("Data point changes: {}", stats.data_point_changes);
    if let Some(quality) = stats.average_quality {
        println!("Average quality:    {:.1}", quality);
    }
    if !stats.failures_by_category.is_empty() {
        println!("\nFailures by category:");
        for (category, count) in &stats.failures_by_category {
            println!("  {:<16} {}", category, count);
        }
    }

    Ok(())
}

/// Handles the --dry-run mode: shows the normalized work list
async fn handle_dry_run(
    config: &Config,
    urls: &[String],
    sitemaps: &[String],
    resolver: &SitemapResolver,
) -> anyhow::Result<()> {
    println!("=== Sitelens Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Base timeout: {}s", config.crawler.base_timeout_secs);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    println!("  User agent: {}", config.user_agent.user_agent_string());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Screenshots: {}", config.output.screenshot_dir);

    let mut pages = urls.to_vec();
    pages.extend(resolve_pages(resolver, sitemaps).await?);

    let normalizer = sitelens::UrlNormalizer::new(config.urls.clone());
    let outcome = normalizer.normalize_batch(&pages, true)?;

    println!("\nPages to crawl ({}):", outcome.valid.len());
    for url in &outcome.valid {
        println!("  {}", url);
    }
    if !outcome.invalid.is_empty() {
        println!("\nSkipped ({}):", outcome.invalid.len());
        for (raw, reason) in &outcome.invalid {
            println!("  {} ({})", raw, reason);
        }
    }

    println!("\nDry run complete. No pages were crawled.");
    Ok(())
}

/// Handles the main crawl mode
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    cli: &Cli,
    sitemaps: &[String],
    resolver: &SitemapResolver,
) -> anyhow::Result<()> {
    let mut pages = cli.urls.clone();
    pages.extend(resolve_pages(resolver, sitemaps).await?);
    if pages.is_empty() {
        bail!("nothing to crawl: pass --url, --sitemap, or --site");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping crawl");
                cancel.cancel();
            }
        });
    }

    let mut sink = open_sink(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let run_id = sink.begin_run(config_hash)?;

    let crawler = Crawler::from_config(config);
    let options = CrawlOptions::from_config(config);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    let json = cli.json;
    let outcome = crawler
        .crawl_batch_with(
            &pages,
            config.crawler.concurrency,
            &options,
            limiter,
            &cancel,
            |_, result| {
                if let Err(e) = sink.record(Some(run_id), &page_key(&result.requested_url), result) {
                    tracing::error!("Failed to store result for {}: {}", result.requested_url, e);
                }
                print_result(result, json);
            },
        )
        .await;

    let status = match &outcome {
        Ok(_) => RunStatus::Completed,
        Err(CrawlError::Cancelled) => RunStatus::Interrupted,
        Err(_) => RunStatus::Failed,
    };
    sink.finish_run(run_id, status)?;

    let results = match outcome {
        Ok(results) => results,
        Err(CrawlError::Cancelled) => {
            eprintln!("Crawl interrupted; completed pages were saved.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if !json {
        let succeeded = results.iter().filter(|r| r.success).count();
        println!(
            "\nCrawled {} page(s): {} succeeded, {} failed",
            results.len(),
            succeeded,
            results.len() - succeeded
        );
    }
    Ok(())
}

fn print_result(result: &ExtractionResult, json: bool) {
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to serialize result: {}", e),
        }
        return;
    }

    if result.success {
        println!(
            "OK    {:>3}  {}  (quality {}, retries {})",
            result.status_code.map_or_else(|| "-".to_string(), |s| s.to_string()),
            result.url,
            result.quality_score().unwrap_or(0),
            result.retry_count()
        );
    } else {
        println!(
            "FAIL  {:>3}  {}  {} (retries {})",
            result.status_code.map_or_else(|| "-".to_string(), |s| s.to_string()),
            result.requested_url,
            result.error_message.as_deref().unwrap_or("unknown error"),
            result.retry_count()
        );
    }
}
