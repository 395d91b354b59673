use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pricewatch_client::{ClientFetcherFactory, default_registry};
use pricewatch_core::cache::CacheConfig;
use pricewatch_core::job::WorkerConfig;
use pricewatch_core::runner::{CrawlReport, CrawlRunner, TracingCrawlReporter};
use pricewatch_core::scheduler::SchedulerConfig;
use pricewatch_core::traits::NullStore;
use pricewatch_core::worker::{TracingWorkerReporter, WorkerService};
use pricewatch_core::{ObservationStore, SourceRegistry};
use pricewatch_db::{Database, DatabaseConfig, PriceRepository};

#[derive(Parser)]
#[command(name = "pricewatch", version, about = "Catalog crawler and price history store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more sources and record a price observation per product
    Crawl {
        /// Source key to crawl (repeatable); see `pricewatch sources`
        #[arg(short, long = "source", required = true, num_args = 1..)]
        sources: Vec<String>,

        /// Crawl and validate without touching the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[command(flatten)]
        scheduler: SchedulerArgs,
    },

    /// Poll the job queue and run queued crawls until interrupted
    Worker {
        /// Identifier recorded on claimed jobs
        #[arg(long, env = "PRICEWATCH_WORKER_ID")]
        worker_id: Option<String>,

        /// Seconds between polls of an empty queue
        #[arg(long, env = "PRICEWATCH_POLL_INTERVAL_SECS", default_value_t = 5)]
        poll_interval_secs: u64,

        #[command(flatten)]
        scheduler: SchedulerArgs,
    },

    /// Show the price history of one product, newest first
    History {
        /// Product id
        #[arg(short, long)]
        product_id: Uuid,

        /// Only observations at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only observations at or before this RFC 3339 timestamp
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Number of observations to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Count stored products per category
    Categories {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List the sources that can be crawled
    Sources,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

/// Scheduling options shared by `crawl` and `worker`.
#[derive(Args)]
struct SchedulerArgs {
    /// Maximum simultaneously in-flight requests
    #[arg(long, env = "PRICEWATCH_CONCURRENCY", default_value_t = 16)]
    concurrency: usize,

    /// Cache fetched pages in this directory
    #[arg(long, env = "PRICEWATCH_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Refetch cached pages older than this
    #[arg(long, env = "PRICEWATCH_CACHE_EXPIRY_SECS", requires = "cache_dir")]
    cache_expiry_secs: Option<u64>,

    /// Upper bound on waiting for rendered content
    #[arg(long, env = "PRICEWATCH_RENDER_WAIT_SECS", default_value_t = 12)]
    render_wait_secs: u64,

    /// Per-request timeout
    #[arg(long, env = "PRICEWATCH_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Minimum delay between requests to one host for static sources
    #[arg(long, env = "PRICEWATCH_DELAY_MS", default_value_t = 250)]
    delay_ms: u64,

    /// Stop each category after this many pages
    #[arg(long, env = "PRICEWATCH_MAX_PAGES")]
    max_pages: Option<u32>,
}

impl SchedulerArgs {
    fn to_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::default()
            .with_max_concurrency(self.concurrency)
            .with_render_wait(Duration::from_secs(self.render_wait_secs))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_static_delay(Duration::from_millis(self.delay_ms));

        if let Some(dir) = &self.cache_dir {
            let mut cache = CacheConfig::new(dir);
            if let Some(secs) = self.cache_expiry_secs {
                cache = cache.with_expiry(Duration::from_secs(secs));
            }
            config = config.with_cache(cache);
        }
        if let Some(pages) = self.max_pages {
            config = config.with_max_pages(pages);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pricewatch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            sources,
            dry_run,
            scheduler,
        } => {
            let config = scheduler.to_config();
            let report = if dry_run {
                cmd_crawl(&sources, config, NullStore).await?
            } else {
                let db = connect_db().await?;
                cmd_crawl(&sources, config, db.price_repo()).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.sources.is_empty() && report.succeeded().is_empty() {
                bail!("every source failed: {}", report.failed().join(", "));
            }
        }
        Commands::Worker {
            worker_id,
            poll_interval_secs,
            scheduler,
        } => {
            let mut worker_config =
                WorkerConfig::default().with_poll_interval(Duration::from_secs(poll_interval_secs));
            if let Some(id) = worker_id {
                worker_config = worker_config.with_worker_id(id);
            }
            let db = connect_db().await?;
            cmd_worker(&db, scheduler.to_config(), worker_config).await?;
        }
        Commands::History {
            product_id,
            since,
            until,
            limit,
            format,
        } => {
            let db = connect_db().await?;
            cmd_history(&db.price_repo(), product_id, since, until, limit, format).await?;
        }
        Commands::Categories { format } => {
            let db = connect_db().await?;
            cmd_categories(&db.price_repo(), format).await?;
        }
        Commands::Sources => cmd_sources(&default_registry()),
    }

    Ok(())
}

/// Connect to PostgreSQL using `DATABASE_URL` and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

/// A token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });
    token
}

async fn cmd_crawl<S>(sources: &[String], config: SchedulerConfig, store: S) -> Result<CrawlReport>
where
    S: ObservationStore + 'static,
{
    let registry = default_registry();
    let unknown = registry.unknown(sources);
    if !unknown.is_empty() {
        bail!(
            "unknown source(s): {} (available: {})",
            unknown.join(", "),
            registry.keys().join(", ")
        );
    }

    let factory = ClientFetcherFactory::new(&config)?;
    let runner = CrawlRunner::new(factory, store, registry, config);
    let cancel = shutdown_token();

    Ok(runner
        .run(sources, &cancel, Arc::new(TracingCrawlReporter))
        .await)
}

async fn cmd_worker(
    db: &Database,
    config: SchedulerConfig,
    worker_config: WorkerConfig,
) -> Result<()> {
    let factory = ClientFetcherFactory::new(&config)?;
    let runner = CrawlRunner::new(factory, db.price_repo(), default_registry(), config);
    let worker = WorkerService::new(db.job_repo(), runner, worker_config);

    worker
        .run(
            shutdown_token(),
            &TracingWorkerReporter,
            Arc::new(TracingCrawlReporter),
        )
        .await?;
    Ok(())
}

async fn cmd_history(
    repo: &PriceRepository,
    product_id: Uuid,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let product = repo
        .get_product(product_id)
        .await?
        .with_context(|| format!("No product with id {product_id}"))?;
    let history = repo.price_history(product_id, since, until, limit).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(["observed_at", "price", "currency", "in_stock"])?;
            for obs in &history {
                writer.write_record([
                    obs.observed_at.to_rfc3339(),
                    obs.price.map(|p| format!("{p:.2}")).unwrap_or_default(),
                    obs.currency.clone(),
                    obs.in_stock.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            if history.is_empty() {
                println!("No observations for {} ({})", product.name, product.sku);
                return Ok(());
            }

            println!("Price history for {} (sku: {}):\n", product.name, product.sku);
            for (i, obs) in history.iter().enumerate() {
                let change = match (obs.price, history.get(i + 1).and_then(|prev| prev.price)) {
                    (Some(now), Some(before)) if now < before => "down",
                    (Some(now), Some(before)) if now > before => "up",
                    (_, None) if i + 1 == history.len() => "first",
                    _ => "",
                };
                let price = obs
                    .price
                    .map(|p| format!("{p:.2} {}", obs.currency))
                    .unwrap_or_else(|| "no price".to_string());
                let stock = if obs.in_stock { "in stock" } else { "out of stock" };

                println!(
                    "  {}  {:>14}  {:<12} {}",
                    obs.observed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    price,
                    stock,
                    change,
                );
            }
            println!("\nTotal: {} observations", history.len());
        }
    }

    Ok(())
}

async fn cmd_categories(repo: &PriceRepository, format: OutputFormat) -> Result<()> {
    let summary = repo.category_summary().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(["category", "product_count"])?;
            for row in &summary {
                writer.write_record([
                    row.category.clone().unwrap_or_default(),
                    row.product_count.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            if summary.is_empty() {
                println!("No products stored yet");
                return Ok(());
            }
            for row in &summary {
                println!(
                    "  {:<28} {:>6}",
                    row.category.as_deref().unwrap_or("(none)"),
                    row.product_count
                );
            }

            let counts = repo.counts().await?;
            println!(
                "\nTotal: {} products, {} observations from {} sources",
                counts.products, counts.observations, counts.sources
            );
        }
    }

    Ok(())
}

fn cmd_sources(registry: &SourceRegistry) {
    for key in registry.keys() {
        let Some(adapter) = registry.get(key) else {
            continue;
        };
        let source = adapter.source();
        let mode = if adapter.render_mode().is_rendered() {
            "rendered"
        } else {
            "static"
        };
        println!(
            "  {:<12} {:<24} {:<22} {}",
            key, source.name, source.domain, mode
        );
    }
}
