//! Press Review CLI
//!
//! Local execution entry point for crawl sweeps and digest delivery.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pressreview::{
    config::load_runtime_config,
    error::{AppError, Result},
    models::{Config, ObjectBackend, Section},
    pipeline::{self, Dispatcher, SweepOptions, SweepReport},
    services::{SectionHarvester, create_mailer},
    storage::{DirObjectStore, LocalStore, ObjectStore, ReaderFilter},
    utils::{http, split_list},
};
use tokio_util::sync::CancellationToken;

/// Press Review - news crawler and digest dispatcher
#[derive(Parser, Debug)]
#[command(
    name = "pressreview",
    version,
    about = "Crawls news sections and delivers personalised digests"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the collections
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, visible_alias = "log")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest sections and optionally persist and upload
    Crawl(CrawlArgs),

    /// Deliver digests to due readers
    Deliver {
        /// Deliver to this reader only (if due)
        #[arg(long, conflicts_with = "all")]
        email: Option<String>,

        /// Deliver to every due reader
        #[arg(long)]
        all: bool,
    },

    /// Recompute the next send time of every reader
    Reschedule,

    /// Validate configuration
    Validate,

    /// Show store contents summary
    Info,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Sweep channels due by staleness
    #[arg(long)]
    all: bool,

    /// Harvest one ad-hoc HTML page (requires --url and --pattern)
    #[arg(long)]
    test: bool,

    /// Page URL for --test
    #[arg(long)]
    url: Option<String>,

    /// CSS selector for --test
    #[arg(long)]
    pattern: Option<String>,

    /// Persist harvested items
    #[arg(long)]
    save: bool,

    /// Print harvested items
    #[arg(long)]
    display: bool,

    /// Derive images for new items and upload them
    #[arg(long, requires = "save")]
    upload: bool,

    /// Maximum items per section
    #[arg(long)]
    limit: Option<usize>,

    /// Number of upload workers
    #[arg(long)]
    clusters: Option<usize>,

    /// Comma-separated channel codes
    #[arg(long, default_value = "")]
    channels: String,

    /// Comma-separated section codes
    #[arg(long, default_value = "")]
    sections: String,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel the token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling in-flight work...");
            trigger.cancel();
        }
    });
    cancel
}

async fn object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.media.backend {
        ObjectBackend::Dir => Ok(Arc::new(DirObjectStore::new(&config.media.mirror_dir))),
        #[cfg(feature = "s3")]
        ObjectBackend::S3 => Ok(Arc::new(
            pressreview::storage::S3ObjectStore::from_config(&config.media).await?,
        )),
        #[cfg(not(feature = "s3"))]
        ObjectBackend::S3 => Err(AppError::config(
            "media.backend = \"s3\" requires the s3 feature",
        )),
    }
}

fn display_items(report: &SweepReport) {
    for item in &report.crawl.items {
        println!("[{}/{}] #{} {}", item.channel, item.section, item.position, item.title);
        println!("    {}", item.link);
    }
}

async fn run_crawl_command(config: &Config, store: &LocalStore, args: CrawlArgs) -> Result<()> {
    if args.test {
        let (Some(url), Some(pattern)) = (args.url, args.pattern) else {
            log::error!("--test requires both --url and --pattern");
            return Err(AppError::validation("missing --url or --pattern for --test"));
        };

        let client = http::create_async_client(&config.crawler)?;
        let mut harvester = SectionHarvester::with_client(client, &config.crawler);
        if let Some(limit) = args.limit {
            harvester = harvester.with_limit(limit);
        }
        let items = harvester.harvest(&Section::adhoc(url, pattern)).await?;
        for item in &items {
            println!("#{} {}", item.position, item.title);
            println!("    {}", item.link);
        }
        log::info!("{} items harvested", items.len());
        return Ok(());
    }

    let options = SweepOptions {
        channels: split_list(&args.channels),
        sections: split_list(&args.sections),
        limit: args.limit,
        save: args.save,
        upload: args.upload,
        workers: args.clusters,
    };
    if !args.all && options.channels.is_empty() && options.sections.is_empty() {
        log::error!("Nothing to crawl: pass --all, --channels or --sections");
        return Err(AppError::validation("no crawl selection given"));
    }

    let objects = if options.upload {
        Some(object_store(config).await?)
    } else {
        None
    };

    pressreview::utils::log::header("Crawl sweep");
    let report = pipeline::run_sweep(config, store, objects, &options, cancel_on_interrupt()).await?;

    if args.display {
        display_items(&report);
    }

    let mut summary = vec![
        ("Channels", report.crawl.channel_total.to_string()),
        ("Sections", report.crawl.section_total.to_string()),
        ("Section failures", report.crawl.section_failures.to_string()),
        ("Items", report.crawl.items.len().to_string()),
    ];
    if let Some(persist) = &report.persist {
        summary.push(("New", persist.created.to_string()));
        summary.push(("Updated", persist.updated.to_string()));
        summary.push(("Persist failures", persist.failed.to_string()));
        summary.push(("Enriched", persist.enriched.to_string()));
        summary.push(("Images", persist.images.to_string()));
    }
    if let Some(upload) = &report.upload {
        summary.push(("Uploaded", upload.uploaded.to_string()));
        summary.push(("Upload failures", upload.failed.to_string()));
    }
    pressreview::utils::log::summary("Crawl", &summary);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Press Review starting...");

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = load_runtime_config(&config_path)?;
    if config.store.data_dir == PathBuf::from("storage") {
        config.store.data_dir = cli.storage_dir.clone();
    }
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let default_tz = pipeline::parse_timezone(&config.digest.default_timezone)?;
    let store = LocalStore::open(&config.store.data_dir).await?;

    match cli.command {
        Command::Crawl(args) => run_crawl_command(&config, &store, args).await?,

        Command::Deliver { email, all } => {
            if email.is_none() && !all {
                log::error!("Pass --email or --all");
                return Err(AppError::validation("no delivery target given"));
            }

            config.validate_delivery()?;
            let client = http::create_async_client(&config.crawler)?;
            let mailer = create_mailer(&config.mail, client)?;
            let dispatcher = Dispatcher::new(&store, mailer.as_ref(), &config.digest, default_tz);

            let now = Utc::now();
            let report = dispatcher.run(&ReaderFilter::Due { now, email }, now).await?;
            pressreview::utils::log::summary(
                "Deliver",
                &[
                    ("Due readers", report.readers.to_string()),
                    ("Sent", report.sent.to_string()),
                    ("Nothing new", report.empty.to_string()),
                    ("Failed", report.failed.to_string()),
                ],
            );
        }

        Command::Reschedule => {
            let count = pipeline::run_reschedule(&store, default_tz, Utc::now()).await?;
            log::info!("Rescheduled {} readers", count);
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!("✓ Config OK");
        }

        Command::Info => {
            let (channels, headlines, readers) = store.collection_counts().await;
            log::info!("Storage directory: {}", store.root_dir().display());
            log::info!("Channels: {}", channels);
            log::info!("Headlines: {}", headlines);
            log::info!("Readers: {}", readers);
        }
    }

    log::info!("Done!");

    Ok(())
}
