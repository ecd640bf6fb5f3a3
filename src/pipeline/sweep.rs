// src/pipeline/sweep.rs

//! Crawl sweep orchestration: crawl, persist, then upload media.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::crawl::{CrawlOutcome, run_crawl};
use crate::pipeline::persist::{Enrichment, PersistReport, Persister};
use crate::pipeline::upload::{UploadOptions, UploadReport, run_upload_pool};
use crate::services::{HtmlLinkResolver, MediaProcessor, SectionHarvester};
use crate::storage::{ChannelFilter, DocumentStore, ObjectStore};
use crate::utils::{http, log};

/// Run-mode switches for one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Explicit channel codes; overrides the staleness filter
    pub channels: Vec<String>,
    /// Explicit section codes; overrides the staleness filter
    pub sections: Vec<String>,
    /// Per-section item limit override
    pub limit: Option<usize>,
    /// Persist harvested items
    pub save: bool,
    /// Derive images for new items and run the upload pool
    pub upload: bool,
    /// Upload worker count override
    pub workers: Option<usize>,
}

/// Summary of a sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub crawl: CrawlOutcome,
    pub persist: Option<PersistReport>,
    pub upload: Option<UploadReport>,
}

/// Run one crawl sweep.
///
/// Without `save` the sweep only harvests. First-seen items get link
/// metadata; with `upload` their images are derived and the media temp
/// directory is drained into `objects`.
pub async fn run_sweep(
    config: &Config,
    store: &dyn DocumentStore,
    objects: Option<Arc<dyn ObjectStore>>,
    options: &SweepOptions,
    cancel: CancellationToken,
) -> Result<SweepReport> {
    let total_steps = if options.upload { 3 } else { 2 };
    let client = http::create_async_client(&config.crawler)?;
    let mut harvester = SectionHarvester::with_client(client.clone(), &config.crawler);
    if let Some(limit) = options.limit {
        harvester = harvester.with_limit(limit);
    }

    log::step(1, total_steps, "Harvesting sections");
    let started = Utc::now();
    let filter = ChannelFilter::select(
        options.channels.clone(),
        options.sections.clone(),
        started,
        chrono::Duration::seconds(config.crawler.staleness_secs as i64),
    );
    let crawl = run_crawl(store, &harvester, &filter, config.crawler.max_concurrent).await?;
    log::sub_item(&format!(
        "{} items from {} sections ({} failed)",
        crawl.items.len(),
        crawl.section_total,
        crawl.section_failures
    ));

    let mut report = SweepReport {
        crawl,
        ..SweepReport::default()
    };
    if !options.save {
        return Ok(report);
    }

    let resolver = HtmlLinkResolver::new(&config.crawler)?;
    let media;
    let mut enrichment = Enrichment {
        resolver: Some(&resolver),
        media: None,
    };
    if options.upload {
        media = MediaProcessor::new(client, &config.media);
        media.prepare().await?;
        enrichment.media = Some(&media);
    }

    log::step(2, total_steps, "Persisting headlines");
    let persister = Persister::new(
        store,
        enrichment,
        config.crawler.lock_stripes,
        config.crawler.persist_concurrency,
    );
    let persisted = persister.persist(&report.crawl.items, Utc::now()).await?;
    log::sub_item(&format!(
        "{} new, {} updated, {} failed",
        persisted.created, persisted.updated, persisted.failed
    ));
    report.persist = Some(persisted);

    if let (true, Some(objects)) = (options.upload, objects) {
        log::step(3, total_steps, "Uploading media");
        let upload_options = UploadOptions {
            source_dir: config.media.temp_dir.clone(),
            subfolder: config.media.subfolder.clone(),
            workers: options.workers.unwrap_or(config.media.workers),
            timeout: Duration::from_secs(config.media.upload_timeout_secs),
        };
        report.upload = Some(run_upload_pool(objects, &upload_options, cancel).await?);
    }

    Ok(report)
}
