// src/pipeline/crawl.rs

//! Crawl scheduling: channel selection and section fan-out.

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Channel, HarvestedItem, Section};
use crate::services::SectionHarvester;
use crate::storage::{ChannelFilter, DocumentStore};
use crate::utils::log;

/// Summary of a crawl run.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Harvested items, channel-contiguous and in section order
    pub items: Vec<HarvestedItem>,
    pub channel_total: usize,
    pub section_total: usize,
    pub section_failures: usize,
}

/// Select due channels and harvest every one of their sections.
pub async fn run_crawl(
    store: &dyn DocumentStore,
    harvester: &SectionHarvester,
    filter: &ChannelFilter,
    concurrency: usize,
) -> Result<CrawlOutcome> {
    let channels = store.find_channels(filter).await?;
    log::sub_item(&format!("{} channels selected", channels.len()));

    let mut outcome = crawl_channels(harvester, &channels, concurrency).await;
    outcome.channel_total = channels.len();
    Ok(outcome)
}

/// Harvest all sections of the given channels concurrently.
///
/// Every section is launched and joined; a failed section is logged,
/// counted and contributes no items.
pub async fn crawl_channels(
    harvester: &SectionHarvester,
    channels: &[Channel],
    concurrency: usize,
) -> CrawlOutcome {
    let sections: Vec<Section> = channels.iter().flat_map(Channel::owned_sections).collect();
    crawl_sections(harvester, sections, concurrency).await
}

/// Harvest a fixed list of sections concurrently, preserving input order.
pub async fn crawl_sections(
    harvester: &SectionHarvester,
    sections: Vec<Section>,
    concurrency: usize,
) -> CrawlOutcome {
    let mut outcome = CrawlOutcome {
        section_total: sections.len(),
        ..CrawlOutcome::default()
    };

    let mut results: Vec<Vec<HarvestedItem>> = vec![Vec::new(); sections.len()];
    let mut section_stream = stream::iter(sections.iter().enumerate())
        .map(|(index, section)| async move { (index, section, harvester.harvest(section).await) })
        .buffer_unordered(concurrency.max(1));

    while let Some((index, section, result)) = section_stream.next().await {
        match result {
            Ok(items) => results[index] = items,
            Err(error) => {
                outcome.section_failures += 1;
                log::warn(&format!(
                    "Failed to harvest {} ({}): {}",
                    section.label(),
                    section.source_url,
                    error
                ));
            }
        }
    }

    outcome.items = results.into_iter().flatten().collect();
    outcome
}
