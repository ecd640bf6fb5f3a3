// src/services/harvester.rs

//! Section harvester service.
//!
//! Fetches one section (HTML page or RSS feed) and extracts its ranked
//! `{title, link}` items.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, HarvestedItem, Section, SectionFormat};
use crate::utils::{http, normalize_whitespace, resolve_url};

/// Service harvesting sections with bounded per-host concurrency.
pub struct SectionHarvester {
    client: Client,
    item_limit: usize,
    per_domain: usize,
    domains: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SectionHarvester {
    /// Create a harvester with its own HTTP client.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self::with_client(http::create_async_client(config)?, config))
    }

    /// Create a harvester sharing an existing HTTP client.
    pub fn with_client(client: Client, config: &CrawlerConfig) -> Self {
        Self {
            client,
            item_limit: config.item_limit,
            per_domain: config.per_domain_concurrency.max(1),
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Override the per-harvest item limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.item_limit = limit;
        self
    }

    /// Harvest one section.
    ///
    /// An empty source URL yields no items. Fetch and parse failures are
    /// returned to the caller, which treats the section as empty.
    pub async fn harvest(&self, section: &Section) -> Result<Vec<HarvestedItem>> {
        if section.source_url.trim().is_empty() {
            log::debug!("Section {} has no source URL", section.label());
            return Ok(Vec::new());
        }

        let _permit = self.domain_permit(&section.source_url).await?;
        log::debug!("Visiting {}", section.source_url);

        let items = match section.format {
            SectionFormat::Html => {
                let body = http::fetch_text(&self.client, &section.source_url).await?;
                extract_html(&body, section, self.item_limit)?
            }
            SectionFormat::Rss => {
                let body = http::fetch_bytes(&self.client, &section.source_url).await?;
                extract_feed(&body, section, self.item_limit)?
            }
        };

        log::debug!("{}: {} items", section.label(), items.len());
        Ok(items)
    }

    /// Acquire a slot for the section's host.
    async fn domain_permit(&self, source_url: &str) -> Result<OwnedSemaphorePermit> {
        let host = Url::parse(source_url)?
            .host_str()
            .unwrap_or_default()
            .to_string();

        let semaphore = {
            let mut domains = self.domains.lock().await;
            Arc::clone(
                domains
                    .entry(host)
                    .or_insert_with(|| Arc::new(Semaphore::new(self.per_domain))),
            )
        };

        semaphore
            .acquire_owned()
            .await
            .map_err(|_| AppError::Cancelled)
    }
}

/// Extract ranked items from an HTML document.
///
/// Elements with an empty title or link are skipped without consuming a
/// position; relative links are resolved against the section URL.
pub fn extract_html(html: &str, section: &Section, limit: usize) -> Result<Vec<HarvestedItem>> {
    let selector = parse_selector(&section.pattern)?;
    let base_url = Url::parse(&section.source_url).ok();
    let document = Html::parse_document(html);

    let mut items = Vec::new();
    for element in document.select(&selector) {
        if items.len() >= limit {
            break;
        }

        let title = normalize_whitespace(&element.text().collect::<String>());
        let raw_link = element.value().attr(&section.link_attr).unwrap_or("").trim();
        if title.is_empty() || raw_link.is_empty() {
            continue;
        }

        let link = match &base_url {
            Some(base) => resolve_url(base, raw_link),
            None => raw_link.to_string(),
        };
        items.push(accept(section, title, link, items.len()));
    }
    Ok(items)
}

/// Extract ranked items from an RSS/Atom feed, in feed order.
pub fn extract_feed(bytes: &[u8], section: &Section, limit: usize) -> Result<Vec<HarvestedItem>> {
    let feed =
        feed_rs::parser::parse(bytes).map_err(|e| AppError::feed(&section.source_url, e))?;

    let mut items = Vec::new();
    for entry in feed.entries {
        if items.len() >= limit {
            break;
        }

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            continue;
        }

        items.push(accept(section, title, link, items.len()));
    }
    Ok(items)
}

fn accept(section: &Section, title: String, link: String, accepted: usize) -> HarvestedItem {
    HarvestedItem {
        title,
        link,
        channel: section.channel.clone(),
        section: section.category.clone(),
        position: accepted as u32 + 1,
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
