// src/pipeline/persist.rs

//! Persistence upsert layer.
//!
//! Merges harvested items into the `headlines` collection by content hash,
//! enriches first-seen items and keeps channel bookkeeping current.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::models::{HarvestedItem, Headline};
use crate::services::{LinkResolver, MediaProcessor};
use crate::storage::DocumentStore;
use crate::utils::{content_hash, log};

/// Hash-keyed lock striping guarding per-record read-modify-write.
pub struct LockStripes {
    stripes: Vec<Mutex<()>>,
}

impl LockStripes {
    pub fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Stripe index for a hash; equal hashes always share a stripe.
    pub fn index(&self, hash: &str) -> usize {
        let folded = hash
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
        folded % self.stripes.len()
    }

    pub async fn lock(&self, hash: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.index(hash)].lock().await
    }
}

/// Optional enrichment collaborators for first-seen items.
#[derive(Clone, Copy, Default)]
pub struct Enrichment<'a> {
    pub resolver: Option<&'a dyn LinkResolver>,

    /// Present only when media upload is enabled
    pub media: Option<&'a MediaProcessor>,
}

/// Summary of a persistence run.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub enriched: usize,
    pub images: usize,

    /// `(channel code, items harvested this sweep)` in processing order
    pub channels: Vec<(String, usize)>,
}

enum Upserted {
    Created,
    Updated,
}

/// Persistence context shared by all item upserts of one run.
pub struct Persister<'a> {
    store: &'a dyn DocumentStore,
    stripes: LockStripes,
    enrichment: Enrichment<'a>,
    concurrency: usize,
    enriched: AtomicUsize,
    images: AtomicUsize,
}

impl<'a> Persister<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        enrichment: Enrichment<'a>,
        lock_stripes: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            stripes: LockStripes::new(lock_stripes),
            enrichment,
            concurrency: concurrency.max(1),
            enriched: AtomicUsize::new(0),
            images: AtomicUsize::new(0),
        }
    }

    /// Upsert every item concurrently, then record per-channel bookkeeping.
    ///
    /// Items must arrive channel-contiguous, as produced by the crawl step.
    pub async fn persist(&self, items: &[HarvestedItem], now: DateTime<Utc>) -> Result<PersistReport> {
        let mut report = PersistReport {
            channels: channel_counts(items),
            ..PersistReport::default()
        };

        let mut upserts = stream::iter(items)
            .map(|item| async move { (item, self.upsert(item, now).await) })
            .buffer_unordered(self.concurrency);

        while let Some((item, result)) = upserts.next().await {
            match result {
                Ok(Upserted::Created) => report.created += 1,
                Ok(Upserted::Updated) => report.updated += 1,
                Err(error) => {
                    report.failed += 1;
                    log::warn(&format!("Failed to persist {}: {}", item.link, error));
                }
            }
        }

        for (code, count) in &report.channels {
            self.store.mark_channel_processed(code, now, *count).await?;
        }

        report.enriched = self.enriched.load(Ordering::Relaxed);
        report.images = self.images.load(Ordering::Relaxed);
        Ok(report)
    }

    async fn upsert(&self, item: &HarvestedItem, now: DateTime<Utc>) -> Result<Upserted> {
        let hash = content_hash(&item.link);

        {
            let _guard = self.stripes.lock(&hash).await;
            if let Some(mut existing) = self.store.find_headline(&hash).await? {
                existing.merge_harvest(item, now);
                self.store.upsert_headline(&existing).await?;
                return Ok(Upserted::Updated);
            }
        }

        // Enrichment runs unlocked; the record is re-checked before insert.
        let mut headline = Headline::from_harvest(hash, item, now);
        let media_files = self.enrich(&mut headline).await;

        let _guard = self.stripes.lock(&headline.hash).await;
        if let Some(mut existing) = self.store.find_headline(&headline.hash).await? {
            discard(&media_files).await;
            existing.merge_harvest(item, now);
            self.store.upsert_headline(&existing).await?;
            return Ok(Upserted::Updated);
        }

        self.store.upsert_headline(&headline).await?;
        Ok(Upserted::Created)
    }

    /// Resolve link metadata and ingest the image; failures stay item-local.
    async fn enrich(&self, headline: &mut Headline) -> Vec<std::path::PathBuf> {
        let Some(resolver) = self.enrichment.resolver else {
            return Vec::new();
        };

        let links = match resolver.resolve(&headline.link).await {
            Ok(links) => links,
            Err(error) => {
                log::debug(&format!("Link resolution failed for {}: {}", headline.link, error));
                return Vec::new();
            }
        };

        self.enriched.fetch_add(1, Ordering::Relaxed);
        headline.canonical_url = links.canonical_url;
        if links.is_valid {
            headline.amp_url = links.amp_url;
        } else {
            log::debug(&format!("No AMP page for {}", headline.link));
        }
        headline.locale = links.locale;
        headline.original_image_url = links.image_url;
        headline.image_width = links.image_width;
        headline.image_height = links.image_height;

        let (Some(media), Some(image_url)) = (self.enrichment.media, &headline.original_image_url)
        else {
            return Vec::new();
        };

        match media.ingest(image_url).await {
            Ok(asset) => {
                self.images.fetch_add(1, Ordering::Relaxed);
                headline.image_uuid = Some(asset.file_name);
                headline.image_width = Some(asset.width);
                headline.image_height = Some(asset.height);
                asset.files
            }
            Err(error) => {
                log::warn(&format!("Image {} skipped: {}", image_url, error));
                Vec::new()
            }
        }
    }
}

/// Per-channel item counts, emitted whenever the channel changes.
pub fn channel_counts(items: &[HarvestedItem]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        match counts.last_mut() {
            Some((code, count)) if *code == item.channel => *count += 1,
            _ => counts.push((item.channel.clone(), 1)),
        }
    }
    counts
}

async fn discard(files: &[std::path::PathBuf]) {
    for file in files {
        if let Err(error) = tokio::fs::remove_file(file).await {
            log::debug(&format!("Could not remove {}: {}", file.display(), error));
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::services::ResolvedLinks;
    use crate::storage::LocalStore;

    fn item(channel: &str, link: &str, position: u32) -> HarvestedItem {
        HarvestedItem {
            title: format!("Title of {link}"),
            link: link.to_string(),
            channel: channel.to_string(),
            section: "latest".to_string(),
            position,
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl LinkResolver for FixedResolver {
        async fn resolve(&self, url: &str) -> Result<ResolvedLinks> {
            if url.ends_with("/broken") {
                return Err(AppError::crawl(url, "timeout"));
            }
            Ok(ResolvedLinks {
                canonical_url: Some(format!("{url}#canonical")),
                amp_url: Some(format!("{url}/amp")),
                locale: Some("en_GB".to_string()),
                is_valid: true,
                ..ResolvedLinks::default()
            })
        }
    }

    #[test]
    fn stripes_are_stable_per_hash() {
        let stripes = LockStripes::new(8);
        let hash = content_hash("https://news.example/a");
        assert_eq!(stripes.index(&hash), stripes.index(&hash));
        assert!(stripes.index(&hash) < 8);
        assert_eq!(LockStripes::new(0).index(&hash), 0);
    }

    #[test]
    fn counts_follow_channel_changes() {
        let items = vec![
            item("bbc", "a", 1),
            item("bbc", "b", 2),
            item("cnn", "c", 1),
            item("bbc", "d", 1),
        ];
        assert_eq!(
            channel_counts(&items),
            [("bbc".to_string(), 2), ("cnn".to_string(), 1), ("bbc".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn repeated_links_merge_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        let persister = Persister::new(&store, Enrichment::default(), 4, 8);
        let now = Utc::now();

        let first = vec![item("bbc", "https://n.example/a", 3)];
        let report = persister.persist(&first, now).await.unwrap();
        assert_eq!((report.created, report.updated), (1, 0));

        let again = vec![
            item("bbc", "https://n.example/a", 1),
            item("bbc", "https://n.example/a", 3),
        ];
        let report = persister.persist(&again, now).await.unwrap();
        assert_eq!((report.created, report.updated), (0, 2));
        assert_eq!(store.headline_count().await, 1);

        let stored = store
            .find_headline(&content_hash("https://n.example/a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.history.into_iter().collect::<Vec<_>>(), [1, 3]);
    }

    #[tokio::test]
    async fn resolver_failure_still_persists_item() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        let resolver = FixedResolver;
        let enrichment = Enrichment {
            resolver: Some(&resolver),
            media: None,
        };
        let persister = Persister::new(&store, enrichment, 4, 8);

        let items = vec![
            item("bbc", "https://n.example/ok", 1),
            item("bbc", "https://n.example/broken", 2),
        ];
        let report = persister.persist(&items, Utc::now()).await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.enriched, 1);

        let ok = store
            .find_headline(&content_hash("https://n.example/ok"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ok.amp_url.as_deref(), Some("https://n.example/ok/amp"));
        assert_eq!(ok.locale.as_deref(), Some("en_GB"));

        let broken = store
            .find_headline(&content_hash("https://n.example/broken"))
            .await
            .unwrap()
            .unwrap();
        assert!(broken.canonical_url.is_none());
    }
}
