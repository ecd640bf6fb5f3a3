// src/storage/mod.rs

//! Storage abstractions for the press review pipeline.
//!
//! Two seams:
//! - [`DocumentStore`]: the `channels`, `headlines` and `readers` collections
//! - [`ObjectStore`]: flat key/bytes storage for derived images
//!
//! ## Local Layout
//!
//! ```text
//! storage/
//! ├── config.toml
//! ├── channels/{code}.json
//! ├── headlines/{hash}.json
//! └── readers/{id}.json
//! ```

pub mod local;
pub mod object;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::{Channel, Headline, Reader};

// Re-export for convenience
pub use local::LocalStore;
pub use object::DirObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

/// Which channels a crawl sweep selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    /// Channel code or any section code in the given sets
    Explicit {
        channels: Vec<String>,
        sections: Vec<String>,
    },
    /// Enabled channels never processed or processed at or before `cutoff`
    Stale { cutoff: DateTime<Utc> },
}

impl ChannelFilter {
    /// Explicit lists win when either is non-empty; otherwise staleness applies.
    pub fn select(
        channels: Vec<String>,
        sections: Vec<String>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        if channels.is_empty() && sections.is_empty() {
            Self::Stale {
                cutoff: now - window,
            }
        } else {
            Self::Explicit { channels, sections }
        }
    }

    pub fn matches(&self, channel: &Channel) -> bool {
        match self {
            Self::Explicit { channels, sections } => {
                channels.contains(&channel.code)
                    || channel.sections.iter().any(|s| sections.contains(&s.code))
            }
            Self::Stale { cutoff } => {
                channel.enabled && channel.last_processed.is_none_or(|at| at <= *cutoff)
            }
        }
    }
}

/// Digest eligibility filter over the `headlines` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlineQuery {
    pub channels: Vec<String>,
    pub topics: Vec<String>,
    pub since: DateTime<Utc>,

    /// Highest eligible latest-pass position, also bounding history
    pub max_position: u32,
    pub limit: usize,
}

impl HeadlineQuery {
    pub fn matches(&self, headline: &Headline) -> bool {
        self.channels.contains(&headline.channel)
            && self.topics.contains(&headline.section)
            && headline.created_at >= self.since
            && headline.position <= self.max_position
            && headline.seen_within(self.max_position)
    }

    /// Filter, sort newest-first and cap a candidate set.
    pub fn apply<'a>(&self, headlines: impl IntoIterator<Item = &'a Headline>) -> Vec<Headline> {
        let mut found: Vec<Headline> = headlines
            .into_iter()
            .filter(|h| self.matches(h))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.hash.cmp(&b.hash)));
        found.truncate(self.limit);
        found
    }
}

/// Which readers a dispatch sweep loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderFilter {
    /// Every reader
    All,
    /// Readers with `next_send <= now`, optionally narrowed to one email
    Due {
        now: DateTime<Utc>,
        email: Option<String>,
    },
}

impl ReaderFilter {
    pub fn matches(&self, reader: &Reader) -> bool {
        match self {
            Self::All => true,
            Self::Due { now, email } => {
                reader.is_due(*now) && email.as_ref().is_none_or(|e| *e == reader.email)
            }
        }
    }
}

/// Field-level update of a reader's delivery schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleUpdate {
    /// New `delivered_at`; `None` leaves the field unchanged
    pub delivered_at: Option<DateTime<Utc>>,

    /// New `next_send`; `None` clears it
    pub next_send: Option<DateTime<Utc>>,
}

/// Trait for document store backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load channels matching a filter.
    async fn find_channels(&self, filter: &ChannelFilter) -> Result<Vec<Channel>>;

    /// Channel code to display name map.
    async fn channel_names(&self) -> Result<HashMap<String, String>>;

    /// Record a channel's last crawl.
    async fn mark_channel_processed(
        &self,
        code: &str,
        at: DateTime<Utc>,
        import_count: usize,
    ) -> Result<()>;

    async fn find_headline(&self, hash: &str) -> Result<Option<Headline>>;

    /// Insert or replace a headline by hash.
    async fn upsert_headline(&self, headline: &Headline) -> Result<()>;

    async fn find_headlines(&self, query: &HeadlineQuery) -> Result<Vec<Headline>>;

    async fn find_readers(&self, filter: &ReaderFilter) -> Result<Vec<Reader>>;

    async fn update_reader_schedule(&self, id: &str, update: ScheduleUpdate) -> Result<()>;
}

/// Trait for object storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key` and return a locator for the object.
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<String>;
}
