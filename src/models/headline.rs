// src/models/headline.rs

//! Harvested items and persisted headline records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted `{title, link}` pair from a single section harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestedItem {
    pub title: String,
    pub link: String,

    /// Owning channel code
    pub channel: String,

    /// Section category
    pub section: String,

    /// 1-based rank within the harvest pass
    pub position: u32,
}

/// A persisted news item keyed by the hash of its link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    /// Identity key: content hash of `link`
    pub hash: String,
    pub title: String,

    #[serde(default)]
    pub description: String,
    pub link: String,
    pub channel: String,
    pub section: String,

    /// Creation time of the latest harvest pass that surfaced this link
    pub created_at: DateTime<Utc>,

    /// Rank in the latest harvest pass
    pub position: u32,

    /// Every position ever observed for this hash
    #[serde(default)]
    pub history: BTreeSet<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,

    /// Generated local file name of the downloaded image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,

    /// Article locale from `og:locale`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Headline {
    /// Build a first-seen record from a harvested item.
    pub fn from_harvest(hash: String, item: &HarvestedItem, now: DateTime<Utc>) -> Self {
        Self {
            hash,
            title: item.title.clone(),
            description: String::new(),
            link: item.link.clone(),
            channel: item.channel.clone(),
            section: item.section.clone(),
            created_at: now,
            position: item.position,
            history: BTreeSet::from([item.position]),
            canonical_url: None,
            amp_url: None,
            original_image_url: None,
            image_uuid: None,
            image_width: None,
            image_height: None,
            locale: None,
        }
    }

    /// Merge a re-harvest into an existing record.
    ///
    /// Mutable fields take the latest pass's values; identity, enrichment
    /// and accumulated history are preserved.
    pub fn merge_harvest(&mut self, item: &HarvestedItem, now: DateTime<Utc>) {
        self.title = item.title.clone();
        self.section = item.section.clone();
        self.position = item.position;
        self.created_at = now;
        self.history.insert(item.position);
    }

    /// Whether any observed position lies within `0..=max`.
    pub fn seen_within(&self, max: u32) -> bool {
        self.history.range(..=max).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(position: u32) -> HarvestedItem {
        HarvestedItem {
            title: format!("Story at {position}"),
            link: "https://news.example/story".to_string(),
            channel: "news".to_string(),
            section: "politics".to_string(),
            position,
        }
    }

    #[test]
    fn merge_accumulates_distinct_positions() {
        let now = Utc::now();
        let mut headline = Headline::from_harvest("h".into(), &item(3), now);
        headline.amp_url = Some("https://news.example/amp/story".into());

        headline.merge_harvest(&item(1), now);
        headline.merge_harvest(&item(3), now);

        assert_eq!(headline.position, 3);
        assert_eq!(headline.history.iter().copied().collect::<Vec<_>>(), [1, 3]);
        assert_eq!(headline.amp_url.as_deref(), Some("https://news.example/amp/story"));
    }

    #[test]
    fn seen_within_checks_history_range() {
        let now = Utc::now();
        let mut headline = Headline::from_harvest("h".into(), &item(8), now);
        assert!(!headline.seen_within(5));
        headline.merge_harvest(&item(5), now);
        assert!(headline.seen_within(5));
    }
}
