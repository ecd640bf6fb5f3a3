// src/models/channel.rs

//! Channel and Section data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A content source (usually one news site) grouping crawlable sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    /// Unique, immutable channel code
    pub code: String,

    /// Display name used in digest subjects
    pub name: String,

    /// Whether the default staleness sweep picks this channel up
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// When any section of this channel was last persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed: Option<DateTime<Utc>>,

    /// Items harvested for this channel in its last sweep
    #[serde(default)]
    pub last_import_count: usize,

    #[serde(default)]
    pub sections: Vec<Section>,
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// Sections with the owning channel code filled in.
    pub fn owned_sections(&self) -> impl Iterator<Item = Section> + '_ {
        self.sections.iter().map(|section| Section {
            channel: self.code.clone(),
            ..section.clone()
        })
    }
}

/// How a section's source is parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionFormat {
    #[default]
    Html,
    Rss,
}

/// One crawlable unit within a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    /// Section code, unique within the catalog
    pub code: String,

    /// Topic category stamped on every harvested item
    pub category: String,

    /// Owning channel code (filled from the parent channel when empty)
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub format: SectionFormat,

    /// Page or feed URL
    #[serde(default)]
    pub source_url: String,

    /// CSS selector matching headline links (HTML only)
    #[serde(default)]
    pub pattern: String,

    /// HTML attribute holding the link (usually "href")
    #[serde(default = "default_link_attr")]
    pub link_attr: String,
}

fn default_link_attr() -> String {
    "href".to_string()
}

impl Section {
    /// Ad-hoc HTML section used by test runs.
    pub fn adhoc(source_url: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            code: "test".to_string(),
            category: "latest".to_string(),
            channel: "test".to_string(),
            format: SectionFormat::Html,
            source_url: source_url.into(),
            pattern: pattern.into(),
            link_attr: default_link_attr(),
        }
    }

    /// Identifier used in logs.
    pub fn label(&self) -> String {
        format!("{}@{}", self.code, self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_sections_inherit_channel_code() {
        let channel: Channel = serde_json::from_str(
            r#"{
                "code": "bbc",
                "name": "BBC News",
                "sections": [
                    {"code": "bbc-politics", "category": "politics", "source_url": "https://bbc.example/politics", "pattern": "a.headline"},
                    {"code": "bbc-rss", "category": "latest", "format": "rss", "source_url": "https://bbc.example/rss.xml"}
                ]
            }"#,
        )
        .unwrap();

        assert!(channel.enabled);
        assert_eq!(channel.last_import_count, 0);

        let sections: Vec<Section> = channel.owned_sections().collect();
        assert_eq!(sections.len(), 2);
        assert!(sections.iter().all(|s| s.channel == "bbc"));
        assert_eq!(sections[0].link_attr, "href");
        assert_eq!(sections[1].format, SectionFormat::Rss);
        assert_eq!(sections[0].label(), "bbc-politics@bbc");
    }
}
