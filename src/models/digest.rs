// src/models/digest.rs

//! Digest payload handed to the mail template.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Headline;

/// One headline as rendered inside a digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestHeadline {
    pub title: String,
    pub description: String,
    pub link: String,

    /// URL authority of `link`, or the raw link when it does not parse
    pub hostname: String,
    pub channel: String,
    pub channel_name: String,
    pub section: String,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amp_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_uuid: Option<String>,
}

impl DigestHeadline {
    pub fn from_headline(headline: &Headline, hostname: String, channel_name: String) -> Self {
        Self {
            title: headline.title.clone(),
            description: headline.description.clone(),
            link: headline.link.clone(),
            hostname,
            channel: headline.channel.clone(),
            channel_name,
            section: headline.section.clone(),
            created_at: headline.created_at,
            amp_url: headline.amp_url.clone(),
            image_uuid: headline.image_uuid.clone(),
        }
    }
}

/// Template data for one reader's digest.
#[derive(Debug, Clone, Serialize)]
pub struct DigestPayload {
    /// Signed unsubscribe token
    pub token: String,
    pub website: String,
    pub user_id: String,
    pub email: String,

    /// Accepted headlines grouped by topic label
    pub headlines: BTreeMap<String, Vec<DigestHeadline>>,
}

impl DigestPayload {
    pub fn headline_count(&self) -> usize {
        self.headlines.values().map(Vec::len).sum()
    }
}
