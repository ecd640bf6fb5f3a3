// src/utils/mod.rs

//! Utility functions and helpers.

pub mod http;
pub mod log;

use sha2::{Digest, Sha256};
use url::Url;

/// Deterministic identity of a harvested item: hex SHA-256 of its link.
///
/// Only the link is hashed, so retitled stories keep their identity.
pub fn content_hash(link: &str) -> String {
    hex::encode(Sha256::digest(link.as_bytes()))
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Host part of a link, or the raw link when it does not parse.
pub fn host_name(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| link.to_string())
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
