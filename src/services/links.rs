// src/services/links.rs

//! Canonical/AMP link metadata resolution.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::{http, resolve_url};

/// Metadata discovered on an article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLinks {
    pub canonical_url: Option<String>,
    pub amp_url: Option<String>,
    pub image_url: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub locale: Option<String>,

    /// True when the page advertises an AMP version
    pub is_valid: bool,
}

/// Resolves article metadata for first-seen items.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ResolvedLinks>;
}

/// Resolver reading `<link>` and OpenGraph tags from the article HTML.
pub struct HtmlLinkResolver {
    client: Client,
}

impl HtmlLinkResolver {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.resolve_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkResolver for HtmlLinkResolver {
    async fn resolve(&self, url: &str) -> Result<ResolvedLinks> {
        let html = http::fetch_text(&self.client, url).await?;
        parse_link_metadata(&html, url)
    }
}

/// Extract canonical, AMP and OpenGraph image metadata from a page.
pub fn parse_link_metadata(html: &str, page_url: &str) -> Result<ResolvedLinks> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let absolute = |href: &str| match &base {
        Some(base) => resolve_url(base, href),
        None => href.to_string(),
    };

    let canonical_url = link_href(&document, "canonical")?.map(|h| absolute(&h));
    let amp_url = link_href(&document, "amphtml")?.map(|h| absolute(&h));

    let mut image_url = None;
    for property in ["og:image", "og:image:url", "og:image:secure_url"] {
        if let Some(content) = meta_content(&document, property)? {
            image_url = Some(absolute(&content));
            break;
        }
    }

    let dimension = |property: &str| -> Result<Option<u32>> {
        Ok(meta_content(&document, property)?.and_then(|v| v.parse().ok()))
    };

    Ok(ResolvedLinks {
        is_valid: amp_url.is_some(),
        canonical_url,
        amp_url,
        image_url,
        image_width: dimension("og:image:width")?,
        image_height: dimension("og:image:height")?,
        locale: meta_content(&document, "og:locale")?,
    })
}

fn link_href(document: &Html, rel: &str) -> Result<Option<String>> {
    let selector = parse_selector(&format!(r#"link[rel="{rel}"]"#))?;
    Ok(first_attr(document, &selector, "href"))
}

fn meta_content(document: &Html, property: &str) -> Result<Option<String>> {
    let selector = parse_selector(&format!(r#"meta[property="{property}"]"#))?;
    Ok(first_attr(document, &selector, "content"))
}

fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
