// src/pipeline/dispatch.rs

//! Digest selection and delivery.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, Result};
use crate::models::{DigestConfig, DigestHeadline, DigestPayload, Headline, Reader};
use crate::pipeline::schedule::reader_next_send;
use crate::services::{Mailer, TokenPurpose, sign_token};
use crate::storage::{DocumentStore, HeadlineQuery, ReaderFilter, ScheduleUpdate};
use crate::utils::{host_name, log};

/// Summary of a dispatch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub readers: usize,
    pub sent: usize,
    /// Readers with no surviving headlines
    pub empty: usize,
    /// Failed sends plus failed schedule updates
    pub failed: usize,
}

/// Headlines surviving the per-channel cap and fuzzy suppression.
#[derive(Debug, Default)]
pub struct Selection<'a> {
    pub accepted: Vec<&'a Headline>,
    pub suppressed: usize,
    pub capped: usize,
}

/// Apply the per-channel cap, then Jaro near-duplicate suppression.
///
/// A channel's slot is consumed before the similarity check, so a
/// suppressed duplicate still counts against its channel's cap.
pub fn select_headlines(candidates: &[Headline], cap: usize, threshold: f64) -> Selection<'_> {
    let mut selection = Selection::default();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for candidate in candidates {
        let used = slots.entry(candidate.channel.as_str()).or_default();
        if *used >= cap {
            selection.capped += 1;
            continue;
        }
        *used += 1;

        let duplicate = selection
            .accepted
            .iter()
            .any(|accepted| strsim::jaro(&accepted.title, &candidate.title) >= threshold);
        if duplicate {
            selection.suppressed += 1;
        } else {
            selection.accepted.push(candidate);
        }
    }
    selection
}

/// Human-readable label for a section category.
pub fn topic_label(code: &str) -> &'static str {
    match code {
        "latest" => "Latest",
        "business" => "Business",
        "politics" => "Politics",
        "entertainment" => "Entertainment",
        "tech" => "Tech",
        "sport" => "Sport",
        "gossips" => "Gossips",
        "art_culture" => "Art & Culture",
        "film" => "Film",
        "food" => "Food",
        "music" => "Music",
        "science" => "Science",
        "photography" => "Photography",
        "travel" => "Travel",
        "style" => "Style",
        "health" => "Health",
        "media" => "Media",
        "lgbt" => "LGBT+",
        _ => "All",
    }
}

/// `Latest news from A`, `A and B`, `A, B and C`.
pub fn subject_line(channel_names: &[String]) -> String {
    let listed = match channel_names {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    };
    format!("Latest news from {listed}")
}

/// Group accepted headlines by topic label.
pub fn group_by_topic(
    accepted: &[&Headline],
    names: &HashMap<String, String>,
) -> BTreeMap<String, Vec<DigestHeadline>> {
    let mut grouped: BTreeMap<String, Vec<DigestHeadline>> = BTreeMap::new();
    for headline in accepted {
        let channel_name = display_name(names, &headline.channel);
        grouped
            .entry(topic_label(&headline.section).to_string())
            .or_default()
            .push(DigestHeadline::from_headline(
                headline,
                host_name(&headline.link),
                channel_name,
            ));
    }
    grouped
}

fn display_name(names: &HashMap<String, String>, code: &str) -> String {
    names.get(code).cloned().unwrap_or_else(|| code.to_string())
}

/// Distinct channel display names in order of first appearance.
fn represented_channels(accepted: &[&Headline], names: &HashMap<String, String>) -> Vec<String> {
    let mut represented: Vec<String> = Vec::new();
    for headline in accepted {
        let name = display_name(names, &headline.channel);
        if !represented.contains(&name) {
            represented.push(name);
        }
    }
    represented
}

/// Dispatch context for one sweep over due readers.
pub struct Dispatcher<'a> {
    store: &'a dyn DocumentStore,
    mailer: &'a dyn Mailer,
    config: &'a DigestConfig,
    default_tz: Tz,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        mailer: &'a dyn Mailer,
        config: &'a DigestConfig,
        default_tz: Tz,
    ) -> Self {
        Self {
            store,
            mailer,
            config,
            default_tz,
        }
    }

    /// Deliver digests to every reader matched by `filter`.
    ///
    /// Readers are processed sequentially. A failed send is logged and leaves
    /// the reader's schedule untouched so the next sweep retries it. A failed
    /// schedule update is logged and counted without stopping the loop.
    ///
    /// An empty signing key or out-of-range look-back window is rejected
    /// before any reader is touched.
    pub async fn run(&self, filter: &ReaderFilter, now: DateTime<Utc>) -> Result<DispatchReport> {
        if self.config.token_key.trim().is_empty() {
            return Err(AppError::config(
                "digest.token_key is empty, refusing to deliver digests",
            ));
        }
        let lookback = Duration::try_hours(self.config.lookback_hours)
            .filter(|window| *window >= Duration::zero())
            .ok_or_else(|| {
                AppError::config(format!(
                    "digest.lookback_hours {} is out of range",
                    self.config.lookback_hours
                ))
            })?;

        let readers = self.store.find_readers(filter).await?;
        let names = self.store.channel_names().await?;
        let mut report = DispatchReport {
            readers: readers.len(),
            ..DispatchReport::default()
        };

        for reader in &readers {
            match self.deliver(reader, &names, lookback, now).await {
                Ok(true) => report.sent += 1,
                Ok(false) => report.empty += 1,
                Err(error) => {
                    report.failed += 1;
                    log::warn(&format!("Digest for {} failed: {}", reader.email, error));
                    continue;
                }
            }

            let update = ScheduleUpdate {
                delivered_at: Some(now),
                next_send: reader_next_send(reader, self.default_tz, now),
            };
            if let Err(error) = self.store.update_reader_schedule(&reader.id, update).await {
                report.failed += 1;
                log::warn(&format!("Schedule update for {} failed: {}", reader.email, error));
            }
        }

        Ok(report)
    }

    /// Select, render and send one reader's digest. Returns whether one was sent.
    async fn deliver(
        &self,
        reader: &Reader,
        names: &HashMap<String, String>,
        lookback: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let query = HeadlineQuery {
            channels: reader.channels.clone(),
            topics: reader.topics.clone(),
            since: reader
                .delivered_at
                .unwrap_or_else(|| now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC)),
            max_position: self.config.max_position,
            limit: self.config.max_candidates,
        };
        let candidates = self.store.find_headlines(&query).await?;
        let selection = select_headlines(
            &candidates,
            self.config.per_channel_cap,
            self.config.similarity_threshold,
        );

        log::debug(&format!(
            "{}: {} candidates, {} accepted, {} suppressed, {} capped",
            reader.email,
            candidates.len(),
            selection.accepted.len(),
            selection.suppressed,
            selection.capped
        ));

        if selection.accepted.is_empty() {
            return Ok(false);
        }

        let payload = DigestPayload {
            token: sign_token(&reader.id, TokenPurpose::Unsubscribe, &self.config.token_key, now)?,
            website: self.config.website_url.clone(),
            user_id: reader.id.clone(),
            email: reader.email.clone(),
            headlines: group_by_topic(&selection.accepted, names),
        };
        let subject = subject_line(&represented_channels(&selection.accepted, names));

        let receipt = self
            .mailer
            .send_template(
                &self.config.template,
                &reader.email,
                &subject,
                &serde_json::to_value(&payload)?,
            )
            .await?;

        log::info(&format!(
            "Sent {} headlines to {} ({})",
            payload.headline_count(),
            reader.email,
            receipt
        ));
        Ok(true)
    }
}
