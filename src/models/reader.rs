// src/models/reader.rs

//! Newsletter subscriber records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recurring weekly availability of a reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// ISO weekday numbers, Monday = 1 .. Sunday = 7 (0 is read as Sunday)
    #[serde(default)]
    pub days: Vec<u32>,

    /// Clock times, `HH:MM` or `HH:MM:SS`
    #[serde(default)]
    pub hours: Vec<String>,
}

/// A digest subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reader {
    pub id: String,
    pub email: String,

    /// IANA timezone name; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(flatten)]
    pub availability: Availability,

    /// Subscribed channel codes
    #[serde(default)]
    pub channels: Vec<String>,

    /// Subscribed section categories
    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_send: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl Reader {
    pub fn is_subscribed(&self) -> bool {
        self.unsubscribed_at.is_none()
    }

    /// Whether a digest is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_send.is_some_and(|at| at <= now)
    }
}
