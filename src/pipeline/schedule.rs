// src/pipeline/schedule.rs

//! Digest scheduling: next send time from weekly availability.

use chrono::{
    DateTime, Datelike, Days, Duration, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Utc,
};
use chrono_tz::Tz;

use crate::error::{AppError, Result};
use crate::models::{Availability, Reader};
use crate::storage::{DocumentStore, ReaderFilter, ScheduleUpdate};
use crate::utils::log;

/// Days scanned forward from today, inclusive.
const SCAN_DAYS: u64 = 7;

/// Earliest instant `>= now` on an available weekday at an available time.
///
/// Returns `None` when the reader is not eligible (unsubscribed) or no slot
/// exists in the scan window.
pub fn next_send(
    availability: &Availability,
    tz: Tz,
    eligible: bool,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !eligible {
        return None;
    }

    let days: Vec<u32> = availability
        .days
        .iter()
        .map(|&d| if d == 0 { 7 } else { d })
        .filter(|d| (1..=7).contains(d))
        .collect();
    let mut times: Vec<NaiveTime> = availability
        .hours
        .iter()
        .filter_map(|h| match parse_time(h) {
            Some(time) => Some(time),
            None => {
                log::warn(&format!("Ignoring unparseable time of day '{}'", h));
                None
            }
        })
        .collect();
    times.sort();

    let today = now.with_timezone(&tz).date_naive();
    (0..=SCAN_DAYS)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter(|date| days.contains(&date.weekday().number_from_monday()))
        .flat_map(|date| times.iter().map(move |time| date.and_time(*time)))
        .filter_map(|local| resolve_local(tz, local))
        .filter(|at| *at >= now)
        .min()
}

/// Map a wall-clock slot to an instant.
///
/// Ambiguous times take the earlier instant. Times inside a forward gap are
/// shifted by the gap length, so `01:30` on a spring-forward night becomes
/// `02:30` in the new offset.
fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Some(at.with_timezone(&Utc)),
        LocalResult::None => {
            let offset_at = |naive: NaiveDateTime| {
                tz.offset_from_utc_datetime(&naive).fix().local_minus_utc()
            };
            let gap = offset_at(local + Duration::days(1)) - offset_at(local - Duration::days(1));
            tz.from_local_datetime(&(local + Duration::seconds(i64::from(gap.max(0)))))
                .earliest()
                .map(|at| at.with_timezone(&Utc))
        }
    }
}

/// Resolve a reader's timezone, falling back to the default.
pub fn reader_timezone(reader: &Reader, default_tz: Tz) -> Tz {
    match reader.timezone.as_deref().map(str::trim) {
        None | Some("") => default_tz,
        Some(name) => name.parse().unwrap_or_else(|_| {
            log::warn(&format!(
                "Reader {} has unknown timezone '{}', using {}",
                reader.id, name, default_tz
            ));
            default_tz
        }),
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| AppError::schedule(format!("unknown timezone '{name}'")))
}

/// Next send time for a reader.
pub fn reader_next_send(reader: &Reader, default_tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    next_send(
        &reader.availability,
        reader_timezone(reader, default_tz),
        reader.is_subscribed(),
        now,
    )
}

/// Recompute `next_send` for every reader without touching `delivered_at`.
pub async fn run_reschedule(
    store: &dyn DocumentStore,
    default_tz: Tz,
    now: DateTime<Utc>,
) -> Result<usize> {
    let readers = store.find_readers(&ReaderFilter::All).await?;
    for reader in &readers {
        let update = ScheduleUpdate {
            delivered_at: None,
            next_send: reader_next_send(reader, default_tz, now),
        };
        store.update_reader_schedule(&reader.id, update).await?;
    }
    Ok(readers.len())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}
