//! Data models for scraped competitions and the artifacts derived from them.
//!
//! - [`CompetitionEvent`]: one normalized competition as scraped from the portal
//! - [`EventKey`]: the identity used for de-duplication and calendar UIDs
//! - [`FeedEntry`]: an event plus venue enrichment, as written to the JSON feed
//! - [`LocationRecord`]: one row of the hand-curated `locations.csv`
//! - [`CalendarIndexEntry`]: one published per-club calendar

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single scheduled shooting competition.
///
/// Optional fields serialize as `null` rather than being omitted so the feed
/// schema is the same for every record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompetitionEvent {
    /// Organizing club. Never empty.
    pub club: String,
    /// Competition name; empty when the portal omits it.
    pub title: String,
    pub date_start: NaiveDate,
    /// Last day of the competition, inclusive. Never before `date_start`.
    pub date_end: NaiveDate,
    /// Free-text venue as shown on the portal.
    pub location: Option<String>,
    /// Weapon types / categories, comma separated.
    pub discipline: Option<String>,
    /// Link to the regulations or announcement.
    pub source_url: Option<String>,
}

impl CompetitionEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            club: self.club.clone(),
            date_start: self.date_start,
            title: self.title.clone(),
        }
    }

    /// Title to show in calendars and lists; falls back to the club name.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.club
        } else {
            &self.title
        }
    }
}

/// The tuple two scraped records must share to be considered the same event.
///
/// The portal exposes no stable identifier, so this projection doubles as the
/// seed for calendar UIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub club: String,
    pub date_start: NaiveDate,
    pub title: String,
}

impl EventKey {
    /// Unambiguous string form used to derive UIDs. Fields are separated by
    /// the ASCII unit separator, which never appears in scraped text.
    pub fn seed(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.club,
            self.date_start.format("%Y-%m-%d"),
            self.title
        )
    }
}

/// One element of the published JSON feed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub event: CompetitionEvent,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Club website, derived from the regulation link host or the locations CSV.
    pub website: Option<String>,
}

impl From<CompetitionEvent> for FeedEntry {
    fn from(event: CompetitionEvent) -> Self {
        FeedEntry {
            event,
            latitude: None,
            longitude: None,
            website: None,
        }
    }
}

/// A row of `locations.csv`, keyed by sanitized location text.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct LocationRecord {
    pub location_text: String,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub website: String,
}

/// Coordinates are filled in by hand, so blank cells and the literal `None`
/// both mean "not yet known".
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "None")
        .and_then(|s| s.parse::<f64>().ok()))
}

/// A published per-club calendar, listed in `calendars/index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CalendarIndexEntry {
    pub club: String,
    /// File name relative to the calendars directory.
    pub file: String,
    /// Public HTTPS URL for direct download.
    pub url: Option<String>,
    /// The same URL with the `webcal` scheme, for one-click subscription.
    pub webcal: Option<String>,
}
