//! Venue enrichment from the hand-curated `locations.csv`.
//!
//! The portal only gives free-text venues. To place competitions on a map,
//! coordinates are kept in a CSV keyed by sanitized location text:
//!
//! ```text
//! location_text,latitude,longitude,website
//! Strzelnica Tarcza Gniezno ul. Leśna 1,52.53,17.6,https://tarcza.pl
//! Strzelnica LOK Leszno,,,
//! ```
//!
//! Each run fills the feed from this file and then rewrites it with any newly
//! seen venues appended (blank coordinates for a human to fill in) and
//! websites discovered from regulation links.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::error::PipelineError;
use crate::models::{CompetitionEvent, FeedEntry, LocationRecord};
use crate::utils::{sanitize_location, write_if_changed};

/// Known locations keyed by `location_text`.
pub type Locations = BTreeMap<String, LocationRecord>;

/// Load the locations CSV. A missing file is an empty table; malformed rows
/// are skipped with a warning.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_locations(path: &Path) -> Result<Locations, PipelineError> {
    if !path.exists() {
        info!("No locations file yet");
        return Ok(Locations::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut locations = Locations::new();
    for (i, row) in reader.deserialize::<LocationRecord>().enumerate() {
        match row {
            Ok(record) => {
                locations.insert(record.location_text.clone(), record);
            }
            Err(e) => warn!(row = i + 1, error = %e, "Skipping malformed locations row"),
        }
    }
    info!(count = locations.len(), "Loaded locations");
    Ok(locations)
}

/// Attach coordinates and club websites to events.
///
/// The website scraped from a club's regulation links wins over the one in
/// the CSV, which is only a fallback for clubs that never link regulations.
pub fn enrich(
    events: Vec<CompetitionEvent>,
    locations: &Locations,
    club_websites: &BTreeMap<String, String>,
) -> Vec<FeedEntry> {
    events
        .into_iter()
        .map(|event| {
            let record = event
                .location
                .as_deref()
                .map(sanitize_location)
                .and_then(|key| locations.get(&key));
            let website = club_websites
                .get(&event.club)
                .cloned()
                .or_else(|| record.map(|r| r.website.clone()).filter(|w| !w.is_empty()));
            FeedEntry {
                latitude: record.and_then(|r| r.latitude),
                longitude: record.and_then(|r| r.longitude),
                website,
                event,
            }
        })
        .collect()
}

/// Merge this run's venues into the known locations.
///
/// Existing rows are kept even when their venue is not listed this run, so
/// hand-entered coordinates are never lost. A venue's website is taken from
/// the first club seen there with a scraped website, replacing the CSV value;
/// venues with no such club keep what the CSV has.
pub fn merge_locations(
    known: &Locations,
    events: &[CompetitionEvent],
    club_websites: &BTreeMap<String, String>,
) -> Locations {
    let mut merged = known.clone();
    let mut refreshed = BTreeSet::new();
    for event in events {
        let Some(location) = event.location.as_deref() else {
            continue;
        };
        let key = sanitize_location(location);
        if key.is_empty() {
            continue;
        }
        let record = merged.entry(key.clone()).or_insert_with(|| LocationRecord {
            location_text: key.clone(),
            ..LocationRecord::default()
        });
        if let Some(website) = club_websites.get(&event.club) {
            if refreshed.insert(key) {
                record.website = website.clone();
            }
        }
    }
    merged
}

/// Render the locations table as CSV, rows sorted by location.
pub fn render_locations(locations: &Locations) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in locations.values() {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::io("locations CSV buffer", e.into_error()))
}

/// Rewrite the locations file if anything changed.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_locations(path: &Path, locations: &Locations) -> Result<bool, PipelineError> {
    let bytes = render_locations(locations)?;
    let changed = write_if_changed(path, &bytes).await?;
    let missing = locations
        .values()
        .filter(|r| r.latitude.is_none() || r.longitude.is_none())
        .count();
    info!(
        count = locations.len(),
        missing_coordinates = missing,
        changed,
        "Locations file updated"
    );
    Ok(changed)
}

/// What a human still needs to fill in, as seen from the published feed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LocationReport {
    /// `club - location` pairs without coordinates, sorted and unique.
    pub missing_coordinates: Vec<String>,
    /// Clubs without a website, sorted and unique.
    pub missing_websites: Vec<String>,
}

impl LocationReport {
    pub fn from_feed(entries: &[FeedEntry]) -> Self {
        let mut coords = BTreeSet::new();
        let mut websites = BTreeSet::new();
        for entry in entries {
            if entry.latitude.is_none() || entry.longitude.is_none() {
                coords.insert(format!(
                    "{} - {}",
                    entry.event.club,
                    entry.event.location.as_deref().unwrap_or("")
                ));
            }
            if entry.website.as_deref().is_none_or(str::is_empty) {
                websites.insert(entry.event.club.clone());
            }
        }
        LocationReport {
            missing_coordinates: coords.into_iter().collect(),
            missing_websites: websites.into_iter().collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_coordinates.is_empty() && self.missing_websites.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.missing_coordinates.is_empty() {
            writeln!(out, "All locations have coordinates.").unwrap();
        } else {
            writeln!(out, "Locations with missing coordinates:").unwrap();
            for loc in &self.missing_coordinates {
                writeln!(out, "- {}", loc).unwrap();
            }
        }
        writeln!(out).unwrap();
        if self.missing_websites.is_empty() {
            writeln!(out, "All clubs have websites.").unwrap();
        } else {
            writeln!(out, "Clubs with missing websites (no regulation link found yet):").unwrap();
            for club in &self.missing_websites {
                writeln!(out, "- {}", club).unwrap();
            }
        }
        out
    }
}
