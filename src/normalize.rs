//! Merge per-source results into the canonical record set.

use itertools::Itertools;
use tracing::{info, warn};

use crate::models::CompetitionEvent;

/// Counts behind one normalization pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub scraped: usize,
    /// Dropped for an empty club or an inverted date range.
    pub invalid: usize,
    /// Dropped as repeats of an earlier [`EventKey`](crate::models::EventKey).
    pub duplicates: usize,
}

/// De-duplicate and order events from all sources.
///
/// Records sharing an [`EventKey`](crate::models::EventKey) collapse to the
/// first one seen. The result is sorted by `date_start`, then `club`, then
/// `title`, which is a total order once keys are unique.
pub fn normalize_events(events: impl IntoIterator<Item = CompetitionEvent>) -> Vec<CompetitionEvent> {
    let (events, stats) = normalize_with_stats(events);
    info!(
        scraped = stats.scraped,
        unique = events.len(),
        invalid = stats.invalid,
        duplicates = stats.duplicates,
        "Normalized events"
    );
    events
}

fn normalize_with_stats(
    events: impl IntoIterator<Item = CompetitionEvent>,
) -> (Vec<CompetitionEvent>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut valid_count = 0usize;
    let mut events: Vec<CompetitionEvent> = events
        .into_iter()
        .inspect(|_| stats.scraped += 1)
        .filter(|e| {
            let valid = !e.club.trim().is_empty() && e.date_end >= e.date_start;
            if valid {
                valid_count += 1;
            } else {
                warn!(club = %e.club, title = %e.title, start = %e.date_start, end = %e.date_end, "Dropping invalid event");
            }
            valid
        })
        .unique_by(CompetitionEvent::key)
        .collect();
    stats.invalid = stats.scraped - valid_count;
    stats.duplicates = valid_count - events.len();

    events.sort_by(|a, b| {
        a.date_start
            .cmp(&b.date_start)
            .then_with(|| a.club.cmp(&b.club))
            .then_with(|| a.title.cmp(&b.title))
    });
    (events, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn event(club: &str, title: &str, day: u32, location: &str) -> CompetitionEvent {
        let date = NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        CompetitionEvent {
            club: club.to_string(),
            title: title.to_string(),
            date_start: date,
            date_end: date,
            location: Some(location.to_string()),
            discipline: None,
            source_url: None,
        }
    }

    #[test]
    fn test_verbatim_duplicate_collapses_to_one() {
        let a = event("Klub A", "Zawody Ligowe", 1, "Poznań");
        let out = normalize_events(vec![a.clone(), a.clone()]);
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let first = event("Klub A", "Zawody Ligowe", 1, "Poznań");
        let second = event("Klub A", "Zawody Ligowe", 1, "Leszno");
        let out = normalize_events(vec![first.clone(), second]);
        assert_eq!(out, vec![first]);
    }

    #[test]
    fn test_sorted_by_date_then_club_then_title() {
        let out = normalize_events(vec![
            event("Klub B", "Puchar", 2, "x"),
            event("Klub B", "Memoriał", 1, "x"),
            event("Klub A", "Zawody", 1, "x"),
            event("Klub A", "Liga", 1, "x"),
        ]);
        let order: Vec<(&str, &str)> = out.iter().map(|e| (e.club.as_str(), e.title.as_str())).collect();
        assert_eq!(
            order,
            [("Klub A", "Liga"), ("Klub A", "Zawody"), ("Klub B", "Memoriał"), ("Klub B", "Puchar")]
        );
    }

    #[test]
    fn test_output_keys_are_unique() {
        let mut input = Vec::new();
        for day in 1..=5 {
            for club in ["Klub A", "Klub B"] {
                input.push(event(club, "Liga", day, "x"));
                input.push(event(club, "Liga", day, "y"));
            }
        }
        let out = normalize_events(input);
        let keys: HashSet<_> = out.iter().map(CompetitionEvent::key).collect();
        assert_eq!(keys.len(), out.len());
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_invalid_events_are_dropped() {
        let mut inverted = event("Klub A", "Liga", 5, "x");
        inverted.date_end = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let blank = event("  ", "Liga", 1, "x");
        assert!(normalize_events(vec![inverted, blank]).is_empty());
    }

    #[test]
    fn test_stats_separate_invalid_from_duplicates() {
        let a = event("Klub A", "Liga", 1, "x");
        let mut inverted = event("Klub B", "Liga", 5, "x");
        inverted.date_end = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (out, stats) = normalize_with_stats(vec![a.clone(), a.clone(), inverted, event(" ", "Liga", 1, "x")]);
        assert_eq!(out, vec![a]);
        assert_eq!(
            stats,
            NormalizeStats {
                scraped: 4,
                invalid: 2,
                duplicates: 1,
            }
        );
    }
}
