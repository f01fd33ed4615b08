//! iCalendar (RFC 5545) generation for per-club subscriptions.
//!
//! Every competition becomes an all-day `VEVENT`. Calendar clients match
//! events across refreshes by `UID`, so UIDs are derived from the event's
//! [`EventKey`] with UUID v5 instead of being generated randomly: re-running
//! the pipeline on unchanged data yields the same UIDs and, because `DTSTAMP`
//! is derived from the event too, byte-identical files.
//!
//! The flip side: an edit to a field outside the key (venue, end date,
//! disciplines) keeps both `UID` and `DTSTAMP`, and no `SEQUENCE` or
//! `LAST-MODIFIED` is emitted. Subscribed clients re-read the whole document
//! on each refresh and pick the edit up; a client that only applies updates
//! with a newer stamp will keep the old version.
//!
//! # Example
//!
//! ```text
//! BEGIN:VCALENDAR
//! VERSION:2.0
//! PRODID:-//wzss_calendar//Zawody strzeleckie//PL
//! CALSCALE:GREGORIAN
//! METHOD:PUBLISH
//! X-WR-CALNAME:KS Tarcza Gniezno
//! REFRESH-INTERVAL;VALUE=DURATION:PT24H
//! X-PUBLISHED-TTL:PT24H
//! BEGIN:VEVENT
//! UID:5f0c…@wzss.pl
//! DTSTAMP:20240601T000000Z
//! DTSTART;VALUE=DATE:20240601
//! DTEND;VALUE=DATE:20240602
//! SUMMARY:Zawody Ligowe
//! …
//! END:VEVENT
//! END:VCALENDAR
//! ```

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::models::{CompetitionEvent, EventKey};

const CRLF: &str = "\r\n";
const MAX_LINE_OCTETS: usize = 75;

/// Namespace under which event keys are hashed into UIDs. Changing it would
/// re-identify every published event.
static EVENT_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"https://portal.wzss.pl/competitions"));

/// Settings shared by every calendar of a run.
#[derive(Debug, Clone)]
pub struct CalendarOptions {
    /// Right-hand side of every UID.
    pub uid_domain: String,
    /// Suggested polling interval for subscribed clients.
    pub refresh_hours: u32,
}

/// Stable identifier for an event, e.g. `1b4e28ba-…@wzss.pl`.
pub fn event_uid(key: &EventKey, domain: &str) -> String {
    let uuid = Uuid::new_v5(&EVENT_NAMESPACE, key.seed().as_bytes());
    format!("{}@{}", uuid.hyphenated(), domain)
}

/// Escape a TEXT value (RFC 5545 §3.3.11).
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Fold a content line at 75 octets without splitting a UTF-8 sequence,
/// then terminate it with CRLF.
fn push_line(out: &mut String, line: &str) {
    let mut used = 0usize;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if used + len > MAX_LINE_OCTETS {
            out.push_str(CRLF);
            out.push(' ');
            used = 1;
        }
        out.push(ch);
        used += len;
    }
    out.push_str(CRLF);
}

fn property(out: &mut String, name: &str, value: &str) {
    push_line(out, &format!("{}:{}", name, value));
}

fn ics_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn description(event: &CompetitionEvent) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(discipline) = &event.discipline {
        lines.push(format!("Konkurencje: {}", discipline));
    }
    if let Some(url) = &event.source_url {
        lines.push(format!("Regulamin: {}", url));
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn push_event(out: &mut String, event: &CompetitionEvent, options: &CalendarOptions) {
    // DTEND is exclusive for all-day events.
    let end = event
        .date_end
        .checked_add_days(Days::new(1))
        .unwrap_or(event.date_end);

    property(out, "BEGIN", "VEVENT");
    property(out, "UID", &event_uid(&event.key(), &options.uid_domain));
    property(out, "DTSTAMP", &format!("{}T000000Z", ics_date(event.date_start)));
    property(out, "DTSTART;VALUE=DATE", &ics_date(event.date_start));
    property(out, "DTEND;VALUE=DATE", &ics_date(end));
    property(out, "SUMMARY", &escape_text(event.display_title()));
    if let Some(location) = &event.location {
        property(out, "LOCATION", &escape_text(location));
    }
    if let Some(text) = description(event) {
        property(out, "DESCRIPTION", &escape_text(&text));
    }
    if let Some(url) = &event.source_url {
        property(out, "URL", url);
    }
    property(out, "CATEGORIES", &escape_text(&event.club));
    property(out, "TRANSP", "TRANSPARENT");
    property(out, "END", "VEVENT");
}

/// Render a complete calendar document.
///
/// # Arguments
///
/// * `name` - Display name for the calendar (`X-WR-CALNAME`)
/// * `events` - Events to include, already in publication order
/// * `options` - UID domain and refresh interval
pub fn render_calendar<'a>(
    name: &str,
    events: impl IntoIterator<Item = &'a CompetitionEvent>,
    options: &CalendarOptions,
) -> String {
    let mut out = String::new();
    let refresh = format!("PT{}H", options.refresh_hours.max(1));

    property(&mut out, "BEGIN", "VCALENDAR");
    property(&mut out, "VERSION", "2.0");
    property(
        &mut out,
        "PRODID",
        &format!("-//{}//Zawody strzeleckie//PL", env!("CARGO_PKG_NAME")),
    );
    property(&mut out, "CALSCALE", "GREGORIAN");
    property(&mut out, "METHOD", "PUBLISH");
    property(&mut out, "X-WR-CALNAME", &escape_text(name));
    property(&mut out, "REFRESH-INTERVAL;VALUE=DURATION", &refresh);
    property(&mut out, "X-PUBLISHED-TTL", &refresh);

    for event in events {
        push_event(&mut out, event, options);
    }
    property(&mut out, "END", "VCALENDAR");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CalendarOptions {
        CalendarOptions {
            uid_domain: "wzss.pl".to_string(),
            refresh_hours: 24,
        }
    }

    fn event(title: &str) -> CompetitionEvent {
        CompetitionEvent {
            club: "Klub A".to_string(),
            title: title.to_string(),
            date_start: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            date_end: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            location: Some("Poznań, ul. Strzelecka 1".to_string()),
            discipline: Some("Pistolet, Karabin".to_string()),
            source_url: Some("https://klub-a.pl/regulamin.pdf".to_string()),
        }
    }

    fn unfold(ics: &str) -> String {
        ics.replace("\r\n ", "")
    }

    #[test]
    fn test_uid_is_stable_across_runs() {
        let a = event_uid(&event("Zawody Ligowe").key(), "wzss.pl");
        let b = event_uid(&event("Zawody Ligowe").key(), "wzss.pl");
        assert_eq!(a, b);
        assert!(a.ends_with("@wzss.pl"));
    }

    #[test]
    fn test_uid_ignores_non_key_fields() {
        let mut moved = event("Zawody Ligowe");
        moved.location = Some("Leszno".to_string());
        moved.date_end = moved.date_start;
        assert_eq!(
            event_uid(&event("Zawody Ligowe").key(), "wzss.pl"),
            event_uid(&moved.key(), "wzss.pl")
        );
    }

    #[test]
    fn test_non_key_edit_changes_body_but_not_identity() {
        let before = event("Zawody Ligowe");
        let mut after = before.clone();
        after.location = Some("Leszno".to_string());
        after.date_end = after.date_start;

        let old = render_calendar("Klub A", [&before], &options());
        let new = render_calendar("Klub A", [&after], &options());
        assert_ne!(old, new);
        assert!(new.contains("LOCATION:Leszno\r\n"));
        assert!(new.contains("DTEND;VALUE=DATE:20240602\r\n"));

        let header = |ics: &str, name: &str| {
            ics.lines().find(|l| l.starts_with(name)).map(str::to_string)
        };
        assert_eq!(header(&old, "UID:"), header(&new, "UID:"));
        assert_eq!(header(&old, "DTSTAMP:"), header(&new, "DTSTAMP:"));
        assert!(!new.contains("SEQUENCE"));
    }

    #[test]
    fn test_uid_changes_with_key() {
        let base = event_uid(&event("Zawody Ligowe").key(), "wzss.pl");
        assert_ne!(base, event_uid(&event("Puchar").key(), "wzss.pl"));

        let mut other_club = event("Zawody Ligowe");
        other_club.club = "Klub B".to_string();
        assert_ne!(base, event_uid(&other_club.key(), "wzss.pl"));

        let mut other_day = event("Zawody Ligowe");
        other_day.date_start = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        assert_ne!(base, event_uid(&other_day.key(), "wzss.pl"));
    }

    #[test]
    fn test_uid_matches_uuid_v5_shape() {
        let uid = event_uid(&event("Zawody").key(), "wzss.pl");
        let uuid = Uuid::parse_str(uid.trim_end_matches("@wzss.pl")).unwrap();
        assert_eq!(uuid.get_version_num(), 5);
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a,b;c\\d\ne\r"), "a\\,b\\;c\\\\d\\ne");
    }

    #[test]
    fn test_render_calendar_structure() {
        let events = vec![event("Zawody Ligowe")];
        let ics = render_calendar("Klub A", &events, &options());
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("X-WR-CALNAME:Klub A\r\n"));
        assert!(ics.contains("REFRESH-INTERVAL;VALUE=DURATION:PT24H\r\n"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20240601\r\n"));
        assert!(ics.contains("DTEND;VALUE=DATE:20240603\r\n"));
        assert!(ics.contains("DTSTAMP:20240601T000000Z\r\n"));
        assert!(ics.contains("SUMMARY:Zawody Ligowe\r\n"));
        assert!(ics.contains("LOCATION:Poznań\\, ul. Strzelecka 1\r\n"));
        assert!(ics.contains("URL:https://klub-a.pl/regulamin.pdf\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);

        let unfolded = unfold(&ics);
        assert!(unfolded.contains(
            "DESCRIPTION:Konkurencje: Pistolet\\, Karabin\\nRegulamin: https://klub-a.pl/regulamin.pdf\r\n"
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let events = vec![event("Zawody Ligowe"), event("Puchar")];
        assert_eq!(
            render_calendar("Klub A", &events, &options()),
            render_calendar("Klub A", &events, &options())
        );
    }

    #[test]
    fn test_empty_calendar_is_valid() {
        let ics = render_calendar("Klub A", &[], &options());
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(!ics.contains("VEVENT"));
    }

    #[test]
    fn test_summary_falls_back_to_club() {
        let mut untitled = event("");
        untitled.discipline = None;
        untitled.source_url = None;
        let ics = render_calendar("Klub A", [&untitled], &options());
        assert!(ics.contains("SUMMARY:Klub A\r\n"));
        assert!(!ics.contains("DESCRIPTION"));
        assert!(!ics.contains("URL:"));
    }

    #[test]
    fn test_long_lines_fold_on_char_boundaries() {
        let title = "Zawody o Puchar Prezesa Wielkopolskiego Związku Strzelectwa Sportowego – żółć ".repeat(3);
        let ics = render_calendar("Klub A", [&event(&title)], &options());
        for line in ics.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS, "{line:?} is {} octets", line.len());
        }
        assert!(unfold(&ics).contains(&format!("SUMMARY:{}", escape_text(&title))));
    }
}
