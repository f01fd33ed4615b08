//! Date normalization for portal listings.
//!
//! The portal is hand-edited, so the date cell comes in several shapes:
//!
//! | Input                     | Meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `01.06.2024`, `1.6.2024`  | single day                                |
//! | `2024-06-01`              | single day, ISO                           |
//! | `01/06/2024`              | single day, slashes                       |
//! | `01.06.2024 - 02.06.2024` | full range                                |
//! | `01-02.06.2024`           | range within one month                    |
//! | `30.06-01.07.2024`        | range across months                       |
//! | `1 czerwca 2024`          | Polish month name                         |
//! | `01.06`, `1`              | completed from the month header above     |
//!
//! Everything normalizes to a pair of [`NaiveDate`]s with `end >= start`.
//! A date completed from a header whose month is earlier than the header's
//! belongs to the following year, so `30.12-02.01` under `Grudzień 2024`
//! ends on 2025-01-02.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::normalize_ws;

/// Year and month taken from a listing's month header, e.g. `Czerwiec 2024`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthContext {
    pub year: i32,
    pub month: u32,
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").unwrap());
static ISO_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());
static NUMERIC_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})(?:[./](\d{1,2})(?:[./](\d{2}|\d{4}))?)?\.?$").unwrap()
});
static NAMED_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})\.?\s*(\p{L}+)\.?(?:\s*(\d{4}))?$").unwrap()
});
static DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[-–—]\s*").unwrap());
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*r\.?$").unwrap());
static HEADER_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
static HEADER_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[./](\d{4})\b").unwrap());

/// Map a Polish month name (nominative or genitive, with or without
/// diacritics) to its number.
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    const STEMS: [(&str, u32); 13] = [
        ("stycz", 1),
        ("lut", 2),
        ("mar", 3),
        ("kwie", 4),
        ("maj", 5),
        ("czerw", 6),
        ("lip", 7),
        ("sierp", 8),
        ("wrze", 9),
        ("paźdz", 10),
        ("pazdz", 10),
        ("listop", 11),
        ("grud", 12),
    ];
    STEMS
        .iter()
        .find(|(stem, _)| lower.starts_with(*stem))
        .map(|(_, month)| *month)
}

/// Read the month/year context from a header such as `Czerwiec 2024` or
/// `06.2024`.
pub fn parse_month_header(text: &str) -> Option<MonthContext> {
    let text = normalize_ws(text);
    if let Some(caps) = HEADER_NUMERIC.captures(&text) {
        let month: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        return (1..=12).contains(&month).then_some(MonthContext { year, month });
    }
    let year: i32 = HEADER_YEAR.captures(&text)?[1].parse().ok()?;
    let month = text.split_whitespace().find_map(month_from_name)?;
    Some(MonthContext { year, month })
}

/// A date as written, possibly missing month and year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartialDate {
    day: u32,
    month: Option<u32>,
    year: Option<i32>,
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

fn parse_part(part: &str) -> Option<PartialDate> {
    let part = part.trim();
    if let Some(caps) = ISO_PART.captures(part) {
        return Some(PartialDate {
            day: caps[3].parse().ok()?,
            month: Some(caps[2].parse().ok()?),
            year: Some(caps[1].parse().ok()?),
        });
    }
    if let Some(caps) = NUMERIC_PART.captures(part) {
        return Some(PartialDate {
            day: caps[1].parse().ok()?,
            month: caps.get(2).and_then(|m| m.as_str().parse().ok()),
            year: caps.get(3).and_then(|m| expand_year(m.as_str())),
        });
    }
    if let Some(caps) = NAMED_PART.captures(part) {
        return Some(PartialDate {
            day: caps[1].parse().ok()?,
            month: Some(month_from_name(&caps[2])?),
            year: caps.get(3).and_then(|m| expand_year(m.as_str())),
        });
    }
    None
}

fn clean(text: &str) -> String {
    let text = normalize_ws(text).to_lowercase();
    let text = PARENTHESIZED.replace_all(&text, " ");
    let text = normalize_ws(&text);
    let text = YEAR_SUFFIX.replace(&text, "$1");
    DASH.replace_all(&text, "-").into_owned()
}

/// Normalize a date cell into an inclusive `(start, end)` range.
///
/// `context` fills in a missing month or year. Returns `None` when the text
/// is not a recognizable date, names an impossible date, or describes a range
/// that ends before it starts.
pub fn parse_date_range(text: &str, context: Option<MonthContext>) -> Option<(NaiveDate, NaiveDate)> {
    let text = clean(text);
    if text.is_empty() {
        return None;
    }

    // Whole-ISO cells (`2024-06-01`, `2024-06-01 2024-06-03`) are handled
    // directly; mixed cells fall through to the part parser.
    if ISO_DATE.replace_all(&text, "").trim_matches(|c: char| c == '-' || c.is_whitespace()).is_empty() {
        let iso: Vec<NaiveDate> = ISO_DATE
            .captures_iter(&text)
            .filter_map(|caps| {
                NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
            })
            .collect();
        return match iso.as_slice() {
            [single] => Some((*single, *single)),
            [start, end, ..] => (end >= start).then_some((*start, *end)),
            [] => None,
        };
    }

    let (first, second) = split_range(&text);
    let first = parse_part(first)?;
    let second = match second {
        Some(p) => Some(parse_part(p)?),
        None => None,
    };

    let Some(second) = second else {
        let month = first.month.or(context.map(|c| c.month))?;
        let year = first.year.or_else(|| year_in_context(month, context))?;
        let date = NaiveDate::from_ymd_opt(year, month, first.day)?;
        return Some((date, date));
    };

    let end_month = second.month.or(context.map(|c| c.month))?;
    let start_month = first.month.unwrap_or(end_month);

    if let Some(end_year) = second.year {
        let end = NaiveDate::from_ymd_opt(end_year, end_month, second.day)?;
        let start = NaiveDate::from_ymd_opt(first.year.unwrap_or(end_year), start_month, first.day)?;
        if start <= end {
            return Some((start, end));
        }
        // `30.12-02.01.2025`: the start inherited the end's year but belongs to
        // the year before.
        if first.year.is_none() {
            let start = NaiveDate::from_ymd_opt(end_year - 1, start_month, first.day)?;
            if start <= end {
                return Some((start, end));
            }
        }
        return None;
    }

    // No year on the end: anchor on the start and let the end roll into the
    // next year when its month wraps past December.
    let start_year = first.year.or_else(|| year_in_context(start_month, context))?;
    let start = NaiveDate::from_ymd_opt(start_year, start_month, first.day)?;
    let end = NaiveDate::from_ymd_opt(start_year, end_month, second.day)?;
    if start <= end {
        return Some((start, end));
    }
    if end_month < start_month {
        let end = NaiveDate::from_ymd_opt(start_year + 1, end_month, second.day)?;
        return Some((start, end));
    }
    None
}

/// Year of a date whose cell omits it. Rows sit under the header of the month
/// they start in, so a month earlier than the header's is in the next year
/// (`02.01` under `Grudzień 2024`).
fn year_in_context(month: u32, context: Option<MonthContext>) -> Option<i32> {
    context.map(|c| if month < c.month { c.year + 1 } else { c.year })
}

/// Split a cleaned cell at its range separator. A leading ISO date keeps its
/// own hyphens.
fn split_range(text: &str) -> (&str, Option<&str>) {
    let cut = match ISO_DATE.find(text) {
        Some(m) if m.start() == 0 => text[m.end()..].find('-').map(|i| m.end() + i),
        _ => text.find('-'),
    };
    match cut {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    }
}
