//! Parser for the WZSS competition portal listing.
//!
//! The listing at `https://portal.wzss.pl/competitions/current` is a
//! Tailwind-styled page: month headings (`p.text-2xl`, e.g. `Czerwiec 2024`)
//! followed by one grid row per competition (`sm:grid-cols-12`). Inside a row:
//!
//! | Field            | Marker                                    |
//! |------------------|-------------------------------------------|
//! | club             | first text of `p.uppercase`               |
//! | location         | `p.leading-4`                             |
//! | date             | `div.whitespace-nowrap`                   |
//! | title            | `strong.leading-4`                        |
//! | regulations link | `a[href]` whose text contains `Regulamin` |
//! | weapon types     | `p` inside `div.grid-cols-2`              |
//!
//! Rows that lack a club or a usable date are skipped. A page that has no
//! visible text, or whose rows have all lost their club marker, is reported
//! as a [`ParseError::Structural`] so upstream layout drift never turns into
//! silently empty output.

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::dates::{MonthContext, parse_date_range, parse_month_header};
use crate::error::ParseError;
use crate::models::CompetitionEvent;
use crate::utils::{normalize_ws, website_from_link};

const ROW_CLASS: &str = "sm:grid-cols-12";
const HEADER_CLASS: &str = "text-2xl";
const REGULATION_LABEL: &str = "Regulamin";

/// Result of parsing one listing page.
#[derive(Debug, Default)]
pub struct ParsedPage {
    /// Events in page order, before cross-source de-duplication.
    pub events: Vec<CompetitionEvent>,
    /// Club website per club (scheme and host of its first regulations link).
    pub club_websites: BTreeMap<String, String>,
    /// Month headings found on the page.
    pub headers_seen: usize,
    /// Competition rows found on the page.
    pub rows_seen: usize,
    /// Rows dropped for lacking a club or a parseable date.
    pub rows_skipped: usize,
}

impl ParsedPage {
    /// Whether the page carried any listing markup at all. An off-season
    /// listing still shows month headings; a page with neither headings nor
    /// rows is more likely a maintenance page or renamed classes.
    pub fn has_listing_markers(&self) -> bool {
        self.headers_seen > 0 || self.rows_seen > 0
    }
}

struct Selectors {
    body: Selector,
    blocks: Selector,
    club: Selector,
    location: Selector,
    date: Selector,
    title: Selector,
    link: Selector,
    weapons: Selector,
    paragraph: Selector,
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

impl Selectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Selectors {
            body: selector("body")?,
            blocks: selector(&format!("p.{HEADER_CLASS}, [class~=\"{ROW_CLASS}\"]"))?,
            club: selector("p.uppercase")?,
            location: selector("p.leading-4")?,
            date: selector("div.whitespace-nowrap")?,
            title: selector("strong.leading-4")?,
            link: selector("a[href]")?,
            weapons: selector("div.grid-cols-2")?,
            paragraph: selector("p")?,
        })
    }
}

fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn is_header(element: &ElementRef) -> bool {
    element.value().name() == "p" && has_class(element, HEADER_CLASS)
}

fn is_row(element: &ElementRef) -> bool {
    has_class(element, ROW_CLASS)
}

/// First strict descendant of `scope` matching `sel`.
fn find<'a>(scope: ElementRef<'a>, sel: &Selector) -> Option<ElementRef<'a>> {
    scope.select(sel).find(|el| el.id() != scope.id())
}

fn text_of(element: ElementRef) -> String {
    normalize_ws(&element.text().collect::<Vec<_>>().join(" "))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Whether the body shows any text to a reader. Script and style payloads
/// do not count.
fn has_visible_text(body: ElementRef) -> bool {
    body.descendants().any(|node| {
        let Some(text) = node.value().as_text() else {
            return false;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .is_some_and(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"));
        !hidden && !text.trim().is_empty()
    })
}

/// Fields read from one row before validation.
#[derive(Debug, Default)]
struct RawRow {
    club: Option<String>,
    location: Option<String>,
    date_text: Option<String>,
    title: Option<String>,
    regulation_link: Option<String>,
    weapons: Vec<String>,
}

fn read_row(row: ElementRef, sel: &Selectors, page_url: &Url) -> RawRow {
    let club = find(row, &sel.club)
        .and_then(|p| p.text().next().map(normalize_ws))
        .and_then(non_empty);
    let location = find(row, &sel.location).map(text_of).and_then(non_empty);
    let date_text = find(row, &sel.date).map(text_of).and_then(non_empty);
    let title = find(row, &sel.title).map(text_of).and_then(non_empty);

    let regulation_link = row
        .select(&sel.link)
        .find(|a| a.text().any(|t| t.contains(REGULATION_LABEL)))
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .map(|url| url.to_string());

    let weapons = find(row, &sel.weapons)
        .map(|grid| {
            grid.select(&sel.paragraph)
                .map(text_of)
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    RawRow {
        club,
        location,
        date_text,
        title,
        regulation_link,
        weapons,
    }
}

/// Extract competitions from one listing page.
///
/// # Arguments
///
/// * `html` - Raw page body
/// * `page_url` - URL the page was fetched from; relative links resolve against it
///
/// # Errors
///
/// [`ParseError::Structural`] when the page is blank or its rows no longer
/// carry the markers above. A page with no competition rows at all is valid
/// and yields no events.
#[instrument(level = "info", skip_all, fields(url = %page_url))]
pub fn parse_competitions(html: &str, page_url: &Url) -> Result<ParsedPage, ParseError> {
    let sel = Selectors::new()?;
    let document = Html::parse_document(html);

    let body = document
        .select(&sel.body)
        .next()
        .ok_or_else(|| ParseError::Structural("document has no body".to_string()))?;
    if !has_visible_text(body) {
        return Err(ParseError::Structural("page body is empty".to_string()));
    }

    let mut page = ParsedPage::default();
    let mut context: Option<MonthContext> = None;
    let mut rows_with_club = 0usize;

    for block in document.select(&sel.blocks) {
        if is_header(&block) {
            page.headers_seen += 1;
            context = parse_month_header(&text_of(block));
            debug!(?context, "Month header");
            continue;
        }
        // Nested grids inside a row belong to that row.
        let nested = block
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_row(&ancestor));
        if nested {
            continue;
        }

        page.rows_seen += 1;
        let raw = read_row(block, &sel, page_url);

        let Some(club) = raw.club else {
            page.rows_skipped += 1;
            warn!(row = page.rows_seen, "Row has no club marker; skipping");
            continue;
        };
        rows_with_club += 1;

        if let Some(website) = raw.regulation_link.as_deref().and_then(website_from_link) {
            page.club_websites.entry(club.clone()).or_insert(website);
        }

        let dates = raw
            .date_text
            .as_deref()
            .and_then(|text| parse_date_range(text, context));
        let Some((date_start, date_end)) = dates else {
            page.rows_skipped += 1;
            warn!(%club, date = ?raw.date_text, "Row has no usable date; skipping");
            continue;
        };

        let event = CompetitionEvent {
            club,
            title: raw.title.unwrap_or_default(),
            date_start,
            date_end,
            location: raw.location,
            discipline: non_empty(raw.weapons.join(", ")),
            source_url: raw.regulation_link,
        };
        debug!(club = %event.club, title = %event.title, date = %event.date_start, "Parsed competition");
        page.events.push(event);
    }

    if page.rows_seen > 0 && rows_with_club == 0 {
        return Err(ParseError::Structural(format!(
            "{} competition rows found but none has a club marker",
            page.rows_seen
        )));
    }

    if !page.has_listing_markers() {
        warn!("Page has no month headings and no competition rows; treating as empty, check for layout drift");
    }

    info!(
        headers = page.headers_seen,
        rows = page.rows_seen,
        skipped = page.rows_skipped,
        events = page.events.len(),
        "Parsed listing page"
    );
    Ok(page)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{header, page, row};
    use super::*;
    use chrono::NaiveDate;

    fn portal_url() -> Url {
        Url::parse("https://portal.wzss.pl/competitions/current").unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parses_full_row() {
        let html = page(&[
            header("Czerwiec 2024"),
            row(
                "KS Tarcza Gniezno",
                "Strzelnica Tarcza, Gniezno ul. Leśna 1",
                "01.06.2024",
                "Zawody Ligowe",
                Some("https://tarcza.pl/pliki/regulamin.pdf"),
                &["Pistolet", "Karabin"],
            ),
        ]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert_eq!(parsed.rows_seen, 1);
        assert_eq!(parsed.events.len(), 1);

        let event = &parsed.events[0];
        assert_eq!(event.club, "KS Tarcza Gniezno");
        assert_eq!(event.title, "Zawody Ligowe");
        assert_eq!(event.date_start, d(2024, 6, 1));
        assert_eq!(event.date_end, d(2024, 6, 1));
        assert_eq!(event.location.as_deref(), Some("Strzelnica Tarcza, Gniezno ul. Leśna 1"));
        assert_eq!(event.discipline.as_deref(), Some("Pistolet, Karabin"));
        assert_eq!(event.source_url.as_deref(), Some("https://tarcza.pl/pliki/regulamin.pdf"));
        assert_eq!(
            parsed.club_websites.get("KS Tarcza Gniezno").map(String::as_str),
            Some("https://tarcza.pl")
        );
    }

    #[test]
    fn test_missing_optional_fields_are_unset() {
        let html = page(&[row("Klub A", "", "01.06.2024", "", None, &[])]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        let event = &parsed.events[0];
        assert_eq!(event.title, "");
        assert_eq!(event.location, None);
        assert_eq!(event.discipline, None);
        assert_eq!(event.source_url, None);
        assert!(parsed.club_websites.is_empty());
    }

    #[test]
    fn test_relative_regulation_link_is_resolved() {
        let html = page(&[row("Klub A", "Poznań", "01.06.2024", "Puchar", Some("/files/reg.pdf"), &[])]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert_eq!(
            parsed.events[0].source_url.as_deref(),
            Some("https://portal.wzss.pl/files/reg.pdf")
        );
    }

    #[test]
    fn test_whitespace_noise_is_collapsed() {
        let html = page(&[row(
            "\n   Klub&nbsp;A  ",
            "  Poznań,\n   ul. Strzelecka  ",
            " 01.06.2024 ",
            "  Zawody \t Ligowe ",
            None,
            &[" Pistolet "],
        )]);
        let event = &parse_competitions(&html, &portal_url()).unwrap().events[0];
        assert_eq!(event.club, "Klub A");
        assert_eq!(event.title, "Zawody Ligowe");
        assert_eq!(event.location.as_deref(), Some("Poznań, ul. Strzelecka"));
        assert_eq!(event.discipline.as_deref(), Some("Pistolet"));
    }

    #[test]
    fn test_header_supplies_missing_year() {
        let html = page(&[
            header("Lipiec 2024"),
            row("Klub A", "Poznań", "13-14", "Puchar Lata", None, &[]),
            header("Sierpień 2024"),
            row("Klub B", "Leszno", "03.08", "Memoriał", None, &[]),
        ]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert_eq!(parsed.events[0].date_start, d(2024, 7, 13));
        assert_eq!(parsed.events[0].date_end, d(2024, 7, 14));
        assert_eq!(parsed.events[1].date_start, d(2024, 8, 3));
    }

    #[test]
    fn test_rows_without_date_are_skipped() {
        let html = page(&[
            row("Klub A", "Poznań", "wkrótce", "Puchar", None, &[]),
            row("Klub B", "Leszno", "02.06.2024", "Memoriał", None, &[]),
        ]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert_eq!(parsed.rows_seen, 2);
        assert_eq!(parsed.rows_skipped, 1);
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].club, "Klub B");
    }

    #[test]
    fn test_verbatim_duplicates_survive_parsing() {
        // De-duplication happens after merging sources, not per page.
        let r = row("Klub A", "Poznań", "01.06.2024", "Zawody Ligowe", None, &[]);
        let parsed = parse_competitions(&page(&[r.clone(), r]), &portal_url()).unwrap();
        assert_eq!(parsed.events.len(), 2);
    }

    #[test]
    fn test_page_without_markers_is_an_empty_season() {
        let html = page(&[header("Czerwiec 2024"), "<p>Brak zaplanowanych zawodów.</p>".to_string()]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert_eq!(parsed.rows_seen, 0);
        assert_eq!(parsed.headers_seen, 1);
        assert!(parsed.has_listing_markers());
        assert!(parsed.events.is_empty());
    }

    #[test]
    fn test_page_without_any_listing_markup_is_flagged() {
        let html = page(&["<h1>Przerwa techniczna</h1><p>Zapraszamy później.</p>".to_string()]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert!(parsed.events.is_empty());
        assert!(!parsed.has_listing_markers());
    }

    #[test]
    fn test_empty_body_is_structural_failure() {
        for html in ["", "<html><body>   </body></html>", "<html><body><div id=\"app\"></div><script>boot()</script></body></html>"] {
            let err = parse_competitions(html, &portal_url()).unwrap_err();
            assert!(matches!(err, ParseError::Structural(_)), "{html:?}");
        }
    }

    #[test]
    fn test_rows_without_club_marker_are_structural_failure() {
        let html = page(&[r#"<div class="sm:grid-cols-12"><div class="whitespace-nowrap">01.06.2024</div><h3>Klub A</h3></div>"#.to_string()]);
        let err = parse_competitions(&html, &portal_url()).unwrap_err();
        assert!(matches!(err, ParseError::Structural(_)));
    }

    #[test]
    fn test_nested_grid_is_not_a_second_row() {
        let inner = r#"<div class="sm:grid-cols-12"><p class="uppercase">Inner</p></div>"#;
        let html = page(&[format!(
            r#"<div class="sm:grid-cols-12"><div class="whitespace-nowrap">01.06.2024</div><p class="uppercase">Klub A</p>{inner}</div>"#
        )]);
        let parsed = parse_competitions(&html, &portal_url()).unwrap();
        assert_eq!(parsed.rows_seen, 1);
        assert_eq!(parsed.events[0].club, "Klub A");
    }
}
