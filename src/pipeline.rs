//! One scheduled run: fetch, parse, normalize, publish.
//!
//! ```text
//! sources ──fetch──▶ pages ──parse──▶ candidates ──normalize──▶ events
//!                                                                 │
//!                     locations.csv ──enrich──▶ competitions.json ◀┤
//!                                                                 │
//!                          calendars/<club>.ics, all.ics, index.json
//! ```
//!
//! Sources fail independently. Nothing is written unless at least one source
//! was fetched and parsed successfully, so a bad night upstream never wipes
//! out the last good output.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ParseError, PipelineError, Result};
use crate::locations;
use crate::models::CompetitionEvent;
use crate::normalize::normalize_events;
use crate::outputs::ics::{CalendarOptions, render_calendar};
use crate::outputs::indexes::{
    self, ALL_CALENDAR_FILE, INDEX_FILE, build_index, plan_calendar_files, read_calendar_index,
};
use crate::outputs::json;
use crate::scrapers::{self, FetchedSource, wzss};
use crate::utils::{ensure_writable_dir, truncate_for_log, write_if_changed};

/// Display name of the combined calendar.
const ALL_CALENDAR_NAME: &str = "Zawody strzeleckie WZSS";

/// Events and side data gathered from every usable source.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Candidates in source order, not yet de-duplicated.
    pub events: Vec<CompetitionEvent>,
    /// First website seen per club across all sources.
    pub club_websites: BTreeMap<String, String>,
    pub sources_ok: usize,
    pub fetch_failures: usize,
    pub structural_failures: usize,
}

/// What a run did, for the final log line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources_ok: usize,
    pub fetch_failures: usize,
    pub structural_failures: usize,
    pub events: usize,
    pub calendars: usize,
    pub files_changed: usize,
}

/// Parse every fetched page, isolating failures per source.
pub fn harvest(fetched: Vec<FetchedSource>) -> Harvest {
    let mut harvest = Harvest::default();

    for FetchedSource { source, body } in fetched {
        let html = match body {
            Ok(html) => html,
            Err(_) => {
                // Already logged by the fetcher.
                harvest.fetch_failures += 1;
                continue;
            }
        };
        let page_url = match Url::parse(&source.url) {
            Ok(url) => url,
            Err(e) => {
                error!(source = %source.name, url = %source.url, error = %e, "Source URL is invalid");
                harvest.fetch_failures += 1;
                continue;
            }
        };

        match wzss::parse_competitions(&html, &page_url) {
            Ok(page) => {
                if !page.has_listing_markers() {
                    warn!(source = %source.name, url = %source.url, "Source shows no listing markup; publishing it as empty");
                }
                info!(source = %source.name, events = page.events.len(), skipped = page.rows_skipped, "Source parsed");
                harvest.sources_ok += 1;
                harvest.events.extend(page.events);
                for (club, website) in page.club_websites {
                    harvest.club_websites.entry(club).or_insert(website);
                }
            }
            Err(ParseError::Structural(reason)) => {
                error!(
                    source = %source.name,
                    url = %source.url,
                    %reason,
                    body_preview = %truncate_for_log(&html, 300),
                    "Structural parse failure; upstream layout may have changed"
                );
                harvest.structural_failures += 1;
            }
            Err(e) => {
                error!(source = %source.name, error = %e, "Parser failed");
                harvest.structural_failures += 1;
            }
        }
    }
    harvest
}

/// Run the whole pipeline once.
///
/// # Errors
///
/// - [`PipelineError::NoUsableSources`] if every source failed; nothing is written.
/// - I/O and serialization errors while publishing.
#[instrument(level = "info", skip_all, fields(output_dir = %config.output_dir.display()))]
pub async fn run(config: &Config) -> Result<RunSummary> {
    let t0 = Instant::now();
    ensure_writable_dir(&config.output_dir).await?;

    let client = scrapers::build_client(&config.user_agent, config.timeout()).map_err(PipelineError::Client)?;
    let fetched = scrapers::fetch_sources(&client, &config.sources, config.max_concurrent_fetches).await;
    let harvest = harvest(fetched);

    if harvest.sources_ok == 0 {
        return Err(PipelineError::NoUsableSources {
            failed: harvest.fetch_failures + harvest.structural_failures,
        });
    }
    if harvest.fetch_failures + harvest.structural_failures > 0 {
        warn!(
            ok = harvest.sources_ok,
            fetch_failures = harvest.fetch_failures,
            structural_failures = harvest.structural_failures,
            "Publishing partial data"
        );
    }

    let events = normalize_events(harvest.events);
    let mut summary = RunSummary {
        sources_ok: harvest.sources_ok,
        fetch_failures: harvest.fetch_failures,
        structural_failures: harvest.structural_failures,
        events: events.len(),
        ..RunSummary::default()
    };

    // ---- Locations ----
    let known = locations::load_locations(&config.locations_csv)?;
    let merged = locations::merge_locations(&known, &events, &harvest.club_websites);
    if locations::write_locations(&config.locations_csv, &merged).await? {
        summary.files_changed += 1;
    }

    // ---- Calendars ----
    let options = CalendarOptions {
        uid_domain: config.uid_domain.clone(),
        refresh_hours: config.calendar_refresh_hours,
    };
    let (calendars, changed) = publish_calendars(config, &events, &options).await?;
    summary.calendars = calendars;
    summary.files_changed += changed;

    // ---- Feed ----
    let entries = locations::enrich(events, &merged, &harvest.club_websites);
    if json::write_feed(&config.feed_path(), &entries).await? {
        summary.files_changed += 1;
    }

    let elapsed = t0.elapsed();
    info!(
        ?elapsed,
        events = summary.events,
        calendars = summary.calendars,
        files_changed = summary.files_changed,
        "Run complete"
    );
    Ok(summary)
}

/// Write one calendar per club, the combined calendar, and the index.
///
/// Returns the number of per-club calendars and the number of files that
/// actually changed on disk.
#[instrument(level = "info", skip_all, fields(events = events.len()))]
async fn publish_calendars(
    config: &Config,
    events: &[CompetitionEvent],
    options: &CalendarOptions,
) -> Result<(usize, usize)> {
    let dir = config.calendars_path();
    let index_path = dir.join(INDEX_FILE);

    let mut by_club: BTreeMap<&str, Vec<&CompetitionEvent>> = BTreeMap::new();
    for event in events {
        by_club.entry(event.club.as_str()).or_default().push(event);
    }
    let clubs: BTreeSet<String> = by_club.keys().map(|c| c.to_string()).collect();

    let previous = read_calendar_index(&index_path).await;
    let plan = plan_calendar_files(&clubs, &previous);

    let mut changed = 0usize;
    for file in &plan {
        let club_events = by_club.get(file.club.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        if !file.active {
            info!(club = %file.club, file = %file.file, "Club no longer listed; publishing empty calendar");
        }
        let ics = render_calendar(&file.club, club_events.iter().copied(), options);
        if write_if_changed(&dir.join(&file.file), ics.as_bytes()).await? {
            info!(club = %file.club, file = %file.file, events = club_events.len(), "Wrote calendar");
            changed += 1;
        }
    }

    let all = render_calendar(ALL_CALENDAR_NAME, events, options);
    if write_if_changed(&dir.join(ALL_CALENDAR_FILE), all.as_bytes()).await? {
        changed += 1;
    }

    let index = build_index(&plan, config.public_base_url.as_deref(), &config.calendars_dir);
    if indexes::write_calendar_index(&index_path, &index).await? {
        changed += 1;
    }

    Ok((plan.len(), changed))
}
