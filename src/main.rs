//! # WZSS Calendar
//!
//! Scrapes the shooting competition listing of the Wielkopolski Związek
//! Strzelectwa Sportowego portal and publishes it as a JSON feed for a map
//! front-end plus one iCalendar subscription per club.
//!
//! ## Usage
//!
//! ```sh
//! wzss_calendar -o ./public --public-base-url https://zawody.example.org
//! ```
//!
//! ## Architecture
//!
//! Each run is a single batch job, normally triggered once a day:
//! 1. **Fetching**: download every configured listing page (bounded, concurrent)
//! 2. **Parsing**: turn portal rows into competition events
//! 3. **Normalizing**: drop duplicates, sort deterministically
//! 4. **Output**: feed JSON, per-club and combined calendars, calendar index,
//!    updated locations CSV
//!
//! A run where no source could be used exits non-zero without touching the
//! published files.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod locations;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod scrapers;
mod utils;

use cli::Cli;
use config::Config;
use locations::LocationReport;
use outputs::json;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "wzss_calendar starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration rejected");
        return Err(e.into());
    }

    if args.verify {
        let entries = json::read_feed(&config.feed_path()).await?;
        let report = LocationReport::from_feed(&entries);
        info!(
            entries = entries.len(),
            missing_coordinates = report.missing_coordinates.len(),
            missing_websites = report.missing_websites.len(),
            "Verified published feed"
        );
        if !report.is_complete() {
            warn!("Some locations or clubs still need manual data in the locations CSV");
        }
        print!("{}", report.render());
        return Ok(());
    }

    // ---- Run ----
    let summary = match pipeline::run(&config).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Run failed; published files left untouched");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        sources_ok = summary.sources_ok,
        fetch_failures = summary.fetch_failures,
        structural_failures = summary.structural_failures,
        events = summary.events,
        files_changed = summary.files_changed,
        "Execution complete"
    );

    Ok(())
}
