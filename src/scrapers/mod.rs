//! Fetching and parsing of upstream competition listings.
//!
//! Scraping follows the usual two-phase pattern:
//!
//! 1. **Fetching**: download every configured listing page
//! 2. **Parsing**: extract competitions from each page ([`wzss`])
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | WZSS portal | [`wzss`] | HTML scraping | Tailwind grid listing, one page per list |
//!
//! Fetches run concurrently with a bounded width. A failing source is logged
//! and reported back without affecting the others.

pub mod dates;
pub mod wzss;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::config::SourceConfig;
use crate::error::FetchError;

/// Outcome of fetching one configured source.
#[derive(Debug)]
pub struct FetchedSource {
    pub source: SourceConfig,
    pub body: Result<String, FetchError>,
}

/// Build the shared HTTP client with the run's timeout and User-Agent.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}

/// Fetch a single page, treating any non-success status as a failure.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, FetchError> {
    let t0 = Instant::now();
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let body = response.text().await?;
    info!(
        bytes = body.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Fetched page"
    );
    Ok(body)
}

/// Fetch all sources with at most `concurrency` requests in flight.
///
/// Results come back in the same order as `sources`, one per source, whether
/// the fetch succeeded or not.
#[instrument(level = "info", skip_all, fields(sources = sources.len(), concurrency = concurrency))]
pub async fn fetch_sources(
    client: &Client,
    sources: &[SourceConfig],
    concurrency: usize,
) -> Vec<FetchedSource> {
    let mut results: Vec<(usize, FetchedSource)> = stream::iter(sources.iter().cloned().enumerate())
        .map(|(i, source)| async move {
            let body = fetch_page(client, &source.url).await;
            if let Err(e) = &body {
                warn!(source = %source.name, url = %source.url, error = %e, "Fetch failed; source skipped this run");
            }
            (i, FetchedSource { source, body })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(i, _)| *i);
    let fetched: Vec<FetchedSource> = results.into_iter().map(|(_, f)| f).collect();

    let ok = fetched.iter().filter(|f| f.body.is_ok()).count();
    info!(ok, failed = fetched.len() - ok, "Fetched sources");
    fetched
}
