//! JSON feed generation for the map/list front-end.
//!
//! The feed is a single array of [`FeedEntry`] objects:
//!
//! ```text
//! [
//!   {
//!     "club": "KS Tarcza Gniezno",
//!     "title": "Zawody Ligowe",
//!     "date_start": "2024-06-01",
//!     "date_end": "2024-06-01",
//!     "location": "Strzelnica Tarcza, Gniezno",
//!     "discipline": "Pistolet, Karabin",
//!     "source_url": "https://tarcza.pl/regulamin.pdf",
//!     "latitude": 52.53,
//!     "longitude": 17.6,
//!     "website": "https://tarcza.pl"
//!   }
//! ]
//! ```
//!
//! Keys follow struct declaration order and entries arrive pre-sorted, so the
//! same records always render to the same bytes and diffs between runs show
//! only real changes.

use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::models::FeedEntry;
use crate::utils::write_if_changed;

/// Render the feed document.
pub fn render_feed(entries: &[FeedEntry]) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(entries)?;
    json.push('\n');
    Ok(json)
}

/// Write the feed, leaving the file untouched if nothing changed.
///
/// # Returns
///
/// `true` if the file on disk was updated.
#[instrument(level = "info", skip_all, fields(path = %path.display(), entries = entries.len()))]
pub async fn write_feed(path: &Path, entries: &[FeedEntry]) -> Result<bool, PipelineError> {
    let json = render_feed(entries)?;
    let changed = write_if_changed(path, json.as_bytes()).await?;
    if changed {
        info!("Wrote JSON feed");
    } else {
        info!("JSON feed unchanged");
    }
    Ok(changed)
}

/// Read a previously published feed.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_feed(path: &Path) -> Result<Vec<FeedEntry>, PipelineError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    Ok(serde_json::from_str(&raw)?)
}
