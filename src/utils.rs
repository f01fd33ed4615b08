//! Utility functions for text cleanup, slugs, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace and entity cleanup for scraped text
//! - Slugification of club names into stable file names
//! - Location sanitizing and website derivation (used by the locations CSV)
//! - Output directory validation and change-aware atomic writes

use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::PipelineError;

/// Collapse runs of whitespace (including NBSP) into single spaces and trim.
///
/// Stray `&nbsp;` entities that survive HTML decoding are treated as spaces.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_ws("  Klub\u{a0} Strzelecki \n"), "Klub Strzelecki");
/// ```
pub fn normalize_ws(s: &str) -> String {
    let s = s.replace("&nbsp;", " ");
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() || ch == '\u{a0}' {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) with
/// an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a club name to a lowercase ASCII slug for file names.
///
/// Polish diacritics are transliterated, every other non-alphanumeric run
/// becomes a single hyphen.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("LOK Łódź – Śródmieście"), "lok-lodz-srodmiescie");
/// ```
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        let ch = match ch {
            'ą' => 'a',
            'ć' => 'c',
            'ę' => 'e',
            'ł' => 'l',
            'ń' => 'n',
            'ó' => 'o',
            'ś' => 's',
            'ź' | 'ż' => 'z',
            other => other,
        };
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(ch);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Remove commas and double quotes so a location can key a CSV row.
pub fn sanitize_location(text: &str) -> String {
    text.replace([',', '"'], "").trim().to_string()
}

/// Reduce a regulation link to the club website (scheme and host).
///
/// ```ignore
/// assert_eq!(
///     website_from_link("https://klub.pl/files/regulamin.pdf"),
///     Some("https://klub.pl".to_string())
/// );
/// ```
pub fn website_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(PipelineError::io(probe_path.display().to_string(), e)),
    }
}

/// Write `contents` to `path` unless the file already holds exactly those bytes.
///
/// Writes go to a sibling temp file that is renamed into place, so a reader
/// polling the published file never sees a half-written document.
///
/// # Returns
///
/// `true` if the file was (re)written, `false` if it was already up to date.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_if_changed(path: &Path, contents: &[u8]) -> Result<bool, PipelineError> {
    if let Ok(existing) = fs::read(path).await {
        if existing == contents {
            debug!("Unchanged, skipping write");
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent.display().to_string(), e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp_path, contents)
        .await
        .map_err(|e| PipelineError::io(tmp_path.display().to_string(), e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    debug!(bytes = contents.len(), "Wrote file");
    Ok(true)
}

#[cfg(test)]
pub(crate) fn scratch_dir(label: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "wzss_calendar_{}_{}_{}",
        label,
        std::process::id(),
        n
    ));
    let _ = stdfs::remove_dir_all(&dir);
    stdfs::create_dir_all(&dir).unwrap();
    dir
}
