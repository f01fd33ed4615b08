//! Calendar index management.
//!
//! `calendars/index.json` lists every per-club calendar that has ever been
//! published, with its file name and public URLs. It is read back on the
//! next run so that:
//!
//! - a club keeps the file name it was first given, even if a newcomer would
//!   now slugify to the same name (subscription URLs never move);
//! - a club that vanished from the portal keeps its entry, and its calendar
//!   is rewritten empty so subscribers see the events go away.
//!
//! # Structure
//!
//! ```text
//! [
//!   {
//!     "club": "KS Tarcza Gniezno",
//!     "file": "ks-tarcza-gniezno.ics",
//!     "url": "https://zawody.example.org/calendars/ks-tarcza-gniezno.ics",
//!     "webcal": "webcal://zawody.example.org/calendars/ks-tarcza-gniezno.ics"
//!   }
//! ]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::error::PipelineError;
use crate::models::CalendarIndexEntry;
use crate::utils::{slugify, write_if_changed};

/// File name of the combined calendar.
pub const ALL_CALENDAR_FILE: &str = "all.ics";
/// File name of the index itself.
pub const INDEX_FILE: &str = "index.json";

/// Calendar file assigned to a club for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarFile {
    pub club: String,
    pub file: String,
    /// `false` when the club has no events this run but was published before.
    pub active: bool,
}

/// Read the previous run's index. A missing or unreadable index counts as
/// empty; the run then simply assigns fresh file names.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_calendar_index(path: &Path) -> Vec<CalendarIndexEntry> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No previous calendar index");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read previous calendar index; starting fresh");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<CalendarIndexEntry>>(&raw) {
        Ok(entries) => {
            info!(entries = entries.len(), "Loaded previous calendar index");
            entries
        }
        Err(e) => {
            warn!(error = %e, "Previous calendar index is not valid JSON; starting fresh");
            Vec::new()
        }
    }
}

/// Assign a calendar file to every club, current or previously published.
///
/// Previously published clubs keep their file. New clubs get
/// `<slug>.ics`, or `<slug>-2.ics`, `<slug>-3.ics`, … if taken, allocated in
/// sorted club order. The combined calendar's name is never handed out.
pub fn plan_calendar_files(
    current_clubs: &BTreeSet<String>,
    previous: &[CalendarIndexEntry],
) -> Vec<CalendarFile> {
    let mut assigned: BTreeMap<String, String> = BTreeMap::new();
    let mut taken: HashSet<String> = [ALL_CALENDAR_FILE, INDEX_FILE]
        .into_iter()
        .map(String::from)
        .collect();

    for entry in previous {
        if !assigned.contains_key(&entry.club) && taken.insert(entry.file.clone()) {
            assigned.insert(entry.club.clone(), entry.file.clone());
        }
    }

    for club in current_clubs {
        if assigned.contains_key(club) {
            continue;
        }
        let base = match slugify(club) {
            s if s.is_empty() => "klub".to_string(),
            s => s,
        };
        let file = (1..)
            .map(|n| {
                if n == 1 {
                    format!("{}.ics", base)
                } else {
                    format!("{}-{}.ics", base, n)
                }
            })
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| format!("{}.ics", base));
        taken.insert(file.clone());
        assigned.insert(club.clone(), file);
    }

    assigned
        .into_iter()
        .map(|(club, file)| CalendarFile {
            active: current_clubs.contains(&club),
            club,
            file,
        })
        .collect()
}

/// Build index entries, with URLs when the public base URL is known.
///
/// File names are percent-encoded in URLs; the `webcal` variant swaps the
/// scheme so calendar apps offer to subscribe instead of downloading.
pub fn build_index(
    files: &[CalendarFile],
    public_base_url: Option<&str>,
    calendars_dir: &str,
) -> Vec<CalendarIndexEntry> {
    files
        .iter()
        .map(|f| {
            let url = public_base_url.map(|base| {
                format!(
                    "{}/{}/{}",
                    base.trim_end_matches('/'),
                    calendars_dir.trim_matches('/'),
                    urlencoding::encode(&f.file)
                )
            });
            let webcal = url.as_deref().and_then(webcal_url);
            CalendarIndexEntry {
                club: f.club.clone(),
                file: f.file.clone(),
                url,
                webcal,
            }
        })
        .collect()
}

fn webcal_url(url: &str) -> Option<String> {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .map(|rest| format!("webcal://{}", rest))
}

/// Write the index, leaving it untouched if nothing changed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), entries = entries.len()))]
pub async fn write_calendar_index(
    path: &Path,
    entries: &[CalendarIndexEntry],
) -> Result<bool, PipelineError> {
    let mut json = serde_json::to_string_pretty(entries)?;
    json.push('\n');
    let changed = write_if_changed(path, json.as_bytes()).await?;
    info!(changed, "Calendar index written");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::scratch_dir;

    fn clubs(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn entry(club: &str, file: &str) -> CalendarIndexEntry {
        CalendarIndexEntry {
            club: club.to_string(),
            file: file.to_string(),
            url: None,
            webcal: None,
        }
    }

    #[test]
    fn test_fresh_plan_uses_slugs() {
        let plan = plan_calendar_files(&clubs(&["KS Tarcza Gniezno", "LOK Łódź"]), &[]);
        assert_eq!(
            plan,
            vec![
                CalendarFile { club: "KS Tarcza Gniezno".into(), file: "ks-tarcza-gniezno.ics".into(), active: true },
                CalendarFile { club: "LOK Łódź".into(), file: "lok-lodz.ics".into(), active: true },
            ]
        );
    }

    #[test]
    fn test_colliding_slugs_get_suffixes_in_sorted_order() {
        let plan = plan_calendar_files(&clubs(&["Klub-A", "Klub A", "KLUB A"]), &[]);
        let files: Vec<&str> = plan.iter().map(|f| f.file.as_str()).collect();
        // BTreeSet order: "KLUB A" < "Klub A" < "Klub-A"
        assert_eq!(files, ["klub-a.ics", "klub-a-2.ics", "klub-a-3.ics"]);
    }

    #[test]
    fn test_reserved_names_are_never_assigned() {
        let plan = plan_calendar_files(&clubs(&["All", "Index"]), &[]);
        let files: Vec<&str> = plan.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(files, ["all-2.ics", "index.ics"]);
    }

    #[test]
    fn test_empty_slug_falls_back() {
        let plan = plan_calendar_files(&clubs(&["***"]), &[]);
        assert_eq!(plan[0].file, "klub.ics");
    }

    #[test]
    fn test_previous_assignment_is_kept() {
        let previous = vec![entry("Klub A", "klub-a-2.ics")];
        let plan = plan_calendar_files(&clubs(&["Klub A", "Klub-A"]), &previous);
        assert_eq!(plan[0], CalendarFile { club: "Klub A".into(), file: "klub-a-2.ics".into(), active: true });
        assert_eq!(plan[1], CalendarFile { club: "Klub-A".into(), file: "klub-a.ics".into(), active: true });
    }

    #[test]
    fn test_vanished_club_stays_inactive() {
        let previous = vec![entry("Stary Klub", "stary-klub.ics")];
        let plan = plan_calendar_files(&clubs(&["Klub A"]), &previous);
        assert_eq!(plan.len(), 2);
        let stale = plan.iter().find(|f| f.club == "Stary Klub").unwrap();
        assert!(!stale.active);
        assert_eq!(stale.file, "stary-klub.ics");
    }

    #[test]
    fn test_build_index_urls() {
        let files = vec![CalendarFile { club: "Klub A".into(), file: "klub a.ics".into(), active: true }];
        let index = build_index(&files, Some("https://zawody.example.org/"), "calendars");
        assert_eq!(index[0].url.as_deref(), Some("https://zawody.example.org/calendars/klub%20a.ics"));
        assert_eq!(index[0].webcal.as_deref(), Some("webcal://zawody.example.org/calendars/klub%20a.ics"));

        let index = build_index(&files, None, "calendars");
        assert_eq!(index[0].url, None);
        assert_eq!(index[0].webcal, None);
    }

    #[tokio::test]
    async fn test_index_round_trip() {
        let path = scratch_dir("index").join("calendars").join(INDEX_FILE);
        assert!(read_calendar_index(&path).await.is_empty());

        let entries = vec![entry("Klub A", "klub-a.ics")];
        assert!(write_calendar_index(&path, &entries).await.unwrap());
        assert!(!write_calendar_index(&path, &entries).await.unwrap());
        assert_eq!(read_calendar_index(&path).await, entries);
    }

    #[tokio::test]
    async fn test_corrupt_index_reads_as_empty() {
        let dir = scratch_dir("corrupt_index");
        let path = dir.join(INDEX_FILE);
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_calendar_index(&path).await.is_empty());
    }
}
