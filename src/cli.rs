//! Command-line interface definitions for the WZSS competition calendar.
//!
//! Every option overrides the matching field of the YAML config. Most can
//! also be supplied through environment variables, which is how the
//! scheduled job passes them.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, SourceConfig};

/// Scrape WZSS shooting competitions into a JSON feed and iCalendar files.
///
/// # Examples
///
/// ```sh
/// # Defaults: scrape the portal into ./public
/// wzss_calendar
///
/// # Custom output and public URL for the calendar index
/// wzss_calendar -o /srv/zawody --public-base-url https://zawody.example.org
///
/// # Report locations and clubs that still need data
/// wzss_calendar --verify
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, env = "WZSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output directory for the feed and calendars
    #[arg(short, long, env = "WZSS_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to the locations CSV
    #[arg(short, long, env = "WZSS_LOCATIONS")]
    pub locations: Option<PathBuf>,

    /// Public URL the output directory is served from
    #[arg(long, env = "WZSS_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Listing page to scrape; repeat for several. Replaces configured sources.
    #[arg(long = "source", value_name = "URL")]
    pub sources: Vec<String>,

    /// Check the published feed for missing coordinates and websites instead of scraping
    #[arg(long)]
    pub verify: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.locations {
            config.locations_csv = path.clone();
        }
        if let Some(url) = &self.public_base_url {
            config.public_base_url = Some(url.clone());
        }
        if !self.sources.is_empty() {
            config.sources = self
                .sources
                .iter()
                .enumerate()
                .map(|(i, url)| SourceConfig {
                    name: format!("cli-{}", i + 1),
                    url: url.clone(),
                })
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["wzss_calendar"]);
        assert!(cli.sources.is_empty());
        assert!(!cli.verify);

        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "wzss_calendar",
            "-c",
            "/etc/wzss.yaml",
            "-o",
            "/tmp/public",
            "-l",
            "/tmp/locations.csv",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/wzss.yaml")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/public")));
        assert_eq!(cli.locations, Some(PathBuf::from("/tmp/locations.csv")));
    }

    #[test]
    fn test_overrides_replace_config() {
        let cli = Cli::parse_from([
            "wzss_calendar",
            "--output-dir",
            "/srv/zawody",
            "--public-base-url",
            "https://zawody.example.org",
            "--source",
            "https://portal.wzss.pl/competitions/current",
            "--source",
            "https://portal.wzss.pl/competitions/archive",
            "--verify",
        ]);
        assert!(cli.verify);

        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.output_dir, PathBuf::from("/srv/zawody"));
        assert_eq!(config.public_base_url.as_deref(), Some("https://zawody.example.org"));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].name, "cli-2");
        assert_eq!(config.sources[1].url, "https://portal.wzss.pl/competitions/archive");
    }
}
