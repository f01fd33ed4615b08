//! Run configuration loaded from an optional YAML file.
//!
//! Every field has a default, so the pipeline runs against the WZSS portal
//! without any config file at all:
//!
//! ```yaml
//! sources:
//!   - name: wzss
//!     url: https://portal.wzss.pl/competitions/current
//! output_dir: ./public
//! public_base_url: https://example.github.io/zawody
//! timeout_secs: 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::ConfigError;

pub const DEFAULT_SOURCE_URL: &str = "https://portal.wzss.pl/competitions/current";

/// One upstream listing page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Short name used in logs.
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<SourceConfig>,
    /// Root of everything the pipeline publishes.
    pub output_dir: PathBuf,
    /// Feed file name, relative to `output_dir`.
    pub feed_file: String,
    /// Calendar directory, relative to `output_dir`.
    pub calendars_dir: String,
    /// Hand-curated coordinates and websites per location.
    pub locations_csv: PathBuf,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    /// Where `output_dir` is served from; enables URLs in the calendar index.
    pub public_base_url: Option<String>,
    /// Right-hand side of every calendar UID.
    pub uid_domain: String,
    /// How often subscribed clients are asked to re-fetch calendars.
    pub calendar_refresh_hours: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: vec![SourceConfig {
                name: "wzss".to_string(),
                url: DEFAULT_SOURCE_URL.to_string(),
            }],
            output_dir: PathBuf::from("public"),
            feed_file: "competitions.json".to_string(),
            calendars_dir: "calendars".to_string(),
            locations_csv: PathBuf::from("locations.csv"),
            user_agent: format!(
                "{}/{} (+https://portal.wzss.pl competition calendar)",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
            timeout_secs: 30,
            max_concurrent_fetches: 4,
            public_base_url: None,
            uid_domain: "wzss.pl".to_string(),
            calendar_refresh_hours: 24,
        }
    }
}

impl Config {
    /// Load a config file, falling back to defaults for missing fields.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Config::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
        info!(sources = config.sources.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Config, serde_yaml::Error> {
        // An empty file is a valid "all defaults" config.
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".to_string()));
        }
        for source in &self.sources {
            url::Url::parse(&source.url).map_err(|e| {
                ConfigError::Invalid(format!("source {} has invalid url {}: {}", source.name, source.url, e))
            })?;
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid("max_concurrent_fetches must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".to_string()));
        }
        if self.feed_file.is_empty() || self.calendars_dir.is_empty() {
            return Err(ConfigError::Invalid("feed_file and calendars_dir must be set".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn feed_path(&self) -> PathBuf {
        self.output_dir.join(&self.feed_file)
    }

    pub fn calendars_path(&self) -> PathBuf {
        self.output_dir.join(&self.calendars_dir)
    }
}
