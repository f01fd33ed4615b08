//! Error types for each pipeline stage.
//!
//! Fetch and parse errors are per-source and never abort a run on their own;
//! [`PipelineError`] is what the run as a whole can fail with.

use thiserror::Error;

/// Failure to retrieve one source page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
}

/// Failure to extract events from one source page.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The markup no longer matches the layout the parser knows about.
    #[error("structural parse failure: {0}")]
    Structural(String),

    #[error("invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
}

/// Loading or validating the YAML configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Run-level failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Every source failed; publishing now would erase the last good output.
    #[error("no source produced usable data ({failed} failed); refusing to overwrite outputs")]
    NoUsableSources { failed: usize },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("locations CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
