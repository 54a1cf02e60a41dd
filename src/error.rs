//! Error types for the exporter

use thiserror::Error;

/// Main error type for the exporter
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A target's status file could not be read during a poll cycle
    #[error("Failed to read stats for '{label}': {source}")]
    Source {
        /// Label of the affected target
        label: String,
        /// Underlying read error
        source: std::io::Error,
    },

    /// A target's status file read exceeded the configured timeout
    #[error("Timed out reading stats for '{label}'")]
    SourceTimeout {
        /// Label of the affected target
        label: String,
    },

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Create a per-target read error
    pub fn source(label: impl Into<String>, source: std::io::Error) -> Self {
        Self::Source {
            label: label.into(),
            source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
