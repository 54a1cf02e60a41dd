//! Core data types used throughout the exporter

use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the status file each campaign rewrites periodically
pub const STATS_FILE_NAME: &str = "fuzzer_stats";

/// A single monitored fuzzing campaign
///
/// Identified by a stable label and backed by a directory containing the
/// campaign's `fuzzer_stats` file. Targets are created once at startup and
/// never change afterwards; the directory is not verified to exist until the
/// first poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Label used as the `name` dimension of every exported series
    label: String,

    /// Directory containing the status file
    directory: PathBuf,
}

impl Target {
    /// Create a target whose label is the final component of the directory
    /// path. Paths without a usable final component (e.g. `/`) fall back to
    /// the full path as the label.
    pub fn from_directory(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        let label = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| directory.to_string_lossy().into_owned());

        Self { label, directory }
    }

    /// Create a target with an explicitly assigned label
    pub fn with_label(directory: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            directory: directory.into(),
        }
    }

    /// Label identifying this campaign in the exported series
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Directory being polled
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path to the campaign's status file
    pub fn stats_path(&self) -> PathBuf {
        self.directory.join(STATS_FILE_NAME)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.directory.display())
    }
}
