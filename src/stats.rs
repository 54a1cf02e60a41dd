//! Status-file parsing
//!
//! A campaign's `fuzzer_stats` file is plain text, one `key : value` pair per
//! line, rewritten in place by an external process that does not coordinate
//! with readers. Parsing is therefore fail-soft: unparseable lines and
//! unknown keys are dropped without affecting the rest of the file, so a
//! mid-write read never costs a whole poll cycle.

use std::fmt;

// ============================================================================
// Field Vocabulary
// ============================================================================

/// The fixed vocabulary of recognized status-file fields
///
/// Each field becomes exactly one exported gauge series, dimensioned by the
/// campaign's `name` label. Keys outside this vocabulary are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    FuzzerPid,
    CyclesDone,
    ExecsDone,
    ExecsPerSec,
    PathsTotal,
    PathsFavored,
    PathsFound,
    PathsImported,
    MaxDepth,
    CurPath,
    PendingFavs,
    PendingTotal,
    VariablePaths,
    Stability,
    BitmapCvg,
    UniqueCrashes,
    UniqueHangs,
    LastPath,
    LastCrash,
    LastHang,
    ExecsSinceCrash,
    ExecTimeout,
    SlowestExecMs,
    PeakRssMb,
}

impl StatField {
    /// Every recognized field, in status-file order
    pub const ALL: [StatField; 24] = [
        StatField::FuzzerPid,
        StatField::CyclesDone,
        StatField::ExecsDone,
        StatField::ExecsPerSec,
        StatField::PathsTotal,
        StatField::PathsFavored,
        StatField::PathsFound,
        StatField::PathsImported,
        StatField::MaxDepth,
        StatField::CurPath,
        StatField::PendingFavs,
        StatField::PendingTotal,
        StatField::VariablePaths,
        StatField::Stability,
        StatField::BitmapCvg,
        StatField::UniqueCrashes,
        StatField::UniqueHangs,
        StatField::LastPath,
        StatField::LastCrash,
        StatField::LastHang,
        StatField::ExecsSinceCrash,
        StatField::ExecTimeout,
        StatField::SlowestExecMs,
        StatField::PeakRssMb,
    ];

    /// Stable series name, identical to the status-file key
    pub fn name(&self) -> &'static str {
        match self {
            StatField::FuzzerPid => "fuzzer_pid",
            StatField::CyclesDone => "cycles_done",
            StatField::ExecsDone => "execs_done",
            StatField::ExecsPerSec => "execs_per_sec",
            StatField::PathsTotal => "paths_total",
            StatField::PathsFavored => "paths_favored",
            StatField::PathsFound => "paths_found",
            StatField::PathsImported => "paths_imported",
            StatField::MaxDepth => "max_depth",
            StatField::CurPath => "cur_path",
            StatField::PendingFavs => "pending_favs",
            StatField::PendingTotal => "pending_total",
            StatField::VariablePaths => "variable_paths",
            StatField::Stability => "stability",
            StatField::BitmapCvg => "bitmap_cvg",
            StatField::UniqueCrashes => "unique_crashes",
            StatField::UniqueHangs => "unique_hangs",
            StatField::LastPath => "last_path",
            StatField::LastCrash => "last_crash",
            StatField::LastHang => "last_hang",
            StatField::ExecsSinceCrash => "execs_since_crash",
            StatField::ExecTimeout => "exec_timeout",
            StatField::SlowestExecMs => "slowest_exec_ms",
            StatField::PeakRssMb => "peak_rss_mb",
        }
    }

    /// Help line for the Prometheus exposition
    pub fn help(&self) -> &'static str {
        match self {
            StatField::FuzzerPid => "Process ID of the fuzzer",
            StatField::CyclesDone => "Queue cycles completed",
            StatField::ExecsDone => "Total executions performed",
            StatField::ExecsPerSec => "Executions per second",
            StatField::PathsTotal => "Total test cases in the queue",
            StatField::PathsFavored => "Test cases favored by the scheduler",
            StatField::PathsFound => "Test cases discovered by this campaign",
            StatField::PathsImported => "Test cases imported from other campaigns",
            StatField::MaxDepth => "Deepest queue path depth reached",
            StatField::CurPath => "Queue index currently being fuzzed",
            StatField::PendingFavs => "Favored inputs pending fuzzing",
            StatField::PendingTotal => "Inputs pending fuzzing",
            StatField::VariablePaths => "Inputs showing variable behavior",
            StatField::Stability => "Stability percentage",
            StatField::BitmapCvg => "Bitmap coverage percentage",
            StatField::UniqueCrashes => "Unique crashes recorded",
            StatField::UniqueHangs => "Unique hangs recorded",
            StatField::LastPath => "Unix time of the most recent new path",
            StatField::LastCrash => "Unix time of the most recent crash",
            StatField::LastHang => "Unix time of the most recent hang",
            StatField::ExecsSinceCrash => "Executions since the last crash",
            StatField::ExecTimeout => "Execution timeout in milliseconds",
            StatField::SlowestExecMs => "Slowest execution in milliseconds",
            StatField::PeakRssMb => "Peak resident set size in megabytes",
        }
    }

    /// Match a status-file key against the vocabulary (case-sensitive)
    pub fn from_key(key: &str) -> Option<StatField> {
        StatField::ALL.iter().copied().find(|f| f.name() == key)
    }

    /// Whether the raw value carries a trailing percent sign
    pub fn is_percentage(&self) -> bool {
        matches!(self, StatField::Stability | StatField::BitmapCvg)
    }

    /// Convert a trimmed raw value to the exported float
    ///
    /// Percentage fields lose one trailing `%` before float parsing; all
    /// other fields parse as integers and are widened. A value that fails to
    /// convert exports as zero for this cycle rather than failing the parse.
    fn convert(&self, raw: &str) -> f64 {
        if self.is_percentage() {
            let raw = raw.strip_suffix('%').unwrap_or(raw);
            raw.parse::<f64>().unwrap_or(0.0)
        } else {
            raw.parse::<i64>().map(|v| v as f64).unwrap_or(0.0)
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Status Record
// ============================================================================

/// Status-file key for the campaign banner, consumed for logging only
const BANNER_KEY: &str = "afl_banner";

/// One parsed snapshot of a campaign's status file
///
/// Fields are kept in the order they appeared in the file; a key occurring
/// more than once is kept more than once, so later occurrences win when the
/// record is applied to the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRecord {
    fields: Vec<(StatField, f64)>,
    banner: Option<String>,
}

impl StatusRecord {
    /// Parsed fields in file order
    pub fn fields(&self) -> &[(StatField, f64)] {
        &self.fields
    }

    /// Last parsed value for a field, if the file contained it
    pub fn get(&self, field: StatField) -> Option<f64> {
        self.fields
            .iter()
            .rev()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    /// Campaign banner, if the file contained one
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    /// Whether no recognized fields were parsed
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of recognized fields parsed
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse raw status-file bytes into a [`StatusRecord`]
///
/// Pure function, no I/O. Lines without a `:` separator are skipped, keys
/// and values are trimmed of surrounding whitespace, and unknown keys are
/// dropped silently. This never fails: a file-level read error belongs to
/// the caller, and individual malformed lines only lose themselves.
pub fn parse(raw: &[u8]) -> StatusRecord {
    let text = String::from_utf8_lossy(raw);
    let mut record = StatusRecord::default();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == BANNER_KEY {
            record.banner = Some(value.to_string());
            continue;
        }

        if let Some(field) = StatField::from_key(key) {
            record.fields.push((field, field.convert(value)));
        }
    }

    record
}
