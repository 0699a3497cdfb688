#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Export materializer.
//!
//! Reads the store and regenerates the flat files consumed by the
//! dashboard. Output is a pure function of the store contents, so two
//! exports without an intervening write are byte-identical.

pub mod records;
pub mod summary;
pub mod tabular;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use macro_db_database::{DbError, Store, paths};
use strum_macros::{AsRefStr, Display};

/// Observation table.
pub const CSV_FILE: &str = "macro_export.csv";

/// Forecast table, written alongside [`CSV_FILE`].
pub const FORECASTS_CSV_FILE: &str = "macro_forecasts.csv";

/// Per-indicator records.
pub const JSON_FILE: &str = "macro_export.json";

/// Rendered summary table.
pub const HTML_FILE: &str = "macro_summary.html";

/// Errors that can occur while exporting.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Reading the store failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Writing an output file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A format name was not recognized.
    #[error(transparent)]
    UnknownFormat(#[from] UnknownFormat),
}

/// Returned when parsing an unrecognized [`ExportFormat`] name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown export format {0:?} (expected csv, json, html or all)")]
pub struct UnknownFormat(pub String);

/// Output formats selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ExportFormat {
    /// `macro_export.csv` and `macro_forecasts.csv`.
    Csv,
    /// `macro_export.json`.
    Json,
    /// `macro_summary.html`.
    Html,
    /// Every format above.
    All,
}

impl ExportFormat {
    /// The concrete formats this selection stands for.
    #[must_use]
    pub const fn expand(self) -> &'static [Self] {
        match self {
            Self::Csv => &[Self::Csv],
            Self::Json => &[Self::Json],
            Self::Html => &[Self::Html],
            Self::All => &[Self::Csv, Self::Json, Self::Html],
        }
    }
}

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            "all" => Ok(Self::All),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Writes the files of `format` into `dir`, creating it if needed.
///
/// Returns the paths written, in the order they were written.
///
/// # Errors
///
/// Returns [`ExportError`] if the store cannot be read or a file cannot be
/// written. Files already renamed into place stay in place.
pub fn export(store: &Store, format: ExportFormat, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    paths::ensure_dir(dir)?;

    let mut written = Vec::new();
    for format in format.expand() {
        match format {
            ExportFormat::Csv => {
                let rows = store.read_all()?;
                written.push(write_atomic(
                    dir,
                    CSV_FILE,
                    &tabular::observations_csv(&rows)?,
                )?);
                let forecasts = store.read_forecasts()?;
                written.push(write_atomic(
                    dir,
                    FORECASTS_CSV_FILE,
                    &tabular::forecasts_csv(&forecasts)?,
                )?);
            }
            ExportFormat::Json => {
                let rows = store.read_all()?;
                let indicators = store.read_indicators()?;
                let json = records::observations_json(&indicators, &rows)?;
                written.push(write_atomic(dir, JSON_FILE, json.as_bytes())?);
            }
            ExportFormat::Html => {
                let latest = store.latest_observations()?;
                let html = summary::summary_html(&latest);
                written.push(write_atomic(dir, HTML_FILE, html.as_bytes())?);
            }
            ExportFormat::All => {}
        }
    }
    Ok(written)
}

/// Writes `contents` to `dir/name` through a `.tmp` sibling and a rename.
fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf, std::io::Error> {
    let path = dir.join(name);
    let tmp_path = dir.join(format!("{name}.tmp"));
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, &path)?;
    log::info!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(path)
}

/// Formats a value with the shortest representation that round-trips.
#[must_use]
pub fn format_value(value: f64) -> String {
    value.to_string()
}
