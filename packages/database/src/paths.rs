#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the data directory.
//!
//! Everything lives under one data directory: the `DuckDB` file and the
//! regenerated export files that the dashboard reads.

use std::path::{Path, PathBuf};

/// Overrides the data directory.
pub const DATA_DIR_ENV: &str = "MACRO_DB_DATA_DIR";

/// Overrides the database file path.
pub const DB_PATH_ENV: &str = "MACRO_DB_PATH";

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "macro.duckdb";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .unwrap_or(manifest_dir)
        .to_path_buf()
}

/// Returns the data directory: `$MACRO_DB_DATA_DIR`, or `data/` under the
/// project root.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| project_root().join("data"), PathBuf::from)
}

/// Returns the database path: `$MACRO_DB_PATH`, or `macro.duckdb` in the
/// data directory.
#[must_use]
pub fn db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| data_dir().join(DB_FILE_NAME), PathBuf::from)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
