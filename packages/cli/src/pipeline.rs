//! Fetch and export steps shared by the subcommands.

use std::path::{Path, PathBuf};

use macro_db_database::{Store, paths};
use macro_db_export::ExportFormat;
use macro_db_ingest::{IndicatorOutcome, RunSummary, enabled_indicators, run_ingestion};
use macro_db_source::registry::{all_indicators, load_indicators};
use macro_db_source::{ConfigError, HttpFetcher, HttpSettings, IndicatorDefinition};

/// Paths resolved from the global options and the environment.
#[derive(Debug, Clone)]
pub struct Context {
    /// Database file.
    pub db_path: PathBuf,
    /// Export directory.
    pub data_dir: PathBuf,
    /// External indicator config replacing the built-in set.
    pub config: Option<PathBuf>,
}

impl Context {
    /// Resolves paths: explicit options first, then environment variables,
    /// then the defaults under the project root.
    ///
    /// A `--data-dir` without `--db` moves the database there too, unless
    /// `MACRO_DB_PATH` is set.
    #[must_use]
    pub fn new(db: Option<PathBuf>, data_dir: Option<PathBuf>, config: Option<PathBuf>) -> Self {
        let db_from_env = std::env::var_os(paths::DB_PATH_ENV).is_some_and(|v| !v.is_empty());
        let db_path = match (db, &data_dir) {
            (Some(db), _) => db,
            (None, Some(dir)) if !db_from_env => dir.join(paths::DB_FILE_NAME),
            (None, _) => paths::db_path(),
        };
        Self {
            db_path,
            data_dir: data_dir.unwrap_or_else(paths::data_dir),
            config,
        }
    }

    /// The configured indicators, from `--config` or the built-in set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is unreadable or
    /// invalid.
    pub fn indicators(&self) -> Result<Vec<IndicatorDefinition>, ConfigError> {
        match &self.config {
            Some(path) => {
                log::info!("Loading indicators from {}", path.display());
                load_indicators(path)
            }
            None => all_indicators(),
        }
    }
}

/// Runs one ingestion over the enabled indicators and logs the summary.
///
/// The store is opened for writing only for the duration of the run.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the filter matches no
/// indicator, or the store cannot be opened. Per-indicator failures are
/// reported in the returned summary instead.
pub async fn fetch(
    ctx: &Context,
    filter: Option<String>,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let indicators = enabled_indicators(ctx.indicators()?, filter);
    if indicators.is_empty() {
        return Err("No indicators selected; check --indicators or MACRO_DB_INDICATORS".into());
    }

    let settings = HttpSettings::from_env()?;
    let fetcher = HttpFetcher::new(&settings)?;

    log::info!(
        "Fetching {} indicator(s) into {}: {}",
        indicators.len(),
        ctx.db_path.display(),
        indicators
            .iter()
            .map(|i| i.code.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let summary = {
        let mut store = Store::open(&ctx.db_path)?;
        run_ingestion(&mut store, &indicators, &fetcher).await
    };

    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &RunSummary) {
    log::info!(
        "Ingestion finished in {:.1}s: {} succeeded, {} failed, {} rows",
        summary.elapsed.as_secs_f64(),
        summary.succeeded(),
        summary.failed(),
        summary.total_rows()
    );
    for result in &summary.results {
        if let IndicatorOutcome::Failure { error } = &result.outcome {
            log::warn!("  {}: {error}", result.code);
        }
    }
}

/// Writes every requested format into the context's data directory.
///
/// # Errors
///
/// Returns [`macro_db_export::ExportError`] on the first failed format.
pub fn export(
    store: &Store,
    ctx: &Context,
    formats: &[ExportFormat],
) -> Result<Vec<PathBuf>, macro_db_export::ExportError> {
    export_to(store, &ctx.data_dir, formats)
}

fn export_to(
    store: &Store,
    dir: &Path,
    formats: &[ExportFormat],
) -> Result<Vec<PathBuf>, macro_db_export::ExportError> {
    let mut written: Vec<PathBuf> = Vec::new();
    for format in formats {
        for path in macro_db_export::export(store, *format, dir)? {
            if !written.contains(&path) {
                written.push(path);
            }
        }
    }
    log::info!("Exported {} file(s) to {}", written.len(), dir.display());
    Ok(written)
}
