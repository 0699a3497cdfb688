#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion orchestrator.
//!
//! Walks the configured indicators in order, fetches each one through an
//! [`ObservationFetcher`], upserts the result into the [`Store`], and
//! appends one fetch-log entry per indicator. One indicator's failure never
//! stops the others.

use std::time::{Duration, Instant};

use macro_db_database::{DbError, Store};
use macro_db_database_models::FetchLogEntry;
use macro_db_source::{IndicatorDefinition, ObservationFetcher, SourceError, SourcePayload};

/// Environment variable holding a comma-separated indicator code filter.
pub const INDICATORS_ENV: &str = "MACRO_DB_INDICATORS";

/// Why one indicator failed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Fetching or parsing the upstream data failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Persisting the data failed.
    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

/// Returns the indicators to ingest, filtered by the `--indicators` CLI flag
/// or the [`INDICATORS_ENV`] environment variable. If neither is set, all
/// indicators are returned.
///
/// Codes match case-insensitively; unknown codes are warned about and
/// ignored.
#[must_use]
pub fn enabled_indicators(
    all: Vec<IndicatorDefinition>,
    cli_filter: Option<String>,
) -> Vec<IndicatorDefinition> {
    let filter = cli_filter.or_else(|| std::env::var(INDICATORS_ENV).ok());

    let Some(filter_str) = filter else {
        return all;
    };

    let codes: Vec<String> = filter_str
        .split(',')
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect();
    if codes.is_empty() {
        return all;
    }

    for code in &codes {
        if !all.iter().any(|i| i.code.eq_ignore_ascii_case(code)) {
            log::warn!(
                "Unknown indicator {code:?} in filter. Available: {}",
                all.iter()
                    .map(|i| i.code.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    all.into_iter()
        .filter(|i| codes.contains(&i.code.to_uppercase()))
        .collect()
}

/// Outcome of one indicator within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorOutcome {
    /// Data was fetched and stored.
    Success {
        /// Number of distinct rows upserted.
        rows: u64,
    },
    /// The indicator was skipped for this run.
    Failure {
        /// Human-readable cause.
        error: String,
    },
}

/// One line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorResult {
    /// Indicator code.
    pub code: String,
    /// What happened.
    pub outcome: IndicatorOutcome,
}

/// Result of a full ingestion run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Per-indicator outcomes in processing order.
    pub results: Vec<IndicatorResult>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Number of indicators that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, IndicatorOutcome::Success { .. }))
            .count()
    }

    /// Number of indicators that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Total rows upserted across all successful indicators.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                IndicatorOutcome::Success { rows } => rows,
                IndicatorOutcome::Failure { .. } => 0,
            })
            .sum()
    }

    /// `true` when at least one indicator ran and none succeeded.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        !self.results.is_empty() && self.succeeded() == 0
    }
}

/// Fetches and stores every indicator in `indicators`, in order.
///
/// Each indicator gets exactly one fetch-log entry. A failed log write is
/// reported but does not change the indicator's outcome.
pub async fn run_ingestion(
    store: &mut Store,
    indicators: &[IndicatorDefinition],
    fetcher: &dyn ObservationFetcher,
) -> RunSummary {
    let start = Instant::now();
    let mut results = Vec::with_capacity(indicators.len());

    for indicator in indicators {
        let code = indicator.code.as_str();
        let (outcome, entry) = match ingest_indicator(store, indicator, fetcher).await {
            Ok(rows) => {
                log::info!("OK {code}: {rows} rows");
                (
                    IndicatorOutcome::Success { rows },
                    FetchLogEntry::success(code, rows),
                )
            }
            Err(e) => {
                let error = e.to_string();
                log::error!("FAIL {code}: {error}");
                (
                    IndicatorOutcome::Failure {
                        error: error.clone(),
                    },
                    FetchLogEntry::failure(code, error),
                )
            }
        };

        if let Err(e) = store.record_fetch_attempt(&entry) {
            log::error!("Failed to write fetch log for {code}: {e}");
        }

        results.push(IndicatorResult {
            code: code.to_string(),
            outcome,
        });
    }

    let summary = RunSummary {
        results,
        elapsed: start.elapsed(),
    };

    log::info!(
        "Ingestion complete: {} succeeded, {} failed, {} rows, took {:.1}s",
        summary.succeeded(),
        summary.failed(),
        summary.total_rows(),
        summary.elapsed.as_secs_f64()
    );

    summary
}

async fn ingest_indicator(
    store: &mut Store,
    indicator: &IndicatorDefinition,
    fetcher: &dyn ObservationFetcher,
) -> Result<u64, IngestError> {
    store.upsert_indicator(&indicator.meta())?;

    let rows = match fetcher.fetch(indicator).await? {
        SourcePayload::Observations(records) => {
            store.upsert_observations(&indicator.code, &records)?
        }
        SourcePayload::Forecasts(records) => store.upsert_forecasts(&records)?,
    };

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use macro_db_database_models::FetchStatus;
    use macro_db_indicator_models::{ForecastRecord, Frequency, ObservationRecord, Unit};
    use macro_db_source::FetcherConfig;

    use super::*;

    fn indicator(code: &str) -> IndicatorDefinition {
        IndicatorDefinition {
            code: code.to_string(),
            name: format!("{code} name"),
            frequency: Frequency::Quarterly,
            unit: Unit::PercentYy,
            source_agency: "NBB".to_string(),
            description: String::new(),
            category: None,
            fetcher: FetcherConfig::Aggregator {
                url: format!("https://example.org/{code}"),
                min_period: None,
                rebase_year: None,
            },
        }
    }

    /// Serves canned payloads keyed by indicator code; unknown codes fail.
    struct StubFetcher {
        payloads: BTreeMap<String, SourcePayload>,
    }

    impl StubFetcher {
        fn new(entries: impl IntoIterator<Item = (&'static str, SourcePayload)>) -> Self {
            Self {
                payloads: entries
                    .into_iter()
                    .map(|(code, payload)| (code.to_string(), payload))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ObservationFetcher for StubFetcher {
        async fn fetch(
            &self,
            indicator: &IndicatorDefinition,
        ) -> Result<SourcePayload, SourceError> {
            self.payloads
                .get(&indicator.code)
                .cloned()
                .ok_or_else(|| SourceError::Status {
                    url: indicator.fetch_url().to_string(),
                    status: 503,
                })
        }
    }

    fn observations(records: &[(&str, f64)]) -> SourcePayload {
        SourcePayload::Observations(
            records
                .iter()
                .map(|&(period, value)| ObservationRecord::new(period, value))
                .collect(),
        )
    }

    #[tokio::test]
    async fn one_failing_indicator_does_not_stop_the_run() {
        let mut store = Store::open_in_memory().unwrap();
        let indicators = [indicator("A"), indicator("BROKEN"), indicator("C")];
        let fetcher = StubFetcher::new([
            ("A", observations(&[("2025-Q1", 1.0), ("2025-Q2", 1.1)])),
            ("C", observations(&[("2025-Q1", -0.3)])),
        ]);

        let summary = run_ingestion(&mut store, &indicators, &fetcher).await;

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.total_rows(), 3);
        assert!(!summary.is_total_failure());
        assert!(matches!(
            summary.results[1].outcome,
            IndicatorOutcome::Failure { ref error } if error.contains("503")
        ));

        let log = store.read_log(10).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.iter()
                .filter(|e| e.status == FetchStatus::Success)
                .count(),
            2
        );
        let failure = log
            .iter()
            .find(|e| e.status == FetchStatus::Failure)
            .unwrap();
        assert_eq!(failure.indicator_code, "BROKEN");
        assert!(failure.error_message.is_some());

        let rows = store.read_all().unwrap();
        let codes: Vec<&str> = rows.iter().map(|r| r.indicator_code.as_str()).collect();
        assert_eq!(codes, ["A", "A", "C"]);
    }

    #[tokio::test]
    async fn all_failing_is_total_failure() {
        let mut store = Store::open_in_memory().unwrap();
        let indicators = [indicator("X"), indicator("Y")];
        let fetcher = StubFetcher::new([]);

        let summary = run_ingestion(&mut store, &indicators, &fetcher).await;

        assert!(summary.is_total_failure());
        assert_eq!(store.read_log(10).unwrap().len(), 2);
        assert!(store.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_write_failure_fails_each_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro.duckdb");
        drop(Store::open(&path).unwrap());
        let mut store = Store::open_read_only(&path).unwrap();
        let indicators = [indicator("A"), indicator("B")];
        let fetcher = StubFetcher::new([
            ("A", observations(&[("2025-Q1", 1.0)])),
            ("B", observations(&[("2025-Q1", 2.0)])),
        ]);

        let summary = run_ingestion(&mut store, &indicators, &fetcher).await;

        assert_eq!(summary.results.len(), 2);
        assert!(summary.is_total_failure());
        for result in &summary.results {
            assert!(
                matches!(
                    &result.outcome,
                    IndicatorOutcome::Failure { error } if error.starts_with("Store error")
                ),
                "{}: {:?}",
                result.code,
                result.outcome
            );
        }
        assert!(store.read_log(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_run_is_not_total_failure() {
        let mut store = Store::open_in_memory().unwrap();
        let summary = run_ingestion(&mut store, &[], &StubFetcher::new([])).await;
        assert!(!summary.is_total_failure());
        assert!(summary.results.is_empty());
    }

    #[tokio::test]
    async fn forecasts_are_stored_and_logged_under_indicator_code() {
        let mut store = Store::open_in_memory().unwrap();
        let forecast = ForecastRecord {
            institution: "FPB".to_string(),
            indicator: "GDP_VOL".to_string(),
            forecast_year: "2026".to_string(),
            value: 1.2,
            vintage: "2025-09-15".to_string(),
        };
        let fetcher = StubFetcher::new([(
            "FPB_FORECASTS",
            SourcePayload::Forecasts(vec![forecast]),
        )]);

        let summary = run_ingestion(&mut store, &[indicator("FPB_FORECASTS")], &fetcher).await;

        assert_eq!(
            summary.results[0].outcome,
            IndicatorOutcome::Success { rows: 1 }
        );
        assert_eq!(store.read_forecasts().unwrap().len(), 1);
        assert_eq!(store.read_log(1).unwrap()[0].indicator_code, "FPB_FORECASTS");
    }

    #[tokio::test]
    async fn rerunning_is_idempotent() {
        let mut store = Store::open_in_memory().unwrap();
        let indicators = [indicator("A")];
        let fetcher = StubFetcher::new([("A", observations(&[("2025", 1.5)]))]);

        run_ingestion(&mut store, &indicators, &fetcher).await;
        let first = store.read_all().unwrap();
        run_ingestion(&mut store, &indicators, &fetcher).await;
        let second = store.read_all().unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].value, second[0].value);
        assert_eq!(store.read_log(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn metadata_is_persisted_even_when_fetch_fails() {
        let mut store = Store::open_in_memory().unwrap();
        run_ingestion(&mut store, &[indicator("DOWN")], &StubFetcher::new([])).await;

        let metas = store.read_indicators().unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].display_name, "DOWN name");
    }

    #[test]
    fn filter_selects_codes_case_insensitively() {
        let all = vec![indicator("GDP"), indicator("CPI"), indicator("CONF")];
        let filtered = enabled_indicators(all, Some("conf, gdp".to_string()));
        let codes: Vec<&str> = filtered.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, ["GDP", "CONF"]);
    }

    #[test]
    fn filter_ignores_unknown_codes() {
        let all = vec![indicator("GDP")];
        let filtered = enabled_indicators(all, Some("GDP,NOPE".to_string()));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn blank_filter_keeps_everything() {
        let all = vec![indicator("GDP"), indicator("CPI")];
        assert_eq!(enabled_indicators(all, Some(" , ".to_string())).len(), 2);
    }
}
