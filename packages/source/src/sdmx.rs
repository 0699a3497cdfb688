//! SDMX REST adapter (SDMX-CSV responses).
//!
//! The National Bank of Belgium's dissemination API answers data queries in
//! SDMX-CSV when asked with the right `Accept` header. Only the period,
//! value, and status columns are read; every other dimension column is
//! ignored.

use std::collections::BTreeMap;

use macro_db_indicator_models::ObservationRecord;

use crate::retry::{self, RetryPolicy};
use crate::SourceError;

/// `Accept` header requesting SDMX-CSV 2.0.
pub const SDMX_CSV_ACCEPT: &str = "application/vnd.sdmx.data+csv;version=2.0.0";

const DEFAULT_PERIOD_COLUMN: &str = "TIME_PERIOD";
const DEFAULT_VALUE_COLUMN: &str = "OBS_VALUE";
const DEFAULT_STATUS_COLUMN: &str = "OBS_STATUS";

/// Configuration for one SDMX data query.
#[derive(Debug, Clone, Copy)]
pub struct SdmxConfig<'a> {
    /// Full data query URL.
    pub url: &'a str,
    /// `Accept` header override.
    pub accept: Option<&'a str>,
    /// Column names to read.
    pub columns: SdmxColumns<'a>,
}

/// Names of the SDMX-CSV columns the adapter reads.
#[derive(Debug, Clone, Copy)]
pub struct SdmxColumns<'a> {
    /// Period label column.
    pub period: &'a str,
    /// Numeric value column.
    pub value: &'a str,
    /// Optional status flag column.
    pub status: &'a str,
}

impl Default for SdmxColumns<'_> {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD_COLUMN,
            value: DEFAULT_VALUE_COLUMN,
            status: DEFAULT_STATUS_COLUMN,
        }
    }
}

/// Downloads an SDMX-CSV response and parses its observations.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the CSV lacks the
/// period or value column.
#[allow(clippy::future_not_send)]
pub async fn fetch(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    config: &SdmxConfig<'_>,
) -> Result<Vec<ObservationRecord>, SourceError> {
    let accept = config.accept.unwrap_or(SDMX_CSV_ACCEPT);
    let body = retry::send_text(
        || {
            client
                .get(config.url)
                .header(reqwest::header::ACCEPT, accept)
        },
        policy,
    )
    .await?;
    parse_sdmx_csv(&body, &config.columns)
}

/// Parses an SDMX-CSV body into observations.
///
/// Rows with an empty period, an empty value, or a non-numeric value are
/// skipped. When a period repeats, the last row wins. The result is sorted
/// by period.
///
/// # Errors
///
/// Returns [`SourceError::Parse`] if the body has no header row or lacks
/// the period or value column, and [`SourceError::Csv`] on malformed CSV.
pub fn parse_sdmx_csv(
    body: &str,
    columns: &SdmxColumns<'_>,
) -> Result<Vec<ObservationRecord>, SourceError> {
    let body = body.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let find = |name: &str| headers.iter().position(|h| h.trim() == name);

    let period_idx = find(columns.period)
        .ok_or_else(|| SourceError::parse(format!("SDMX-CSV has no {} column", columns.period)))?;
    let value_idx = find(columns.value)
        .ok_or_else(|| SourceError::parse(format!("SDMX-CSV has no {} column", columns.value)))?;
    let status_idx = find(columns.status);

    let mut by_period: BTreeMap<String, ObservationRecord> = BTreeMap::new();
    let mut skipped = 0u64;

    for row in reader.records() {
        let row = row?;
        let period = row.get(period_idx).map_or("", str::trim);
        let raw_value = row.get(value_idx).map_or("", str::trim);
        if period.is_empty() || raw_value.is_empty() {
            skipped += 1;
            continue;
        }
        let Ok(value) = raw_value.parse::<f64>() else {
            skipped += 1;
            continue;
        };
        if !value.is_finite() {
            skipped += 1;
            continue;
        }

        let obs_status = status_idx
            .and_then(|i| row.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        by_period.insert(
            period.to_string(),
            ObservationRecord {
                period: period.to_string(),
                value,
                obs_status,
            },
        );
    }

    if skipped > 0 {
        log::debug!("SDMX-CSV: skipped {skipped} rows without a usable value");
    }

    Ok(by_period.into_values().collect())
}
