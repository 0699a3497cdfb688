//! Aggregator JSON adapter (`DBnomics` series endpoint).
//!
//! A series request with `observations=true` returns
//! `{"series": {"docs": [{"period": [...], "value": [...]}]}}`. Values may
//! be numbers, numeric strings, `null`, or `"NA"` for periods the upstream
//! statistical office has not published yet.

use macro_db_indicator_models::{ObservationRecord, period_year};
use serde::Deserialize;
use serde_json::Value;

use crate::retry::{self, RetryPolicy};
use crate::SourceError;

/// Status flag carried by every aggregator value, which is always a
/// published actual.
const ACTUAL_STATUS: &str = "A";

/// Configuration for one aggregator series.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig<'a> {
    /// Series URL.
    pub url: &'a str,
    /// Periods sorting before this label are dropped.
    pub min_period: Option<&'a str>,
    /// Rebase so this year's average equals 100.
    pub rebase_year: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    series: SeriesDocs,
}

#[derive(Debug, Deserialize)]
struct SeriesDocs {
    #[serde(default)]
    docs: Vec<SeriesDoc>,
}

#[derive(Debug, Deserialize)]
struct SeriesDoc {
    #[serde(default)]
    period: Vec<Value>,
    #[serde(default)]
    value: Vec<Value>,
}

/// Downloads one aggregator series and parses its observations.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the document does not
/// contain a series.
#[allow(clippy::future_not_send)]
pub async fn fetch(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    config: &AggregatorConfig<'_>,
) -> Result<Vec<ObservationRecord>, SourceError> {
    let body = retry::send_text(|| client.get(config.url), policy).await?;
    parse_series_json(&body, config.min_period, config.rebase_year)
}

/// Parses a series document into observations.
///
/// Missing (`null`, `"NA"`) and non-numeric values are skipped, which also
/// absorbs trailing periods the upstream has not filled yet. With
/// `rebase_year` set, every value is divided by that year's average and
/// multiplied by 100, rounded to two decimals.
///
/// # Errors
///
/// Returns [`SourceError::Json`] for invalid JSON and [`SourceError::Parse`]
/// when the document has no series.
pub fn parse_series_json(
    body: &str,
    min_period: Option<&str>,
    rebase_year: Option<&str>,
) -> Result<Vec<ObservationRecord>, SourceError> {
    let response: SeriesResponse = serde_json::from_str(body)?;
    let doc = response
        .series
        .docs
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::parse("aggregator response contains no series"))?;

    if doc.period.len() != doc.value.len() {
        log::debug!(
            "aggregator series has {} periods but {} values",
            doc.period.len(),
            doc.value.len()
        );
    }

    let mut records: Vec<ObservationRecord> = doc
        .period
        .iter()
        .zip(&doc.value)
        .filter_map(|(period, value)| {
            let period = match period {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            if period.is_empty() || min_period.is_some_and(|min| period.as_str() < min) {
                return None;
            }
            json_number(value)
                .map(|v| ObservationRecord::new(period, v).with_status(ACTUAL_STATUS))
        })
        .collect();

    if let Some(year) = rebase_year {
        rebase(&mut records, year);
    }

    Ok(records)
}

fn json_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("NA") {
                None
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Rebases `records` so the average of `year`'s periods equals 100.
///
/// Leaves the values untouched when the base year is absent or averages
/// to zero.
#[allow(clippy::cast_precision_loss)]
fn rebase(records: &mut [ObservationRecord], year: &str) {
    let base: Vec<f64> = records
        .iter()
        .filter(|r| period_year(&r.period) == Some(year))
        .map(|r| r.value)
        .collect();
    if base.is_empty() {
        log::warn!("cannot rebase to {year}: no observations in base year");
        return;
    }
    let average = base.iter().sum::<f64>() / base.len() as f64;
    if average == 0.0 {
        log::warn!("cannot rebase to {year}: base year averages to zero");
        return;
    }
    for record in records {
        record.value = round2(record.value / average * 100.0);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
