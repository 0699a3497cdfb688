#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Database row types.
//!
//! These types represent the shapes of data as stored in and retrieved from
//! the `DuckDB` store. They are distinct from the normalized ingestion types
//! in `macro_db_indicator_models`, which carry no persistence metadata.

use chrono::{DateTime, Utc};
use macro_db_indicator_models::Unit;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// An observation joined with its indicator's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRow {
    /// Indicator code.
    pub indicator_code: String,
    /// Indicator display name.
    pub display_name: String,
    /// Period label.
    pub period: String,
    /// Observed value.
    pub value: f64,
    /// Source observation status flag.
    pub obs_status: Option<String>,
    /// Unit of measure.
    pub unit: Unit,
    /// Publishing agency.
    pub source_agency: String,
    /// Summary-table grouping.
    pub category: String,
    /// RFC 3339 timestamp of the last write to this row.
    pub last_updated: String,
}

/// The most recent observation of an indicator, with the value of the
/// period before it (used for trend arrows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestObservation {
    /// The latest stored row.
    pub row: ObservationRow,
    /// Value of the immediately preceding period, if one is stored.
    pub previous_value: Option<f64>,
}

/// A stored forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRow {
    /// Forecasting institution.
    pub institution: String,
    /// Forecasted indicator code.
    pub indicator: String,
    /// Year the forecast applies to.
    pub forecast_year: String,
    /// Forecast value.
    pub value: f64,
    /// Publication date of the forecast.
    pub vintage: String,
    /// RFC 3339 timestamp of the last write to this row.
    pub last_updated: String,
}

/// Outcome of one ingestion attempt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    /// The fetch, parse, and upsert all succeeded.
    Success,
    /// Any step failed; see the entry's error message.
    Failure,
}

/// One row of the append-only fetch log.
///
/// `error_message` is present iff `status` is [`FetchStatus::Failure`];
/// the constructors are the only way to build an entry with a consistent
/// pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchLogEntry {
    /// Indicator the attempt was for.
    pub indicator_code: String,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Outcome.
    pub status: FetchStatus,
    /// Rows written (zero on failure).
    pub observation_count: u64,
    /// Human-readable cause of a failure.
    pub error_message: Option<String>,
}

impl FetchLogEntry {
    /// Creates a success entry stamped with the current time.
    #[must_use]
    pub fn success(indicator_code: impl Into<String>, observation_count: u64) -> Self {
        Self {
            indicator_code: indicator_code.into(),
            timestamp: Utc::now(),
            status: FetchStatus::Success,
            observation_count,
            error_message: None,
        }
    }

    /// Creates a failure entry stamped with the current time.
    #[must_use]
    pub fn failure(indicator_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            indicator_code: indicator_code.into(),
            timestamp: Utc::now(),
            status: FetchStatus::Failure,
            observation_count: 0,
            error_message: Some(error_message.into()),
        }
    }

    /// Returns `true` if this entry records a successful attempt.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}
