#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Indicator metadata types and the normalized record formats.
//!
//! Every upstream adapter (SDMX CSV, aggregator JSON, forecast spreadsheet)
//! produces either [`ObservationRecord`]s or [`ForecastRecord`]s. The store
//! persists them alongside the [`IndicatorMeta`] describing each series.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Sampling frequency of an indicator.
///
/// Stored as the single-letter SDMX code (`A`, `Q`, `M`).
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
pub enum Frequency {
    /// One observation per year.
    #[serde(rename = "A", alias = "annual")]
    #[strum(to_string = "A", serialize = "annual")]
    Annual,
    /// One observation per quarter.
    #[serde(rename = "Q", alias = "quarterly")]
    #[strum(to_string = "Q", serialize = "quarterly")]
    Quarterly,
    /// One observation per month.
    #[serde(rename = "M", alias = "monthly")]
    #[strum(to_string = "M", serialize = "monthly")]
    Monthly,
}

/// Which adapter family fetches an indicator.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
    /// SDMX REST endpoint returning SDMX-CSV.
    Sdmx,
    /// Data aggregator JSON API (`DBnomics`).
    Aggregator,
    /// Spreadsheet-based forecast publication.
    Spreadsheet,
}

/// Unit of measure for an indicator's values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Unit {
    /// Year-on-year percentage change.
    PercentYy,
    /// Contribution to growth, in percentage points.
    ContributionPp,
    /// Generic index.
    Index,
    /// Index rebased so that the 2010 average equals 100.
    Index2010,
    /// Level in the series' native unit.
    Level,
    /// Survey balance (positive minus negative answers).
    Balance,
    /// Anything not covered above, kept verbatim.
    Other(String),
}

impl Unit {
    /// Returns the canonical string form used in configs and exports.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PercentYy => "percent_yy",
            Self::ContributionPp => "pp_contribution",
            Self::Index => "index",
            Self::Index2010 => "index_2010",
            Self::Level => "level",
            Self::Balance => "balance",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "percent_yy" => Self::PercentYy,
            "pp_contribution" | "contribution_pp" => Self::ContributionPp,
            "index" => Self::Index,
            "index_2010" => Self::Index2010,
            "level" => Self::Level,
            "balance" => Self::Balance,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for Unit {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(unit) => unit,
            Err(never) => match never {},
        }
    }
}

impl From<Unit> for String {
    fn from(value: Unit) -> Self {
        value.as_str().to_string()
    }
}

/// Category used when an indicator does not declare one.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Persisted metadata describing one indicator.
///
/// Written to the store on every run so that exports never need the
/// indicator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorMeta {
    /// Unique indicator code (e.g. `"GDP_QUARTERLY_YY"`).
    pub code: String,
    /// Human-readable name.
    pub display_name: String,
    /// Sampling frequency.
    pub frequency: Frequency,
    /// Unit of measure.
    pub unit: Unit,
    /// Publishing agency (e.g. `"NBB"`).
    pub source_agency: String,
    /// Adapter family used to fetch the series.
    pub source_type: SourceType,
    /// Free-form description.
    pub description: String,
    /// Grouping used by the rendered summary table.
    pub category: String,
    /// URL the data is fetched from.
    pub fetch_url: String,
}

/// One `(period, value)` pair produced by an observation adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    /// Period label, e.g. `"2025-Q4"`, `"2025-01"` or `"2025"`.
    pub period: String,
    /// Observed value.
    pub value: f64,
    /// Source observation status flag (SDMX `OBS_STATUS`), if any.
    pub obs_status: Option<String>,
}

impl ObservationRecord {
    /// Creates a record without a status flag.
    #[must_use]
    pub fn new(period: impl Into<String>, value: f64) -> Self {
        Self {
            period: period.into(),
            value,
            obs_status: None,
        }
    }

    /// Sets the observation status flag.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.obs_status = Some(status.into());
        self
    }
}

/// One institution's forecast for one indicator and year, from one
/// publication vintage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRecord {
    /// Forecasting institution (e.g. `"FPB"`, `"NBB"`, `"OECD"`).
    pub institution: String,
    /// Forecasted indicator code (e.g. `"GDP_VOL"`).
    pub indicator: String,
    /// Year the forecast applies to.
    pub forecast_year: String,
    /// Forecast value.
    pub value: f64,
    /// Publication date of the forecast (`YYYY-MM-DD`), or empty when the
    /// source does not state one.
    pub vintage: String,
}

/// Returns the leading four-digit year of a period label, if present.
#[must_use]
pub fn period_year(period: &str) -> Option<&str> {
    let year = period.get(..4)?;
    year.bytes().all(|b| b.is_ascii_digit()).then_some(year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_round_trips_sdmx_codes() {
        assert_eq!(Frequency::Quarterly.to_string(), "Q");
        assert_eq!("A".parse::<Frequency>().unwrap(), Frequency::Annual);
        assert_eq!("monthly".parse::<Frequency>().unwrap(), Frequency::Monthly);
    }

    #[test]
    fn frequency_deserializes_aliases() {
        let freq: Frequency = serde_json::from_str("\"quarterly\"").unwrap();
        assert_eq!(freq, Frequency::Quarterly);
        let freq: Frequency = serde_json::from_str("\"M\"").unwrap();
        assert_eq!(freq, Frequency::Monthly);
    }

    #[test]
    fn unit_accepts_contribution_alias() {
        assert_eq!(Unit::from("contribution_pp".to_string()), Unit::ContributionPp);
        assert_eq!(Unit::ContributionPp.to_string(), "pp_contribution");
    }

    #[test]
    fn unknown_unit_is_kept_verbatim() {
        let unit = Unit::from("eur_million".to_string());
        assert_eq!(unit, Unit::Other("eur_million".to_string()));
        assert_eq!(unit.as_str(), "eur_million");
    }

    #[test]
    fn source_type_uses_snake_case() {
        assert_eq!(SourceType::Spreadsheet.as_ref(), "spreadsheet");
        assert_eq!("sdmx".parse::<SourceType>().unwrap(), SourceType::Sdmx);
    }

    #[test]
    fn extracts_period_year() {
        assert_eq!(period_year("2025-Q4"), Some("2025"));
        assert_eq!(period_year("2019"), Some("2019"));
        assert_eq!(period_year("Q4"), None);
    }
}
