//! Config-driven indicator definition.
//!
//! [`IndicatorDefinition`] captures everything about one tracked series in a
//! serializable struct. The `fetcher` table selects which adapter retrieves
//! it, so adding an indicator never requires new code.

use macro_db_indicator_models::{DEFAULT_CATEGORY, Frequency, IndicatorMeta, SourceType, Unit};
use serde::Deserialize;

use crate::registry::ConfigError;

/// A complete, config-driven indicator definition.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorDefinition {
    /// Unique indicator code (e.g. `"GDP_QUARTERLY_YY"`).
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Sampling frequency.
    pub frequency: Frequency,
    /// Unit of measure.
    pub unit: Unit,
    /// Publishing agency.
    pub source_agency: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Grouping for the rendered summary table.
    #[serde(default)]
    pub category: Option<String>,
    /// How to fetch the series.
    pub fetcher: FetcherConfig,
}

/// Adapter selection and its parameters, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetcherConfig {
    /// SDMX REST endpoint answering in SDMX-CSV.
    Sdmx {
        /// Full data query URL.
        url: String,
        /// Override for the `Accept` header.
        accept: Option<String>,
        /// Column holding the period label (default `TIME_PERIOD`).
        period_column: Option<String>,
        /// Column holding the value (default `OBS_VALUE`).
        value_column: Option<String>,
        /// Column holding the status flag (default `OBS_STATUS`).
        status_column: Option<String>,
    },
    /// Aggregator JSON API (`DBnomics` series endpoint).
    Aggregator {
        /// Series URL including `observations=true`.
        url: String,
        /// Periods sorting before this label are dropped.
        min_period: Option<String>,
        /// Rebase the series so this year's average equals 100.
        rebase_year: Option<String>,
    },
    /// Forecast table published as an `.xlsx` workbook.
    Spreadsheet {
        /// Workbook download URL.
        url: String,
        /// Worksheet name; the first sheet when absent.
        sheet: Option<String>,
        /// Institution column; column A when absent.
        institution: Option<ColumnLocator>,
        /// Publication date column.
        vintage: Option<ColumnLocator>,
        /// Forecasted indicators and where their year blocks start.
        columns: Vec<SpreadsheetColumn>,
    },
}

/// Locates a spreadsheet column by header label or by column letter.
///
/// Exactly one of the two must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnLocator {
    /// Case-insensitive label contained in a header cell.
    pub header: Option<String>,
    /// Column letter(s), e.g. `"B"`.
    pub column: Option<String>,
}

impl ColumnLocator {
    fn check(&self) -> Result<(), &'static str> {
        match (self.header.as_deref(), self.column.as_deref()) {
            (Some(header), None) if !header.trim().is_empty() => Ok(()),
            (None, Some(column))
                if (1..=3).contains(&column.len())
                    && column.bytes().all(|b| b.is_ascii_alphabetic()) =>
            {
                Ok(())
            }
            (Some(_), Some(_)) => Err("set either header or column, not both"),
            _ => Err("needs a non-empty header or one to three column letters"),
        }
    }
}

/// One forecasted indicator inside a spreadsheet.
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetColumn {
    /// Indicator code stored with each forecast (e.g. `"GDP_VOL"`).
    pub indicator: String,
    /// First column of the indicator's per-year block.
    #[serde(flatten)]
    pub locator: ColumnLocator,
}

impl FetcherConfig {
    /// The adapter family this config selects.
    #[must_use]
    pub const fn source_type(&self) -> SourceType {
        match self {
            Self::Sdmx { .. } => SourceType::Sdmx,
            Self::Aggregator { .. } => SourceType::Aggregator,
            Self::Spreadsheet { .. } => SourceType::Spreadsheet,
        }
    }

    /// The URL the adapter requests.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Sdmx { url, .. } | Self::Aggregator { url, .. } | Self::Spreadsheet { url, .. } => {
                url
            }
        }
    }
}

impl IndicatorDefinition {
    /// The adapter family used for this indicator.
    #[must_use]
    pub const fn source_type(&self) -> SourceType {
        self.fetcher.source_type()
    }

    /// The URL this indicator is fetched from.
    #[must_use]
    pub fn fetch_url(&self) -> &str {
        self.fetcher.url()
    }

    /// Category, or [`DEFAULT_CATEGORY`] when none is configured.
    #[must_use]
    pub fn category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    /// Metadata persisted alongside the indicator's observations.
    #[must_use]
    pub fn meta(&self) -> IndicatorMeta {
        IndicatorMeta {
            code: self.code.clone(),
            display_name: self.name.clone(),
            frequency: self.frequency,
            unit: self.unit.clone(),
            source_agency: self.source_agency.clone(),
            source_type: self.source_type(),
            description: self.description.clone(),
            category: self.category().to_string(),
            fetch_url: self.fetch_url().to_string(),
        }
    }

    /// Checks the definition for values the adapters cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            code: self.code.clone(),
            message: message.to_string(),
        };

        if self.code.trim().is_empty() {
            return Err(invalid("code is empty"));
        }
        if self.code.chars().any(char::is_whitespace) {
            return Err(invalid("code contains whitespace"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.source_agency.trim().is_empty() {
            return Err(invalid("source_agency is empty"));
        }

        let url = self.fetch_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("fetcher url must be http(s)"));
        }

        if let FetcherConfig::Spreadsheet {
            institution,
            vintage,
            columns,
            ..
        } = &self.fetcher
        {
            if columns.is_empty() {
                return Err(invalid("spreadsheet fetcher has no columns"));
            }
            for column in columns {
                if column.indicator.trim().is_empty() {
                    return Err(invalid("spreadsheet column with empty indicator"));
                }
                column
                    .locator
                    .check()
                    .map_err(|m| invalid(&format!("column {}: {m}", column.indicator)))?;
            }
            for (label, locator) in [("institution", institution), ("vintage", vintage)] {
                if let Some(locator) = locator {
                    locator
                        .check()
                        .map_err(|m| invalid(&format!("{label}: {m}")))?;
                }
            }
        }

        Ok(())
    }
}
