#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Indicator definitions and upstream source adapters.
//!
//! Each indicator is described by an [`IndicatorDefinition`] loaded from
//! TOML. Its `fetcher` table selects one of three adapters (SDMX CSV,
//! aggregator JSON, forecast spreadsheet) which turn an upstream response
//! into normalized records.

pub mod aggregator;
pub mod indicator_def;
pub mod registry;
pub mod retry;
pub mod sdmx;
pub mod spreadsheet;
pub mod xlsx;

use std::time::Duration;

use async_trait::async_trait;
use macro_db_indicator_models::{ForecastRecord, ObservationRecord};

pub use indicator_def::{ColumnLocator, FetcherConfig, IndicatorDefinition, SpreadsheetColumn};
pub use registry::ConfigError;
pub use retry::RetryPolicy;

/// Environment variable overriding the per-request timeout in seconds.
pub const HTTP_TIMEOUT_ENV: &str = "MACRO_DB_HTTP_TIMEOUT_SECS";

/// Environment variable overriding the number of retries per request.
pub const HTTP_RETRIES_ENV: &str = "MACRO_DB_HTTP_RETRIES";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 2;
const USER_AGENT: &str = concat!("macro-db/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching or parsing an upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request to {url} timed out")]
    Timeout {
        /// URL that timed out.
        url: String,
    },

    /// Upstream answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status {
        /// URL that was requested.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response arrived but could not be interpreted.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The spreadsheet container is not a valid zip archive.
    #[error("Spreadsheet archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A spreadsheet part is not valid XML.
    #[error("Spreadsheet XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SourceError {
    /// Creates a [`SourceError::Parse`] from anything printable.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Returns `true` if the upstream responded but the payload was
    /// unusable, as opposed to a transport or status failure.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Json(_) | Self::Zip(_) | Self::Xml(_) | Self::Csv(_)
        )
    }
}

/// Normalized output of one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    /// Time-series observations for the requested indicator.
    Observations(Vec<ObservationRecord>),
    /// Forecasts extracted from a spreadsheet publication.
    Forecasts(Vec<ForecastRecord>),
}

impl SourcePayload {
    /// Number of records carried by the payload.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Observations(records) => records.len(),
            Self::Forecasts(records) => records.len(),
        }
    }

    /// Returns `true` if the payload carries no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetches and normalizes the data for one indicator.
///
/// The ingestion orchestrator only depends on this trait so tests can
/// substitute canned payloads for the network.
#[async_trait]
pub trait ObservationFetcher: Send + Sync {
    /// Fetches the indicator's upstream data and normalizes it.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails or the response cannot
    /// be parsed.
    async fn fetch(&self, indicator: &IndicatorDefinition) -> Result<SourcePayload, SourceError>;
}

/// HTTP settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy {
                max_retries: DEFAULT_RETRIES,
                ..RetryPolicy::default()
            },
        }
    }
}

impl HttpSettings {
    /// Builds settings from [`HTTP_TIMEOUT_ENV`] and [`HTTP_RETRIES_ENV`],
    /// falling back to the defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a variable is set but not a valid
    /// non-negative integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(secs) = env_number::<u64>(HTTP_TIMEOUT_ENV)? {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_number::<u32>(HTTP_RETRIES_ENV)? {
            settings.retry.max_retries = retries;
        }
        Ok(settings)
    }
}

fn env_number<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Production [`ObservationFetcher`] talking to the real upstream APIs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// Creates a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            retry: settings.retry.clone(),
        })
    }
}

#[async_trait]
impl ObservationFetcher for HttpFetcher {
    async fn fetch(&self, indicator: &IndicatorDefinition) -> Result<SourcePayload, SourceError> {
        log::info!("GET {}", indicator.fetch_url());
        match &indicator.fetcher {
            FetcherConfig::Sdmx {
                url,
                accept,
                period_column,
                value_column,
                status_column,
            } => {
                let defaults = sdmx::SdmxColumns::default();
                let config = sdmx::SdmxConfig {
                    url,
                    accept: accept.as_deref(),
                    columns: sdmx::SdmxColumns {
                        period: period_column.as_deref().unwrap_or(defaults.period),
                        value: value_column.as_deref().unwrap_or(defaults.value),
                        status: status_column.as_deref().unwrap_or(defaults.status),
                    },
                };
                sdmx::fetch(&self.client, &self.retry, &config)
                    .await
                    .map(SourcePayload::Observations)
            }
            FetcherConfig::Aggregator {
                url,
                min_period,
                rebase_year,
            } => {
                let config = aggregator::AggregatorConfig {
                    url,
                    min_period: min_period.as_deref(),
                    rebase_year: rebase_year.as_deref(),
                };
                aggregator::fetch(&self.client, &self.retry, &config)
                    .await
                    .map(SourcePayload::Observations)
            }
            FetcherConfig::Spreadsheet {
                url,
                sheet,
                institution,
                vintage,
                columns,
            } => {
                let config = spreadsheet::SpreadsheetConfig {
                    url,
                    sheet: sheet.as_deref(),
                    institution: institution.as_ref(),
                    vintage: vintage.as_ref(),
                    columns,
                };
                spreadsheet::fetch(&self.client, &self.retry, &config)
                    .await
                    .map(SourcePayload::Forecasts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_are_classified() {
        assert!(SourceError::parse("bad").is_parse());
        assert!(
            !SourceError::Status {
                url: "http://x".to_string(),
                status: 404,
            }
            .is_parse()
        );
        assert!(
            !SourceError::Timeout {
                url: "http://x".to_string(),
            }
            .is_parse()
        );
    }

    #[test]
    fn default_settings_match_documented_values() {
        let settings = HttpSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.retry.max_retries, 2);
    }

    #[tokio::test]
    async fn http_fetcher_dispatches_on_fetcher_type() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/series"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"series":{"docs":[{"period":["2007","2008","2009"],"value":[1.0,2.0,"NA"]}]}}"#,
            ))
            .mount(&server)
            .await;

        let toml_str = format!(
            r#"
            code = "TEST_SERIES"
            name = "Test series"
            frequency = "A"
            unit = "level"
            source_agency = "DBnomics"

            [fetcher]
            type = "aggregator"
            url = "{}/series"
            min_period = "2008"
            "#,
            server.uri()
        );
        let indicator: IndicatorDefinition = toml::de::from_str(&toml_str).unwrap();

        let fetcher = HttpFetcher::new(&HttpSettings::default()).unwrap();
        let payload = fetcher.fetch(&indicator).await.unwrap();
        assert_eq!(
            payload,
            SourcePayload::Observations(vec![
                ObservationRecord::new("2008", 2.0).with_status("A")
            ])
        );
    }

    #[test]
    fn payload_length_counts_records() {
        let payload = SourcePayload::Observations(vec![
            ObservationRecord::new("2024", 1.0),
            ObservationRecord::new("2025", 2.0),
        ]);
        assert_eq!(payload.len(), 2);
        assert!(SourcePayload::Forecasts(Vec::new()).is_empty());
    }
}
