//! Delimited exports.
//!
//! The observation table's header and column order are a public contract:
//! the dashboard reads the file directly.

use macro_db_database_models::{ForecastRow, ObservationRow};

use crate::{ExportError, format_value};

/// Header of `macro_export.csv`.
pub const OBSERVATION_HEADER: [&str; 7] = [
    "indicator_code",
    "display_name",
    "period",
    "value",
    "unit",
    "source_agency",
    "last_updated",
];

/// Header of `macro_forecasts.csv`.
pub const FORECAST_HEADER: [&str; 6] = [
    "institution",
    "indicator",
    "forecast_year",
    "value",
    "vintage",
    "last_updated",
];

/// Encodes observations as CSV, one row each, sorted by indicator code
/// then period.
///
/// # Errors
///
/// Returns [`ExportError`] if encoding fails.
pub fn observations_csv(rows: &[ObservationRow]) -> Result<Vec<u8>, ExportError> {
    let mut sorted: Vec<&ObservationRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.indicator_code
            .cmp(&b.indicator_code)
            .then_with(|| a.period.cmp(&b.period))
    });

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(OBSERVATION_HEADER)?;
    for row in sorted {
        writer.write_record([
            row.indicator_code.as_str(),
            row.display_name.as_str(),
            row.period.as_str(),
            format_value(row.value).as_str(),
            row.unit.as_str(),
            row.source_agency.as_str(),
            row.last_updated.as_str(),
        ])?;
    }
    finish(writer)
}

/// Encodes forecasts as CSV, sorted by indicator, year, institution, then
/// vintage.
///
/// # Errors
///
/// Returns [`ExportError`] if encoding fails.
pub fn forecasts_csv(rows: &[ForecastRow]) -> Result<Vec<u8>, ExportError> {
    let mut sorted: Vec<&ForecastRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.indicator, &a.forecast_year, &a.institution, &a.vintage).cmp(&(
            &b.indicator,
            &b.forecast_year,
            &b.institution,
            &b.vintage,
        ))
    });

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(FORECAST_HEADER)?;
    for row in sorted {
        writer.write_record([
            row.institution.as_str(),
            row.indicator.as_str(),
            row.forecast_year.as_str(),
            format_value(row.value).as_str(),
            row.vintage.as_str(),
            row.last_updated.as_str(),
        ])?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer
        .into_inner()
        .map_err(|e| ExportError::Io(std::io::Error::new(e.error().kind(), e.to_string())))
}
