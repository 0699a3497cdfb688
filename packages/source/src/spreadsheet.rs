//! Forecast spreadsheet adapter.
//!
//! The Federal Planning Bureau compiles the latest forecasts of several
//! institutions into one worksheet: one row per institution and, for each
//! forecasted indicator, a block of per-year columns under a header label.
//!
//! ```text
//!              | Croissance du PIB | Inflation   | ... | Mise à jour
//!              | 2025  | 2026      | 2025 | 2026 |     |
//! Institution  |       |           |      |      |     |
//! FPB          | 1,1   | 1,2       | 2,3  | 1,8  |     | 2025-09-15
//! ```
//!
//! Each block is located either by a header label, which survives a
//! re-ordered layout, or by a fixed column letter. The years are read from
//! the cells of the block's first row that hold one.

use chrono::NaiveDate;
use macro_db_indicator_models::ForecastRecord;

use crate::indicator_def::{ColumnLocator, SpreadsheetColumn};
use crate::retry::{self, RetryPolicy};
use crate::xlsx::{self, Cell, Sheet};
use crate::SourceError;

/// Placeholders used in the publication for "no forecast".
const MISSING_MARKERS: &[&str] = &["-.-", "\u{2014}", "\u{2013}", "-", "...", "\u{2026}", "n.a.", "na"];

/// How many rows below a header label the year row may sit.
const YEAR_ROW_SEARCH_DEPTH: usize = 3;

/// Configuration for one forecast spreadsheet.
#[derive(Debug, Clone, Copy)]
pub struct SpreadsheetConfig<'a> {
    /// Workbook download URL.
    pub url: &'a str,
    /// Worksheet name; the first sheet when absent.
    pub sheet: Option<&'a str>,
    /// Institution column; column A when absent.
    pub institution: Option<&'a ColumnLocator>,
    /// Publication date column.
    pub vintage: Option<&'a ColumnLocator>,
    /// Indicators to extract.
    pub columns: &'a [SpreadsheetColumn],
}

/// Where a column was found.
#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Header cell at `(row, col)`.
    Header(usize, usize),
    /// Fixed column with no header cell.
    Column(usize),
}

impl Anchor {
    const fn col(self) -> usize {
        match self {
            Self::Header(_, col) | Self::Column(col) => col,
        }
    }
}

/// One located indicator block.
#[derive(Debug)]
struct Block<'a> {
    indicator: &'a str,
    year_row: usize,
    years: Vec<(usize, String)>,
}

/// Downloads the workbook and extracts every forecast in it.
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails or the layout cannot be
/// recognized.
#[allow(clippy::future_not_send)]
pub async fn fetch(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    config: &SpreadsheetConfig<'_>,
) -> Result<Vec<ForecastRecord>, SourceError> {
    let bytes = retry::send_bytes(|| client.get(config.url), policy).await?;
    let sheet = xlsx::read_sheet(&bytes, config.sheet)?;
    parse_forecast_sheet(&sheet, config)
}

/// Extracts forecasts from a decoded worksheet.
///
/// Cells holding a missing marker, or nothing, produce no record. Values
/// accept a decimal comma and are rounded to two decimals.
///
/// # Errors
///
/// Returns [`SourceError::Parse`] if a configured header label is missing
/// or an indicator block has no year row.
pub fn parse_forecast_sheet(
    sheet: &Sheet,
    config: &SpreadsheetConfig<'_>,
) -> Result<Vec<ForecastRecord>, SourceError> {
    let anchors: Vec<Anchor> = config
        .columns
        .iter()
        .map(|column| locate(sheet, &column.locator))
        .collect::<Result<_, _>>()?;

    let start_cols: Vec<usize> = anchors.iter().map(|a| a.col()).collect();
    let blocks: Vec<Block<'_>> = config
        .columns
        .iter()
        .zip(&anchors)
        .map(|(column, anchor)| locate_years(sheet, &column.indicator, *anchor, &start_cols))
        .collect::<Result<_, _>>()?;

    let institution_col = match config.institution {
        Some(locator) => locate(sheet, locator)?.col(),
        None => 0,
    };
    let vintage_col = match config.vintage.map(|locator| locate(sheet, locator)) {
        Some(Ok(anchor)) => Some(anchor.col()),
        Some(Err(e)) => {
            log::warn!("{e}, forecasts get no vintage");
            None
        }
        None => None,
    };

    let first_data_row = blocks.iter().map(|b| b.year_row).max().unwrap_or(0) + 1;
    let mut forecasts = Vec::new();

    for row in first_data_row..sheet.height() {
        let institution = sheet.cell(row, institution_col);
        if !matches!(institution, Cell::Text(_)) || institution.is_blank() {
            continue;
        }
        let institution = institution.text();
        let vintage = vintage_col
            .map(|col| vintage_date(sheet.cell(row, col)))
            .unwrap_or_default();

        for block in &blocks {
            for (col, year) in &block.years {
                let Some(value) = parse_value(sheet.cell(row, *col)) else {
                    continue;
                };
                forecasts.push(ForecastRecord {
                    institution: institution.clone(),
                    indicator: block.indicator.to_string(),
                    forecast_year: year.clone(),
                    value,
                    vintage: vintage.clone(),
                });
            }
        }
    }

    log::debug!(
        "spreadsheet: {} forecasts from {} indicator blocks",
        forecasts.len(),
        blocks.len()
    );

    Ok(forecasts)
}

fn locate(sheet: &Sheet, locator: &ColumnLocator) -> Result<Anchor, SourceError> {
    if let Some(letters) = locator.column.as_deref() {
        return xlsx::column_index(letters)
            .map(Anchor::Column)
            .ok_or_else(|| SourceError::parse(format!("invalid column reference {letters:?}")));
    }
    let label = locator.header.as_deref().unwrap_or_default();
    find_header(sheet, label)
        .map(|(row, col)| Anchor::Header(row, col))
        .ok_or_else(|| SourceError::parse(format!("spreadsheet header {label:?} not found")))
}

/// Finds the first text cell, row by row, containing `label`.
fn find_header(sheet: &Sheet, label: &str) -> Option<(usize, usize)> {
    let needle = normalize(label);
    if needle.is_empty() {
        return None;
    }
    (0..sheet.height()).find_map(|row| {
        sheet.row(row).iter().enumerate().find_map(|(col, cell)| match cell {
            Cell::Text(text) if normalize(text).contains(&needle) => Some((row, col)),
            _ => None,
        })
    })
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Reads the run of year cells that starts a block.
///
/// Under a header the year row must sit within a few rows; a fixed column
/// uses the first row holding a year. The run stops at the first non-year
/// cell or at the start column of another block.
fn locate_years<'a>(
    sheet: &Sheet,
    indicator: &'a str,
    anchor: Anchor,
    start_cols: &[usize],
) -> Result<Block<'a>, SourceError> {
    let (rows, start_col) = match anchor {
        Anchor::Header(row, col) => (row..(row + YEAR_ROW_SEARCH_DEPTH + 1), col),
        Anchor::Column(col) => (0..sheet.height(), col),
    };

    for row in rows {
        let mut years = Vec::new();
        let mut col = start_col;
        while let Some(year) = year_label(sheet.cell(row, col)) {
            years.push((col, year));
            col += 1;
            if start_cols.contains(&col) {
                break;
            }
        }
        if !years.is_empty() {
            return Ok(Block {
                indicator,
                year_row: row,
                years,
            });
        }
    }
    Err(SourceError::parse(format!(
        "no forecast years found for {indicator}"
    )))
}

#[allow(clippy::cast_possible_truncation)]
fn year_label(cell: &Cell) -> Option<String> {
    let year = match cell {
        Cell::Number(n) if n.fract() == 0.0 => *n as i64,
        Cell::Text(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (1900..=2100).contains(&year).then(|| year.to_string())
}

/// Parses a forecast cell; `None` for blanks and missing markers.
fn parse_value(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Empty => return None,
        Cell::Number(n) => *n,
        Cell::Text(text) => {
            let text = text.trim();
            if text.is_empty() || MISSING_MARKERS.iter().any(|m| text.eq_ignore_ascii_case(m)) {
                return None;
            }
            text.replace(',', ".").parse::<f64>().ok()?
        }
    };
    value
        .is_finite()
        .then(|| (value * 100.0).round() / 100.0)
}

/// Formats a vintage cell as `YYYY-MM-DD`.
///
/// Numeric cells are spreadsheet serial dates; text keeps its first ten
/// characters.
fn vintage_date(cell: &Cell) -> String {
    match cell {
        Cell::Number(serial) => excel_serial_to_date(*serial)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Cell::Text(text) => text.trim().chars().take(10).collect(),
        Cell::Empty => String::new(),
    }
}

/// Serial of 9999-12-31, the last date Excel can represent.
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Converts a 1900-system serial day number to a calendar date.
///
/// Serials outside Excel's date range yield `None`.
#[allow(clippy::cast_possible_truncation)]
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..MAX_EXCEL_SERIAL + 1.0).contains(&serial) {
        return None;
    }
    let days = chrono::TimeDelta::try_days(serial.floor() as i64)?;
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(days)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::xlsx::test_support;

    fn by_header(header: &str) -> ColumnLocator {
        ColumnLocator {
            header: Some(header.to_string()),
            column: None,
        }
    }

    fn by_column(column: &str) -> ColumnLocator {
        ColumnLocator {
            header: None,
            column: Some(column.to_string()),
        }
    }

    fn columns() -> Vec<SpreadsheetColumn> {
        [
            ("GDP_VOL", "Croissance du PIB"),
            ("CPI", "Inflation"),
            ("FISCAL_BAL", "Solde de financement"),
        ]
        .into_iter()
        .map(|(indicator, header)| SpreadsheetColumn {
            indicator: indicator.to_string(),
            locator: by_header(header),
        })
        .collect()
    }

    const LAYOUT: &[&[&str]] = &[
        &["Prévisions économiques"],
        &[],
        &["", "Croissance du PIB", "", "Inflation", "", "Solde de financement", "", "Mise à jour"],
        &["", "2025", "2026", "2025", "2026", "2025", "2026"],
        &["Institution"],
        &["FPB", "1,1", "1.2", "2.346", "-.-", "-4,6", "-5,1", "45915"],
        &["NBB", "1.0", "", "2.2", "1,9", "—", "...", "2025-06-12T00:00:00"],
        &[""],
    ];

    fn config<'a>(
        columns: &'a [SpreadsheetColumn],
        vintage: &'a ColumnLocator,
    ) -> SpreadsheetConfig<'a> {
        SpreadsheetConfig {
            url: "https://example.org/FOR_BE_FR.xlsx",
            sheet: None,
            institution: None,
            vintage: Some(vintage),
            columns,
        }
    }

    fn parse_layout(rows: &[&[&str]]) -> Result<Vec<ForecastRecord>, SourceError> {
        let bytes = test_support::workbook(&[("Prévisions", rows)]);
        let sheet = xlsx::read_sheet(&bytes, None).unwrap();
        let columns = columns();
        let vintage = by_header("mise à jour");
        parse_forecast_sheet(&sheet, &config(&columns, &vintage))
    }

    fn find<'a>(
        forecasts: &'a [ForecastRecord],
        institution: &str,
        indicator: &str,
        year: &str,
    ) -> Option<&'a ForecastRecord> {
        forecasts.iter().find(|f| {
            f.institution == institution && f.indicator == indicator && f.forecast_year == year
        })
    }

    #[test]
    fn extracts_forecasts_by_header_label() {
        let forecasts = parse_layout(LAYOUT).unwrap();

        let gdp = find(&forecasts, "FPB", "GDP_VOL", "2025").unwrap();
        assert_eq!(gdp.value, 1.1);
        assert_eq!(gdp.vintage, "2025-09-15");

        assert_eq!(find(&forecasts, "FPB", "CPI", "2025").unwrap().value, 2.35);
        assert_eq!(find(&forecasts, "FPB", "FISCAL_BAL", "2026").unwrap().value, -5.1);
        assert_eq!(find(&forecasts, "NBB", "CPI", "2026").unwrap().value, 1.9);
        assert_eq!(
            find(&forecasts, "NBB", "GDP_VOL", "2025").unwrap().vintage,
            "2025-06-12"
        );
    }

    #[test]
    fn placeholders_and_blanks_produce_no_record() {
        let forecasts = parse_layout(LAYOUT).unwrap();
        assert!(find(&forecasts, "FPB", "CPI", "2026").is_none());
        assert!(find(&forecasts, "NBB", "GDP_VOL", "2026").is_none());
        assert!(find(&forecasts, "NBB", "FISCAL_BAL", "2025").is_none());
        assert!(find(&forecasts, "NBB", "FISCAL_BAL", "2026").is_none());
        assert_eq!(forecasts.len(), 8);
    }

    #[test]
    fn fixed_columns_match_header_lookup() {
        let bytes = test_support::workbook(&[("Prévisions", LAYOUT)]);
        let sheet = xlsx::read_sheet(&bytes, None).unwrap();
        let columns: Vec<SpreadsheetColumn> = [("GDP_VOL", "B"), ("CPI", "D"), ("FISCAL_BAL", "F")]
            .into_iter()
            .map(|(indicator, column)| SpreadsheetColumn {
                indicator: indicator.to_string(),
                locator: by_column(column),
            })
            .collect();
        let institution = by_column("A");
        let vintage = by_column("H");
        let config = SpreadsheetConfig {
            institution: Some(&institution),
            ..config(&columns, &vintage)
        };

        let by_position = parse_forecast_sheet(&sheet, &config).unwrap();
        assert_eq!(by_position, parse_layout(LAYOUT).unwrap());
    }

    #[test]
    fn missing_vintage_header_keeps_forecasts() {
        let bytes = test_support::workbook(&[("Prévisions", LAYOUT)]);
        let sheet = xlsx::read_sheet(&bytes, None).unwrap();
        let columns = columns();
        let vintage = by_header("Date de publication");
        let forecasts = parse_forecast_sheet(&sheet, &config(&columns, &vintage)).unwrap();
        assert_eq!(forecasts.len(), 8);
        assert!(forecasts.iter().all(|f| f.vintage.is_empty()));
    }

    #[test]
    fn missing_header_is_parse_error() {
        let rows: &[&[&str]] = &[&["", "Croissance du PIB"], &["", "2025"], &["FPB", "1.0"]];
        let err = parse_layout(rows).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("Inflation"), "{err}");
    }

    #[test]
    fn header_without_years_is_parse_error() {
        let rows: &[&[&str]] = &[
            &["", "Croissance du PIB", "Inflation", "Solde de financement"],
            &["FPB", "1.0", "2.0", "-3.0"],
        ];
        let err = parse_layout(rows).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn parses_decimal_comma_and_markers() {
        assert_eq!(parse_value(&Cell::Text("1,25".to_string())), Some(1.25));
        assert_eq!(parse_value(&Cell::Text(" -0,456 ".to_string())), Some(-0.46));
        assert_eq!(parse_value(&Cell::Number(3.14159)), Some(3.14));
        assert_eq!(parse_value(&Cell::Text("-.-".to_string())), None);
        assert_eq!(parse_value(&Cell::Text("\u{2014}".to_string())), None);
        assert_eq!(parse_value(&Cell::Text("n/a".to_string())), None);
        assert_eq!(parse_value(&Cell::Empty), None);
    }

    #[test]
    fn converts_serial_dates() {
        assert_eq!(
            excel_serial_to_date(45_915.0),
            NaiveDate::from_ymd_opt(2025, 9, 15)
        );
        assert_eq!(
            excel_serial_to_date(1.0),
            NaiveDate::from_ymd_opt(1899, 12, 31)
        );
        assert_eq!(excel_serial_to_date(-3.0), None);
        assert_eq!(
            excel_serial_to_date(2_958_465.0),
            NaiveDate::from_ymd_opt(9999, 12, 31)
        );
        assert_eq!(excel_serial_to_date(2_958_466.0), None);
        assert_eq!(excel_serial_to_date(1e300), None);
        assert_eq!(excel_serial_to_date(f64::INFINITY), None);
    }

    #[test]
    fn out_of_range_vintage_serial_is_left_empty() {
        let rows: &[&[&str]] = &[
            &["", "Croissance du PIB", "", "Inflation", "", "Solde de financement", "", "Mise à jour"],
            &["", "2025", "2026", "2025", "2026", "2025", "2026"],
            &["FPB", "1,1", "1.2", "2.346", "1.8", "-4,6", "-5,1", "1e300"],
            &["NBB", "1.0", "1.3", "2.2", "1,9", "-4.2", "-4.8", "45915"],
        ];
        let forecasts = parse_layout(rows).unwrap();
        assert_eq!(forecasts.len(), 12);
        assert!(
            forecasts
                .iter()
                .filter(|f| f.institution == "FPB")
                .all(|f| f.vintage.is_empty())
        );
        assert_eq!(find(&forecasts, "NBB", "CPI", "2025").unwrap().vintage, "2025-09-15");
    }

    #[tokio::test]
    async fn fetches_workbook_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FOR_BE_FR.xlsx"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(test_support::workbook(&[("Prévisions", LAYOUT)])),
            )
            .mount(&server)
            .await;

        let url = format!("{}/FOR_BE_FR.xlsx", server.uri());
        let columns = columns();
        let vintage = by_header("Mise à jour");
        let config = SpreadsheetConfig {
            url: &url,
            ..config(&columns, &vintage)
        };
        let forecasts = fetch(&reqwest::Client::new(), &RetryPolicy::default(), &config)
            .await
            .unwrap();
        assert_eq!(forecasts.len(), 8);
    }
}
