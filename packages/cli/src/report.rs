//! Plain-text tables printed by the inspection subcommands.

use macro_db_database_models::{FetchLogEntry, LatestObservation, ObservationRow};
use macro_db_export::format_value;
use macro_db_export::summary::Trend;
use macro_db_source::IndicatorDefinition;

/// Latest value per indicator with its trend arrow.
#[must_use]
pub fn latest_table(latest: &[LatestObservation]) -> String {
    if latest.is_empty() {
        return "No observations stored\n".to_string();
    }

    let mut out = format!(
        "{:<28} {:<10} {:>12} {:<16} {}\n{}\n",
        "INDICATOR",
        "PERIOD",
        "VALUE",
        "UNIT",
        "TREND",
        "-".repeat(76)
    );
    for entry in latest {
        let row = &entry.row;
        out.push_str(&format!(
            "{:<28} {:<10} {:>12.2} {:<16} {}\n",
            row.indicator_code,
            row.period,
            row.value,
            row.unit.as_str(),
            Trend::between(row.value, entry.previous_value).arrow()
        ));
    }
    out
}

/// Observations grouped under one heading per indicator.
///
/// `rows` must already be sorted by indicator code.
#[must_use]
pub fn dump(rows: &[ObservationRow]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for row in rows {
        if current != Some(row.indicator_code.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!(
                "== {} ({}, {}) ==\n",
                row.indicator_code,
                row.display_name,
                row.unit.as_str()
            ));
            current = Some(row.indicator_code.as_str());
        }
        out.push_str(&format!(
            "{:<10} {:>14}{}\n",
            row.period,
            format_value(row.value),
            row.obs_status
                .as_deref()
                .map_or_else(String::new, |status| format!("  [{status}]"))
        ));
    }
    out
}

/// Fetch-log entries in the order given.
#[must_use]
pub fn history_table(entries: &[FetchLogEntry]) -> String {
    if entries.is_empty() {
        return "No fetch attempts recorded\n".to_string();
    }

    let mut out = format!(
        "{:<20} {:<28} {:<8} {:>6}  {}\n{}\n",
        "TIMESTAMP",
        "INDICATOR",
        "STATUS",
        "ROWS",
        "ERROR",
        "-".repeat(76)
    );
    for entry in entries {
        out.push_str(&format!(
            "{:<20} {:<28} {:<8} {:>6}  {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.indicator_code,
            entry.status.as_ref(),
            entry.observation_count,
            entry.error_message.as_deref().unwrap_or("")
        ));
    }
    out
}

/// Configured indicators in config order.
#[must_use]
pub fn indicators_table(indicators: &[IndicatorDefinition]) -> String {
    let mut out = format!(
        "{:<28} {:<4} {:<12} {:<10} NAME\n{}\n",
        "CODE",
        "FREQ",
        "SOURCE",
        "AGENCY",
        "-".repeat(76)
    );
    for indicator in indicators {
        out.push_str(&format!(
            "{:<28} {:<4} {:<12} {:<10} {}\n",
            indicator.code,
            indicator.frequency.as_ref(),
            indicator.source_type().as_ref(),
            indicator.source_agency,
            indicator.name
        ));
    }
    out
}
