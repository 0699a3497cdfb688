//! Structured-record export: one JSON entry per indicator.

use std::collections::BTreeMap;

use macro_db_database_models::ObservationRow;
use macro_db_indicator_models::{Frequency, IndicatorMeta, Unit};
use serde::Serialize;

use crate::ExportError;

/// One indicator with its metadata and ordered observations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorRecord {
    /// Human-readable name.
    pub display_name: String,
    /// Sampling frequency; absent for indicators with no stored metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    /// Unit of measure.
    pub unit: Unit,
    /// Publishing agency.
    pub source_agency: String,
    /// Summary-table grouping.
    pub category: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Most recent write to any of the indicator's observations.
    pub last_updated: String,
    /// Observations in period order.
    pub observations: Vec<PeriodValue>,
}

/// A single `(period, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodValue {
    /// Period label.
    pub period: String,
    /// Observed value.
    pub value: f64,
    /// Source status flag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Groups observation rows into one record per indicator code.
///
/// Metadata comes from `indicators` where present and from the rows
/// otherwise. Indicators without observations are left out.
#[must_use]
pub fn group_records(
    indicators: &[IndicatorMeta],
    rows: &[ObservationRow],
) -> BTreeMap<String, IndicatorRecord> {
    let metas: BTreeMap<&str, &IndicatorMeta> =
        indicators.iter().map(|m| (m.code.as_str(), m)).collect();

    let mut records: BTreeMap<String, IndicatorRecord> = BTreeMap::new();
    for row in rows {
        let record = records
            .entry(row.indicator_code.clone())
            .or_insert_with(|| {
                let meta = metas.get(row.indicator_code.as_str());
                IndicatorRecord {
                    display_name: row.display_name.clone(),
                    frequency: meta.map(|m| m.frequency),
                    unit: row.unit.clone(),
                    source_agency: row.source_agency.clone(),
                    category: row.category.clone(),
                    description: meta.map(|m| m.description.clone()).unwrap_or_default(),
                    last_updated: String::new(),
                    observations: Vec::new(),
                }
            });
        if row.last_updated > record.last_updated {
            record.last_updated.clone_from(&row.last_updated);
        }
        record.observations.push(PeriodValue {
            period: row.period.clone(),
            value: row.value,
            status: row.obs_status.clone(),
        });
    }

    for record in records.values_mut() {
        record.observations.sort_by(|a, b| a.period.cmp(&b.period));
    }
    records
}

/// Renders the grouped records as pretty-printed JSON with a trailing
/// newline.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn observations_json(
    indicators: &[IndicatorMeta],
    rows: &[ObservationRow],
) -> Result<String, ExportError> {
    let mut json = serde_json::to_string_pretty(&group_records(indicators, rows))?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::test_support::sample_store;

    #[test]
    fn one_entry_per_indicator_with_ordered_observations() {
        let store = sample_store();
        let json = observations_json(
            &store.read_indicators().unwrap(),
            &store.read_all().unwrap(),
        )
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.keys().collect::<Vec<_>>(), ["A", "B"]);

        let a = &object["A"];
        assert_eq!(a["displayName"], "Alpha");
        assert_eq!(a["frequency"], "A");
        assert_eq!(a["unit"], "percent_yy");
        assert_eq!(a["category"], "GDP");
        assert!(a.get("description").is_none());
        let periods: Vec<&str> = a["observations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["period"].as_str().unwrap())
            .collect();
        assert_eq!(periods, ["2020", "2021"]);
        assert_eq!(a["observations"][0]["value"], -0.25);
        assert_eq!(object["B"]["observations"][0]["value"], 100.0);
    }

    #[test]
    fn forecast_only_indicators_are_left_out() {
        let store = sample_store();
        let records = group_records(&store.read_indicators().unwrap(), &store.read_all().unwrap());
        assert!(!records.contains_key("GDP_VOL"));
    }

    #[test]
    fn rows_without_metadata_keep_their_own_fields() {
        let row = ObservationRow {
            indicator_code: "ORPHAN".to_string(),
            display_name: "ORPHAN".to_string(),
            period: "2024-Q1".to_string(),
            value: 2.5,
            obs_status: Some("P".to_string()),
            unit: Unit::Level,
            source_agency: String::new(),
            category: "Other".to_string(),
            last_updated: "2025-01-01T00:00:00Z".to_string(),
        };
        let records = group_records(&[], std::slice::from_ref(&row));
        let record = &records["ORPHAN"];
        assert_eq!(record.frequency, None);
        assert_eq!(record.last_updated, row.last_updated);
        assert_eq!(record.observations[0].status.as_deref(), Some("P"));
    }

    #[test]
    fn empty_store_is_an_empty_object() {
        assert_eq!(observations_json(&[], &[]).unwrap(), "{}\n");
    }
}
