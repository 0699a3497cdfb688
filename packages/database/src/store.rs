//! `DuckDB` observation store.
//!
//! One database file holds four tables:
//!
//! - `indicators`: metadata for every indicator ever ingested
//! - `observations`: one row per `(indicator_code, period)`
//! - `forecasts`: one row per `(institution, indicator, forecast_year, vintage)`
//! - `fetch_log`: append-only record of ingestion attempts
//!
//! Every upsert runs inside a single transaction, so a crash mid-batch
//! leaves the previous values intact.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr as _;

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{AccessMode, Config, Connection, params};
use macro_db_database_models::{
    FetchLogEntry, FetchStatus, ForecastRow, LatestObservation, ObservationRow,
};
use macro_db_indicator_models::{
    Frequency, ForecastRecord, IndicatorMeta, ObservationRecord, SourceType, Unit,
};

use crate::DbError;

/// Columns selected for an [`ObservationRow`], in [`map_observation_row`]
/// order. Indicators missing from the `indicators` table fall back to their
/// code as display name.
const OBSERVATION_COLUMNS: &str = "o.indicator_code,
    COALESCE(i.name, o.indicator_code),
    o.period,
    o.value,
    o.obs_status,
    COALESCE(i.unit, ''),
    COALESCE(i.source_agency, ''),
    COALESCE(i.category, 'Other'),
    o.last_updated";

/// Handle to the macro database.
///
/// Reads take `&self`; writes take `&mut self`. The connection is closed
/// when the handle is dropped.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Opens (or creates) the database at `path` for reading and writing,
    /// creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the directory, connection, or schema creation
    /// fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        create_schema(&conn)?;

        log::debug!("Opened store at {}", path.display());
        Ok(Self { conn })
    }

    /// Opens an existing database without write access.
    ///
    /// Any number of read-only handles may coexist with each other, which is
    /// what the export and inspection commands use.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self, DbError> {
        if !path.exists() {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database not found at {}", path.display()),
            )));
        }

        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        Ok(Self { conn })
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts or updates the metadata row for one indicator.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the upsert fails.
    pub fn upsert_indicator(&mut self, meta: &IndicatorMeta) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO indicators (
                code, name, frequency, unit, source_agency, source_type,
                description, category, api_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (code) DO UPDATE SET
                name = EXCLUDED.name,
                frequency = EXCLUDED.frequency,
                unit = EXCLUDED.unit,
                source_agency = EXCLUDED.source_agency,
                source_type = EXCLUDED.source_type,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                api_url = EXCLUDED.api_url",
            params![
                meta.code,
                meta.display_name,
                meta.frequency.as_ref(),
                meta.unit.as_str(),
                meta.source_agency,
                meta.source_type.as_ref(),
                meta.description,
                meta.category,
                meta.fetch_url,
            ],
        )?;
        Ok(())
    }

    /// Inserts or overwrites observations for one indicator.
    ///
    /// Each `(indicator_code, period)` key ends up with exactly one row
    /// holding the latest value and a refreshed `last_updated`. Duplicate
    /// periods inside `records` collapse to their last occurrence. Calling
    /// this repeatedly with the same input leaves the same rows and values.
    ///
    /// Returns the number of distinct periods written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the transaction fails; no rows are changed in
    /// that case.
    pub fn upsert_observations(
        &mut self,
        indicator_code: &str,
        records: &[ObservationRecord],
    ) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut last_seen: BTreeMap<&str, &ObservationRecord> = BTreeMap::new();
        for record in records {
            last_seen.insert(&record.period, record);
        }

        if last_seen.len() < records.len() {
            log::info!(
                "{indicator_code}: deduplicated batch {} -> {} rows",
                records.len(),
                last_seen.len(),
            );
        }

        let now = timestamp_now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO observations (indicator_code, period, value, obs_status, last_updated)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (indicator_code, period) DO UPDATE SET
                    value = EXCLUDED.value,
                    obs_status = EXCLUDED.obs_status,
                    last_updated = EXCLUDED.last_updated",
            )?;

            for record in last_seen.values() {
                stmt.execute(params![
                    indicator_code,
                    record.period,
                    record.value,
                    record.obs_status.as_deref(),
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(last_seen.len() as u64)
    }

    /// Inserts or overwrites forecasts, keyed on
    /// `(institution, indicator, forecast_year, vintage)`.
    ///
    /// Returns the number of distinct keys written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the transaction fails.
    pub fn upsert_forecasts(&mut self, records: &[ForecastRecord]) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut last_seen: BTreeMap<(&str, &str, &str, &str), &ForecastRecord> = BTreeMap::new();
        for record in records {
            last_seen.insert(
                (
                    &record.institution,
                    &record.indicator,
                    &record.forecast_year,
                    &record.vintage,
                ),
                record,
            );
        }

        let now = timestamp_now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO forecasts (institution, indicator, forecast_year, vintage, value, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (institution, indicator, forecast_year, vintage) DO UPDATE SET
                    value = EXCLUDED.value,
                    last_updated = EXCLUDED.last_updated",
            )?;

            for record in last_seen.values() {
                stmt.execute(params![
                    record.institution,
                    record.indicator,
                    record.forecast_year,
                    record.vintage,
                    record.value,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(last_seen.len() as u64)
    }

    /// Appends one entry to the fetch log.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the insert fails.
    pub fn record_fetch_attempt(&mut self, entry: &FetchLogEntry) -> Result<(), DbError> {
        let count = i64::try_from(entry.observation_count).unwrap_or(i64::MAX);
        self.conn.execute(
            "INSERT INTO fetch_log (indicator_code, fetched_at, status, rows_upserted, message)
             VALUES (?, ?, ?, ?, ?)",
            params![
                entry.indicator_code,
                format_timestamp(&entry.timestamp),
                entry.status.as_ref(),
                count,
                entry.error_message.as_deref(),
            ],
        )?;
        Ok(())
    }

    /// Returns every observation, sorted by indicator code then period.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn read_all(&self) -> Result<Vec<ObservationRow>, DbError> {
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS}
             FROM observations o
             LEFT JOIN indicators i ON i.code = o.indicator_code
             ORDER BY o.indicator_code, o.period"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_observation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns the observations of one indicator, sorted by period.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn read_by_indicator(&self, code: &str) -> Result<Vec<ObservationRow>, DbError> {
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS}
             FROM observations o
             LEFT JOIN indicators i ON i.code = o.indicator_code
             WHERE o.indicator_code = ?
             ORDER BY o.period"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([code], map_observation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns the latest observation per indicator together with the value
    /// of the period before it, sorted by indicator code.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn latest_observations(&self) -> Result<Vec<LatestObservation>, DbError> {
        let sql = format!(
            "SELECT * EXCLUDE (rn) FROM (
                SELECT {OBSERVATION_COLUMNS},
                    LAG(o.value) OVER (PARTITION BY o.indicator_code ORDER BY o.period) AS previous_value,
                    ROW_NUMBER() OVER (PARTITION BY o.indicator_code ORDER BY o.period DESC) AS rn
                FROM observations o
                LEFT JOIN indicators i ON i.code = o.indicator_code
             )
             WHERE rn = 1
             ORDER BY 1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LatestObservation {
                    row: map_observation_row(row)?,
                    previous_value: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns every stored forecast, sorted by indicator, year,
    /// institution, then vintage.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn read_forecasts(&self) -> Result<Vec<ForecastRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT institution, indicator, forecast_year, value, vintage, last_updated
             FROM forecasts
             ORDER BY indicator, forecast_year, institution, vintage",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ForecastRow {
                    institution: row.get(0)?,
                    indicator: row.get(1)?,
                    forecast_year: row.get(2)?,
                    value: row.get(3)?,
                    vintage: row.get(4)?,
                    last_updated: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns the metadata of every stored indicator, sorted by code.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a stored enum value is
    /// unrecognized.
    pub fn read_indicators(&self) -> Result<Vec<IndicatorMeta>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, frequency, unit, source_agency, source_type,
                    COALESCE(description, ''), category, COALESCE(api_url, '')
             FROM indicators
             ORDER BY code",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(
                    code,
                    display_name,
                    frequency,
                    unit,
                    source_agency,
                    source_type,
                    description,
                    category,
                    fetch_url,
                )| {
                    Ok::<_, DbError>(IndicatorMeta {
                        frequency: Frequency::from_str(&frequency).map_err(|e| {
                            DbError::Conversion {
                                message: format!("{code}: frequency {frequency:?}: {e}"),
                            }
                        })?,
                        source_type: SourceType::from_str(&source_type).map_err(|e| {
                            DbError::Conversion {
                                message: format!("{code}: source type {source_type:?}: {e}"),
                            }
                        })?,
                        unit: Unit::from(unit),
                        code,
                        display_name,
                        source_agency,
                        description,
                        category,
                        fetch_url,
                    })
                },
            )
            .collect()
    }

    /// Returns the `limit` most recent fetch-log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a stored row cannot be
    /// converted.
    pub fn read_log(&self, limit: usize) -> Result<Vec<FetchLogEntry>, DbError> {
        let sql = format!(
            "SELECT indicator_code, fetched_at, status, rows_upserted, message
             FROM fetch_log
             ORDER BY id DESC
             LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(indicator_code, fetched_at, status, rows, message)| {
                let timestamp = DateTime::parse_from_rfc3339(&fetched_at)
                    .map_err(|e| DbError::Conversion {
                        message: format!("fetch_log timestamp {fetched_at:?}: {e}"),
                    })?
                    .with_timezone(&Utc);
                let status =
                    FetchStatus::from_str(&status).map_err(|e| DbError::Conversion {
                        message: format!("fetch_log status {status:?}: {e}"),
                    })?;

                Ok::<_, DbError>(FetchLogEntry {
                    indicator_code,
                    timestamp,
                    status,
                    observation_count: u64::try_from(rows).unwrap_or(0),
                    error_message: message,
                })
            })
            .collect()
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS indicators (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            frequency TEXT NOT NULL,
            unit TEXT NOT NULL,
            source_agency TEXT NOT NULL,
            source_type TEXT NOT NULL,
            description TEXT,
            category TEXT NOT NULL,
            api_url TEXT
        );

        CREATE TABLE IF NOT EXISTS observations (
            indicator_code TEXT NOT NULL,
            period TEXT NOT NULL,
            value DOUBLE NOT NULL,
            obs_status TEXT,
            last_updated TEXT NOT NULL,
            PRIMARY KEY (indicator_code, period)
        );

        CREATE TABLE IF NOT EXISTS forecasts (
            institution TEXT NOT NULL,
            indicator TEXT NOT NULL,
            forecast_year TEXT NOT NULL,
            vintage TEXT NOT NULL,
            value DOUBLE NOT NULL,
            last_updated TEXT NOT NULL,
            PRIMARY KEY (institution, indicator, forecast_year, vintage)
        );

        CREATE SEQUENCE IF NOT EXISTS fetch_log_id_seq;

        CREATE TABLE IF NOT EXISTS fetch_log (
            id BIGINT PRIMARY KEY DEFAULT nextval('fetch_log_id_seq'),
            indicator_code TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            status TEXT NOT NULL,
            rows_upserted BIGINT NOT NULL,
            message TEXT
        );",
    )?;

    Ok(())
}

fn map_observation_row(row: &duckdb::Row<'_>) -> duckdb::Result<ObservationRow> {
    Ok(ObservationRow {
        indicator_code: row.get(0)?,
        display_name: row.get(1)?,
        period: row.get(2)?,
        value: row.get(3)?,
        obs_status: row.get(4)?,
        unit: Unit::from(row.get::<_, String>(5)?),
        source_agency: row.get(6)?,
        category: row.get(7)?,
        last_updated: row.get(8)?,
    })
}

fn timestamp_now() -> String {
    format_timestamp(&Utc::now())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
