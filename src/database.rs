use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::models::{
    Measurement, MeasurementInput, Setting, DEFAULT_HEIGHT_CM, DEFAULT_TARGET_WEIGHT, HEIGHT_KEY,
    TARGET_WEIGHT_KEY,
};
use crate::stats::{StatsCalculator, StatsSummary};

const MEASUREMENT_COLUMNS: &str = "id, date, weight, body_fat, created_at, updated_at";

const UPSERT_MEASUREMENT: &str = r#"
    INSERT INTO measurements (date, weight, body_fat, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?4)
    ON CONFLICT(date) DO UPDATE SET
        weight = excluded.weight,
        body_fat = excluded.body_fat,
        updated_at = excluded.updated_at
"#;

/// File-backed store for measurements and settings.
///
/// No connection is held between calls: every operation opens its own
/// connection, runs inside a transaction where it writes, and the handle is
/// closed when it goes out of scope, on success and error paths alike.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database at the specified path.
    ///
    /// This is the one place where a storage failure is meant to stop the
    /// caller: nothing else works without a usable store.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DatabaseError::ConnectionFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        let db = Self { path };
        db.init_schema()?;

        info!(path = %db.path.display(), "Database ready");
        Ok(db)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = Connection::open(&self.path).map_err(|e| DatabaseError::ConnectionFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Initialize database schema with tables, indexes and default settings
    fn init_schema(&self) -> Result<(), DatabaseError> {
        let mut conn = self.connect()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        let tx = conn.transaction()?;

        tx.execute(
            r#"
            CREATE TABLE IF NOT EXISTS measurements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL UNIQUE,
                weight REAL NOT NULL,
                body_fat REAL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        tx.execute(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_measurements_date ON measurements (date)",
            [],
        )?;

        // Seed defaults only where the key has never been written
        let now = Utc::now();
        for (key, value) in [
            (TARGET_WEIGHT_KEY, DEFAULT_TARGET_WEIGHT),
            (HEIGHT_KEY, DEFAULT_HEIGHT_CM),
        ] {
            tx.execute(
                "INSERT OR IGNORE INTO settings (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![key, value, now],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Insert a measurement, or replace the one already stored for that date.
    ///
    /// A single `INSERT ... ON CONFLICT` statement keeps the write atomic. The
    /// existing row keeps its id and `created_at`.
    pub fn upsert(
        &self,
        date: NaiveDate,
        weight: f64,
        body_fat: Option<f64>,
    ) -> Result<Measurement, DatabaseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        Self::upsert_in(&tx, date, weight, body_fat)?;
        let stored = Self::select_by_date(&tx, date)?.ok_or_else(|| DatabaseError::NotFound {
            table: "measurements".to_string(),
            id: date.to_string(),
        })?;

        tx.commit()?;
        debug!(%date, weight, ?body_fat, id = stored.id, "Measurement upserted");
        Ok(stored)
    }

    /// Upsert a batch of measurements in one transaction, returning the number written
    pub fn upsert_many(&self, inputs: &[MeasurementInput]) -> Result<usize, DatabaseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        for input in inputs {
            Self::upsert_in(&tx, input.date, input.weight, input.body_fat)?;
        }

        tx.commit()?;
        debug!(count = inputs.len(), "Measurements upserted in batch");
        Ok(inputs.len())
    }

    fn upsert_in(
        tx: &Transaction,
        date: NaiveDate,
        weight: f64,
        body_fat: Option<f64>,
    ) -> Result<(), DatabaseError> {
        tx.execute(UPSERT_MEASUREMENT, params![date, weight, body_fat, Utc::now()])?;
        Ok(())
    }

    /// Exact lookup by date
    pub fn get_by_date(&self, date: NaiveDate) -> Result<Option<Measurement>, DatabaseError> {
        let conn = self.connect()?;
        Self::select_by_date(&conn, date)
    }

    fn select_by_date(
        conn: &Connection,
        date: NaiveDate,
    ) -> Result<Option<Measurement>, DatabaseError> {
        let measurement = conn
            .query_row(
                &format!("SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE date = ?1"),
                params![date],
                measurement_from_row,
            )
            .optional()?;
        Ok(measurement)
    }

    /// Exact lookup by surrogate id
    pub fn get_by_id(&self, id: i64) -> Result<Option<Measurement>, DatabaseError> {
        let conn = self.connect()?;
        let measurement = conn
            .query_row(
                &format!("SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE id = ?1"),
                params![id],
                measurement_from_row,
            )
            .optional()?;
        Ok(measurement)
    }

    /// The `n` most recently dated measurements, returned oldest first.
    ///
    /// `None` returns the whole history. This is a row-count window; see
    /// [`Database::get_range`] for a calendar window.
    pub fn get_recent(&self, n: Option<usize>) -> Result<Vec<Measurement>, DatabaseError> {
        // SQLite treats a negative LIMIT as "no limit"; larger counts clamp
        let limit = n
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements ORDER BY date DESC LIMIT ?1"
        ))?;
        let mut measurements = stmt
            .query_map(params![limit], measurement_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        measurements.reverse();
        Ok(measurements)
    }

    /// Measurements dated within `start..=end`, oldest first
    pub fn get_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Measurement>, DatabaseError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE date BETWEEN ?1 AND ?2 ORDER BY date ASC"
        ))?;
        let measurements = stmt
            .query_map(params![start, end], measurement_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(measurements)
    }

    /// Every date that currently has a measurement
    pub fn existing_dates(&self) -> Result<BTreeSet<NaiveDate>, DatabaseError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT date FROM measurements")?;
        let dates = stmt
            .query_map([], |row| row.get::<_, NaiveDate>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(dates)
    }

    /// Overwrite weight and body fat of the record with `id`.
    ///
    /// Returns `Ok(false)` when no such record exists.
    pub fn update(
        &self,
        id: i64,
        weight: f64,
        body_fat: Option<f64>,
    ) -> Result<bool, DatabaseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE measurements SET weight = ?1, body_fat = ?2, updated_at = ?3 WHERE id = ?4",
            params![weight, body_fat, Utc::now(), id],
        )?;
        tx.commit()?;

        debug!(id, changed, "Measurement update");
        Ok(changed > 0)
    }

    /// Same as [`Database::update`], addressed by date
    pub fn update_by_date(
        &self,
        date: NaiveDate,
        weight: f64,
        body_fat: Option<f64>,
    ) -> Result<bool, DatabaseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE measurements SET weight = ?1, body_fat = ?2, updated_at = ?3 WHERE date = ?4",
            params![weight, body_fat, Utc::now(), date],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Remove the record with `id`; `Ok(false)` if it did not exist
    pub fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM measurements WHERE id = ?1", params![id])?;
        tx.commit()?;

        debug!(id, removed, "Measurement delete");
        Ok(removed > 0)
    }

    /// Total number of stored measurements
    pub fn count(&self) -> Result<usize, DatabaseError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM measurements", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Summary statistics over the `window_size` most recent measurements.
    ///
    /// `Ok(None)` when there is nothing to summarize.
    pub fn compute_stats(&self, window_size: usize) -> Result<Option<StatsSummary>, DatabaseError> {
        let window = self.get_recent(Some(window_size))?;
        Ok(StatsCalculator::summarize(&window))
    }

    /// Stored value for `key`, if it was ever set
    pub fn get_setting(&self, key: &str) -> Result<Option<f64>, DatabaseError> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or update a setting
    pub fn set_setting(&self, key: &str, value: f64) -> Result<(), DatabaseError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO settings (key, value, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now()],
        )?;
        tx.commit()?;

        debug!(key, value, "Setting stored");
        Ok(())
    }

    pub fn list_settings(&self) -> Result<Vec<Setting>, DatabaseError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT key, value, created_at, updated_at FROM settings ORDER BY key")?;
        let settings = stmt
            .query_map([], |row| {
                Ok(Setting {
                    key: row.get("key")?,
                    value: row.get("value")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(settings)
    }

    /// Target weight, falling back to the default when unset
    pub fn target_weight(&self) -> Result<f64, DatabaseError> {
        Ok(self
            .get_setting(TARGET_WEIGHT_KEY)?
            .unwrap_or(DEFAULT_TARGET_WEIGHT))
    }

    /// Height in centimeters, falling back to the default when unset
    pub fn height(&self) -> Result<f64, DatabaseError> {
        Ok(self.get_setting(HEIGHT_KEY)?.unwrap_or(DEFAULT_HEIGHT_CM))
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats, DatabaseError> {
        let conn = self.connect()?;

        let (count, first_date, last_date): (i64, Option<NaiveDate>, Option<NaiveDate>) = conn
            .query_row(
                "SELECT COUNT(*), MIN(date), MAX(date) FROM measurements",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let settings_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            path: self.path.clone(),
            measurement_count: count as usize,
            settings_count: settings_count as usize,
            first_date,
            last_date,
        })
    }
}

/// Helper to convert a database row to a Measurement
fn measurement_from_row(row: &Row) -> rusqlite::Result<Measurement> {
    Ok(Measurement {
        id: row.get("id")?,
        date: row.get("date")?,
        weight: row.get("weight")?,
        body_fat: row.get("body_fat")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub path: PathBuf,
    pub measurement_count: usize,
    pub settings_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}
