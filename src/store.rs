use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::forecast::types::ForecastTable;
use crate::monitoring::compare::{ObservationLog, RealObservation};

/// A stored forecast run.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub id: i64,
    pub user_id: String,
    pub model_name: String,
    pub source_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub table: ForecastTable,
}

pub struct ForecastStore {
    conn: Connection,
}

impl ForecastStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open forecast database: {}", db_path))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS forecasts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                model_name TEXT NOT NULL,
                source_filename TEXT,
                created_at TIMESTAMP NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS real_observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                value REAL NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE(user_id, date)
            );

            CREATE INDEX IF NOT EXISTS idx_forecasts_user_id ON forecasts(user_id);
            CREATE INDEX IF NOT EXISTS idx_real_observations_user_id ON real_observations(user_id);
            "#,
        )?;

        Ok(Self { conn })
    }

    /// Store a forecast table; returns the new record id.
    pub fn save_forecast(
        &self,
        user_id: &str,
        model_name: &str,
        source_filename: Option<&str>,
        table: &ForecastTable,
    ) -> Result<i64> {
        let payload = serde_json::to_string(table).context("Failed to serialize forecast")?;

        self.conn.execute(
            "INSERT INTO forecasts (user_id, model_name, source_filename, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                model_name,
                source_filename,
                Utc::now().to_rfc3339(),
                payload
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recently saved forecast for a user.
    pub fn load_latest_forecast(&self, user_id: &str) -> Result<Option<ForecastTable>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM forecasts WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).context("Stored forecast payload is corrupt"))
            .transpose()
    }

    /// Every forecast a user saved, newest first.
    pub fn forecast_history(&self, user_id: &str) -> Result<Vec<ForecastRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, model_name, source_filename, created_at, payload
             FROM forecasts
             WHERE user_id = ?1
             ORDER BY id DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, user_id, model_name, source_filename, created_at, payload) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .with_context(|| format!("Bad created_at on forecast {}", id))?
                .with_timezone(&Utc);
            let table = serde_json::from_str(&payload)
                .with_context(|| format!("Stored forecast {} is corrupt", id))?;
            records.push(ForecastRecord {
                id,
                user_id,
                model_name,
                source_filename,
                created_at,
                table,
            });
        }
        Ok(records)
    }

    pub fn count_forecasts(&self, user_id: &str) -> Result<usize> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM forecasts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Record an observation. Returns false when the user already has one for that date.
    pub fn add_real_observation(&self, user_id: &str, date: NaiveDate, value: f64) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO real_observations (user_id, date, value, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                date.format("%Y-%m-%d").to_string(),
                value,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// A user's observations in entry order.
    pub fn real_observations(&self, user_id: &str) -> Result<ObservationLog> {
        let mut stmt = self.conn.prepare(
            "SELECT date, value FROM real_observations WHERE user_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut observations = Vec::new();
        for row in rows {
            let (date, value) = row?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Bad observation date: {}", date))?;
            observations.push(RealObservation { date, value });
        }
        Ok(observations.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::types::ForecastRow;

    fn table(mean: f64) -> ForecastTable {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ForecastTable::new(vec![ForecastRow::new(ts, mean, mean - 1.0, mean + 1.0)])
    }

    #[test]
    fn test_latest_forecast_wins() {
        let store = ForecastStore::open(":memory:").unwrap();
        store
            .save_forecast("alice", "amazon/chronos-t5-tiny", Some("sales.csv"), &table(1.0))
            .unwrap();
        let id = store.save_forecast("alice", "lag-llama", None, &table(2.0)).unwrap();
        store.save_forecast("bob", "lag-llama", None, &table(3.0)).unwrap();

        assert_eq!(store.load_latest_forecast("alice").unwrap(), Some(table(2.0)));
        assert_eq!(store.count_forecasts("alice").unwrap(), 2);

        let history = store.forecast_history("alice").unwrap();
        assert_eq!(history[0].id, id);
        assert_eq!(history[1].source_filename.as_deref(), Some("sales.csv"));
    }

    #[test]
    fn test_no_forecast_for_unknown_user() {
        let store = ForecastStore::open(":memory:").unwrap();
        assert_eq!(store.load_latest_forecast("nobody").unwrap(), None);
    }

    #[test]
    fn test_observations_deduplicate_by_date() {
        let store = ForecastStore::open(":memory:").unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        assert!(store.add_real_observation("alice", day, 10.0).unwrap());
        assert!(!store.add_real_observation("alice", day, 99.0).unwrap());
        assert!(store.add_real_observation("bob", day, 5.0).unwrap());

        let log = store.real_observations("alice").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.observations()[0].value, 10.0);
    }
}
