use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::dates::{format_date, parse_date};
use crate::error::StoreError;
use crate::models::{
    CachedStats, Confidence, CycleEvent, CycleStatsSummary, DEFAULT_CYCLE_LENGTH,
    DEFAULT_EVENT_DURATION,
};
use crate::store::PeriodLogStore;

/// SQLite-backed period log
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable {
                    reason: format!("cannot create {}: {}", parent.display(), e),
                })?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        info!(path = %db_path.as_ref().display(), "Opened period log database");
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS period_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                notes TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, start_date)
            );

            CREATE TABLE IF NOT EXISTS cycle_stats (
                user_id TEXT PRIMARY KEY,
                avg_cycle_length TEXT NOT NULL,
                avg_period_length TEXT NOT NULL,
                last_period_start TEXT,
                predicted_next_period TEXT,
                confidence TEXT NOT NULL,
                cycle_samples INTEGER NOT NULL DEFAULT 0,
                duration_samples INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_period_logs_user ON period_logs (user_id);
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Helper to convert database row to CycleEvent struct.
    ///
    /// Date and note columns are read leniently: bytes that are not valid
    /// UTF-8 or non-text values come back as unparseable strings so the
    /// calculator drops that one record instead of the whole query failing.
    fn event_from_row(row: &Row) -> rusqlite::Result<CycleEvent> {
        Ok(CycleEvent {
            user_id: row.get("user_id")?,
            start_date: Self::lenient_text(row, "start_date")?.unwrap_or_default(),
            end_date: Self::lenient_text(row, "end_date")?,
            notes: Self::lenient_text(row, "notes")?,
        })
    }

    fn lenient_text(row: &Row, column: &str) -> rusqlite::Result<Option<String>> {
        let text = match row.get_ref(column)? {
            ValueRef::Null => None,
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
            ValueRef::Integer(value) => Some(value.to_string()),
            ValueRef::Real(value) => Some(value.to_string()),
        };
        Ok(text)
    }

    fn cached_stats_from_row(row: &Row) -> rusqlite::Result<CachedStats> {
        let decimal_or = |text: Option<String>, fallback: u32| {
            text.and_then(|s| s.parse::<Decimal>().ok())
                .unwrap_or_else(|| Decimal::from(fallback))
        };

        let summary = CycleStatsSummary {
            avg_cycle_length: decimal_or(row.get("avg_cycle_length")?, DEFAULT_CYCLE_LENGTH),
            avg_event_duration: decimal_or(row.get("avg_period_length")?, DEFAULT_EVENT_DURATION),
            last_start: row
                .get::<_, Option<String>>("last_period_start")?
                .as_deref()
                .and_then(parse_date),
            predicted_next_start: row
                .get::<_, Option<String>>("predicted_next_period")?
                .as_deref()
                .and_then(parse_date),
            confidence: row
                .get::<_, String>("confidence")?
                .parse::<Confidence>()
                .unwrap_or(Confidence::None),
            cycle_samples: row.get::<_, i64>("cycle_samples")?.max(0) as usize,
            duration_samples: row.get::<_, i64>("duration_samples")?.max(0) as usize,
        };

        Ok(CachedStats {
            user_id: row.get("user_id")?,
            summary,
            updated_at: row.get::<_, DateTime<Utc>>("updated_at")?,
        })
    }
}

impl PeriodLogStore for SqliteStore {
    fn list_events(&self, user_id: &str) -> Result<Vec<CycleEvent>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, start_date, end_date, notes
            FROM period_logs
            WHERE user_id = ?1
            ORDER BY start_date DESC
            "#,
        )?;

        let events = stmt
            .query_map(params![user_id], Self::event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(user_id, count = events.len(), "Loaded period history");
        Ok(events)
    }

    fn insert_event(&self, event: &CycleEvent) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM period_logs WHERE user_id = ?1 AND start_date = ?2",
            params![event.user_id, event.start_date],
            |row| row.get(0),
        )?;
        if count > 0 {
            return Err(StoreError::Duplicate {
                user_id: event.user_id.clone(),
                start_date: event.start_date.clone(),
            });
        }

        tx.execute(
            r#"
            INSERT INTO period_logs (user_id, start_date, end_date, notes)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![event.user_id, event.start_date, event.end_date, event.notes],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn set_end_date(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, StoreError> {
        let changed = self.lock().execute(
            "UPDATE period_logs SET end_date = ?1 WHERE user_id = ?2 AND start_date = ?3",
            params![format_date(end), user_id, format_date(start)],
        )?;
        Ok(changed > 0)
    }

    fn upsert_stats_cache(
        &self,
        user_id: &str,
        summary: &CycleStatsSummary,
    ) -> Result<(), StoreError> {
        self.lock().execute(
            r#"
            INSERT OR REPLACE INTO cycle_stats (
                user_id, avg_cycle_length, avg_period_length, last_period_start,
                predicted_next_period, confidence, cycle_samples, duration_samples, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                user_id,
                summary.avg_cycle_length.to_string(),
                summary.avg_event_duration.to_string(),
                summary.last_start.map(format_date),
                summary.predicted_next_start.map(format_date),
                summary.confidence.as_str(),
                summary.cycle_samples as i64,
                summary.duration_samples as i64,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    fn load_stats_cache(&self, user_id: &str) -> Result<Option<CachedStats>, StoreError> {
        let cached = self
            .lock()
            .query_row(
                r#"
                SELECT user_id, avg_cycle_length, avg_period_length, last_period_start,
                       predicted_next_period, confidence, cycle_samples, duration_samples,
                       updated_at
                FROM cycle_stats
                WHERE user_id = ?1
                "#,
                params![user_id],
                Self::cached_stats_from_row,
            )
            .optional()?;
        Ok(cached)
    }
}
