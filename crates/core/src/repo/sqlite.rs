//! SQLite-backed series repository implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};

use super::{RepoError, Series, SeriesRepository};

/// SQLite-backed series repository.
pub struct SqliteSeriesRepository {
    conn: Mutex<Connection>,
}

impl SqliteSeriesRepository {
    /// Create a new repository, creating the database file and table if needed.
    pub fn new(path: &Path) -> Result<Self, RepoError> {
        let conn = Connection::open(path).map_err(|e| RepoError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory repository (useful for testing).
    pub fn in_memory() -> Result<Self, RepoError> {
        let conn = Connection::open_in_memory().map_err(|e| RepoError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RepoError> {
        conn.execute_batch(
            r#"
            -- Tracked series (one row per release page)
            CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                update_marker TEXT NOT NULL,
                added_by INTEGER NOT NULL,
                added_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    /// Convert a row to a Series.
    fn row_to_series(row: &rusqlite::Row) -> rusqlite::Result<Series> {
        let added_at_str: String = row.get(5)?;
        let added_at = DateTime::parse_from_rfc3339(&added_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Series {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            update_marker: row.get(3)?,
            added_by: row.get(4)?,
            added_at,
        })
    }
}

/// Find the smallest free id given existing ids in ascending order.
///
/// The first value that breaks the 1,2,3,... sequence marks a gap; with no
/// gap the result is max+1, and with no rows at all it is 1.
fn first_free_id(existing: &[u32]) -> u32 {
    let mut expected = 1u32;
    for &id in existing {
        if id > expected {
            break;
        }
        expected = id + 1;
    }
    expected
}

impl SeriesRepository for SqliteSeriesRepository {
    fn insert(
        &self,
        url: &str,
        title: &str,
        update_marker: &str,
        added_by: i64,
    ) -> Result<Series, RepoError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RepoError::Database(e.to_string()))?;

        // Allocation and insert share the transaction so a concurrent add
        // cannot claim the same slot.
        let existing: Vec<u32> = {
            let mut stmt = tx
                .prepare("SELECT id FROM series ORDER BY id ASC")
                .map_err(|e| RepoError::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| RepoError::Database(e.to_string()))?;
            rows.collect::<Result<_, _>>()
                .map_err(|e| RepoError::Database(e.to_string()))?
        };

        let id = first_free_id(&existing);
        let added_at = Utc::now();

        let result = tx.execute(
            "INSERT INTO series (id, url, title, update_marker, added_by, added_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![id, url, title, update_marker, added_by, added_at.to_rfc3339()],
        );

        if let Err(e) = result {
            return Err(map_insert_error(e, id, url));
        }

        tx.commit().map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Series {
            id,
            url: url.to_string(),
            title: title.to_string(),
            update_marker: update_marker.to_string(),
            added_by,
            added_at,
        })
    }

    fn update(
        &self,
        id: u32,
        title: Option<&str>,
        update_marker: Option<&str>,
    ) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE series SET
                    title = COALESCE(?, title),
                    update_marker = COALESCE(?, update_marker)
                 WHERE id = ?",
                params![title, update_marker, id],
            )
            .map_err(|e| RepoError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: u32) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute("DELETE FROM series WHERE id = ?", params![id])
            .map_err(|e| RepoError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn get(&self, id: u32) -> Result<Option<Series>, RepoError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, url, title, update_marker, added_by, added_at
                 FROM series WHERE id = ?",
            )
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut rows = stmt
            .query_map(params![id], Self::row_to_series)
            .map_err(|e| RepoError::Database(e.to_string()))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| RepoError::Database(e.to_string()))?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Series>, RepoError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, url, title, update_marker, added_by, added_at
                 FROM series ORDER BY id ASC",
            )
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_series)
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut series = Vec::new();
        for row in rows {
            series.push(row.map_err(|e| RepoError::Database(e.to_string()))?);
        }
        Ok(series)
    }

    fn exists_by_url(&self, url: &str) -> Result<bool, RepoError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT 1 FROM series WHERE url = ?",
            params![url],
            |_| Ok(true),
        )
        .map(|_| true)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(false),
            other => Err(RepoError::Database(other.to_string())),
        })
    }
}

/// Classify an insert failure: primary key conflicts mean the allocation
/// raced, url conflicts mean the series is already tracked.
fn map_insert_error(e: rusqlite::Error, id: u32, url: &str) -> RepoError {
    if let rusqlite::Error::SqliteFailure(ffi, ref msg) = e {
        if ffi.code == ErrorCode::ConstraintViolation {
            let msg = msg.as_deref().unwrap_or("");
            if msg.contains("series.url") {
                return RepoError::DuplicateUrl(url.to_string());
            }
            return RepoError::AllocationConflict(id);
        }
    }
    RepoError::Database(e.to_string())
}
