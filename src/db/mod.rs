//! Database layer for the task desk.

pub mod filter;
pub mod logs;
pub mod pagination;
pub mod tags;
pub mod tasks;
pub mod users;

use crate::error::{AppError, AppResult};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a writer holds the lock
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::internal("database connection mutex poisoned"))
    }

    /// Run database migrations.
    fn run_migrations(&self) -> AppResult<()> {
        let mut conn = self.lock()?;
        let report = embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(AppError::internal)?;
        for migration in report.applied_migrations() {
            tracing::info!(migration = %migration, "Applied migration");
        }
        Ok(())
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    pub fn with_conn_mut<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T>,
    {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    /// Whether a user with this id exists.
    pub fn user_exists(&self, user_id: i64) -> AppResult<bool> {
        self.with_conn(|conn| user_exists_internal(conn, user_id))
    }
}

pub(crate) fn user_exists_internal(conn: &Connection, user_id: i64) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Serialize an optional JSON-able value for a TEXT column.
pub(crate) fn to_json_column<T: serde::Serialize>(value: Option<&T>) -> AppResult<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(AppError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_database_runs_migrations() {
        let db = Database::open_in_memory().unwrap();
        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table'
                     AND name IN ('tasks', 'tags', 'tag_task', 'task_logs', 'users', 'api_tokens')
                     ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .unwrap();
        assert_eq!(
            tables,
            vec!["api_tokens", "tag_task", "tags", "task_logs", "tasks", "users"]
        );
    }

    #[test]
    fn file_database_reopens_without_reapplying_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        Database::open(&path).unwrap();
        let db = Database::open(&path).unwrap();
        assert!(!db.user_exists(1).unwrap());
    }
}
