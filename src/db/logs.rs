//! Append-only audit log of task mutations.
//!
//! Entries are only ever inserted. Both references are nullable and the
//! schema sets them to NULL when the task or user row is physically removed,
//! so the ledger outlives the records it describes.

use super::{Database, now_ms};
use crate::error::{AppError, AppResult};
use crate::types::{OperationType, TaskLog};
use rusqlite::{Connection, Row, params};
use serde_json::Value;

fn parse_log_row(row: &Row) -> rusqlite::Result<TaskLog> {
    let operation_type: String = row.get("operation_type")?;
    let changes: Option<String> = row.get("changes")?;
    Ok(TaskLog {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        user_id: row.get("user_id")?,
        operation_type: OperationType::parse(&operation_type).unwrap_or(OperationType::Update),
        changes: changes
            .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
            .unwrap_or(Value::Null),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Append one entry using an existing connection, typically inside the
/// transaction of the mutation it describes.
pub fn record_task_log(
    conn: &Connection,
    task_id: Option<i64>,
    user_id: Option<i64>,
    operation_type: OperationType,
    changes: &Value,
) -> AppResult<i64> {
    let now = now_ms();
    let changes = serde_json::to_string(changes).map_err(AppError::internal)?;
    conn.execute(
        "INSERT INTO task_logs (task_id, user_id, operation_type, changes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![task_id, user_id, operation_type.as_str(), changes, now],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(
        log_id = id,
        task_id,
        user_id,
        operation = operation_type.as_str(),
        "Recorded task log"
    );
    Ok(id)
}

impl Database {
    /// Append an entry outside of any task mutation.
    pub fn record_task_log(
        &self,
        task_id: Option<i64>,
        user_id: Option<i64>,
        operation_type: OperationType,
        changes: &Value,
    ) -> AppResult<i64> {
        self.with_conn(|conn| record_task_log(conn, task_id, user_id, operation_type, changes))
    }

    /// Entries for one task, newest first.
    pub fn list_task_logs(&self, task_id: i64) -> AppResult<Vec<TaskLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM task_logs WHERE task_id = ?1 ORDER BY created_at DESC, id DESC",
            )?;
            let logs = stmt
                .query_map(params![task_id], parse_log_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(logs)
        })
    }

    /// Total entries in the ledger.
    pub fn count_task_logs(&self) -> AppResult<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM task_logs", [], |row| row.get(0))?)
        })
    }
}
