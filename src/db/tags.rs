//! Tag CRUD and task association helpers.

use super::{Database, now_ms};
use crate::error::{AppError, AppResult};
use crate::types::{NewTag, Tag, TagPatch};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;

pub const DEFAULT_TAG_COLOR: &str = "#6B7280";

fn parse_tag_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_tag_internal(conn: &Connection, tag_id: i64) -> AppResult<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT * FROM tags WHERE id = ?1 AND deleted_at IS NULL",
            params![tag_id],
            parse_tag_row,
        )
        .optional()?;
    Ok(tag)
}

/// Ids from `ids` that do not name a live tag, in ascending order.
pub(crate) fn missing_tag_ids(conn: &Connection, ids: &[i64]) -> AppResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT 1 FROM tags WHERE id = ?1 AND deleted_at IS NULL")?;
    let mut missing = Vec::new();
    for id in ids.iter().copied().collect::<BTreeSet<_>>() {
        if !stmt.exists(params![id])? {
            missing.push(id);
        }
    }
    Ok(missing)
}

/// Live tags attached to a task, by name.
pub(crate) fn tags_for_task(conn: &Connection, task_id: i64) -> AppResult<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT g.* FROM tags g
         JOIN tag_task tt ON tt.tag_id = g.id
         WHERE tt.task_id = ?1 AND g.deleted_at IS NULL
         ORDER BY g.name, g.id",
    )?;
    let tags = stmt
        .query_map(params![task_id], parse_tag_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Replace the task's associations with exactly `tag_ids`.
pub(crate) fn sync_task_tags(conn: &Connection, task_id: i64, tag_ids: &[i64], now: i64) -> AppResult<()> {
    conn.execute("DELETE FROM tag_task WHERE task_id = ?1", params![task_id])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO tag_task (task_id, tag_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)",
    )?;
    for tag_id in tag_ids {
        stmt.execute(params![task_id, tag_id, now])?;
    }
    Ok(())
}

impl Database {
    pub fn list_tags(&self) -> AppResult<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM tags WHERE deleted_at IS NULL ORDER BY name, id")?;
            let tags = stmt
                .query_map([], parse_tag_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    /// A live tag, or `None` if it never existed or was deleted.
    pub fn get_tag(&self, tag_id: i64) -> AppResult<Option<Tag>> {
        self.with_conn(|conn| get_tag_internal(conn, tag_id))
    }

    pub fn create_tag(&self, input: &NewTag) -> AppResult<Tag> {
        self.with_conn(|conn| {
            let now = now_ms();
            let color = input.color.as_deref().unwrap_or(DEFAULT_TAG_COLOR);
            conn.execute(
                "INSERT INTO tags (name, color, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![input.name, color, now],
            )?;
            let id = conn.last_insert_rowid();
            tracing::info!(tag_id = id, name = %input.name, "Created tag");
            get_tag_internal(conn, id)?.ok_or_else(|| AppError::tag_not_found(id))
        })
    }

    pub fn update_tag(&self, tag_id: i64, patch: &TagPatch) -> AppResult<Tag> {
        self.with_conn(|conn| {
            let current = get_tag_internal(conn, tag_id)?.ok_or_else(|| AppError::tag_not_found(tag_id))?;
            let name = patch.name.as_deref().unwrap_or(&current.name);
            let color = patch.color.as_deref().unwrap_or(&current.color);
            conn.execute(
                "UPDATE tags SET name = ?1, color = ?2, updated_at = ?3 WHERE id = ?4",
                params![name, color, now_ms(), tag_id],
            )?;
            get_tag_internal(conn, tag_id)?.ok_or_else(|| AppError::tag_not_found(tag_id))
        })
    }

    /// Detach the tag from every task, then soft-delete it. Tasks are untouched.
    pub fn delete_tag(&self, tag_id: i64) -> AppResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if get_tag_internal(&tx, tag_id)?.is_none() {
                return Err(AppError::tag_not_found(tag_id));
            }
            let detached = tx.execute("DELETE FROM tag_task WHERE tag_id = ?1", params![tag_id])?;
            let now = now_ms();
            tx.execute(
                "UPDATE tags SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![now, tag_id],
            )?;
            tx.commit()?;
            tracing::info!(tag_id, detached, "Deleted tag");
            Ok(())
        })
    }
}
