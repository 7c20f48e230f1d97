//! Task persistence: insert, version-guarded update, status toggle,
//! soft delete, restore and listing.
//!
//! Every mutation writes its audit log entry inside the same transaction as
//! the task change, so a task never changes without its ledger entry.

use super::filter::{Predicate, QueryScope};
use super::logs::record_task_log;
use super::pagination::{Cursor, ListOptions, Page, PageInfo, PageRequest, last_page};
use super::tags::{missing_tag_ids, sync_task_tags, tags_for_task};
use super::users::user_summary;
use super::{Database, now_ms, to_json_column, user_exists_internal};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::types::{NewTask, OperationType, Task, TaskPatch, TaskPriority, TaskStatus};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use serde_json::{Map, Value, json};

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let due_date: Option<String> = row.get("due_date")?;
    let metadata_json: Option<String> = row.get("metadata")?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::parse(&status).unwrap_or_default(),
        priority: TaskPriority::parse(&priority).unwrap_or_default(),
        due_date: due_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        assigned_to: row.get("assigned_to")?,
        version: row.get("version")?,
        metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
        deleted_at: row.get("deleted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        tags: None,
        user: None,
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, task_id: i64, include_deleted: bool) -> AppResult<Option<Task>> {
    let sql = if include_deleted {
        "SELECT * FROM tasks WHERE id = ?1"
    } else {
        "SELECT * FROM tasks WHERE id = ?1 AND deleted_at IS NULL"
    };
    let task = conn.query_row(sql, params![task_id], parse_task_row).optional()?;
    Ok(task)
}

fn require_task(conn: &Connection, task_id: i64, include_deleted: bool) -> AppResult<Task> {
    get_task_internal(conn, task_id, include_deleted)?.ok_or_else(|| AppError::task_not_found(task_id))
}

fn with_tags(conn: &Connection, mut task: Task) -> AppResult<Task> {
    task.tags = Some(tags_for_task(conn, task.id)?);
    Ok(task)
}

/// Referential checks for an assignee and a tag list.
fn reference_errors(
    conn: &Connection,
    assigned_to: Option<i64>,
    tag_ids: Option<&[i64]>,
) -> AppResult<ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(user_id) = assigned_to
        && !user_exists_internal(conn, user_id)?
    {
        errors.add("assigned_to", "The selected assigned_to is invalid.");
    }
    if let Some(ids) = tag_ids {
        let missing = missing_tag_ids(conn, ids)?;
        for (i, id) in ids.iter().enumerate() {
            if missing.contains(id) {
                errors.add(format!("tags.{}", i), format!("The selected tags.{} is invalid.", i));
            }
        }
    }
    Ok(errors)
}

fn date_column(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.to_string())
}

impl Database {
    /// Get a task without relations.
    pub fn get_task(&self, task_id: i64, include_deleted: bool) -> AppResult<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id, include_deleted))
    }

    /// Field errors for an assignee or tag ids that do not resolve.
    ///
    /// The write paths repeat this check inside their transactions.
    pub fn reference_errors(
        &self,
        assigned_to: Option<i64>,
        tag_ids: Option<&[i64]>,
    ) -> AppResult<ValidationErrors> {
        self.with_conn(|conn| reference_errors(conn, assigned_to, tag_ids))
    }

    /// Get a live task with its tags and assigned user loaded.
    pub fn get_task_detail(&self, task_id: i64) -> AppResult<Task> {
        self.with_conn(|conn| {
            let mut task = with_tags(conn, require_task(conn, task_id, false)?)?;
            if let Some(user_id) = task.assigned_to {
                task.user = user_summary(conn, user_id)?;
            }
            Ok(task)
        })
    }

    /// Insert a task at version 1, attach its tags and record a "create" entry.
    pub fn insert_task(&self, actor_id: Option<i64>, input: &NewTask) -> AppResult<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            reference_errors(&tx, input.assigned_to, input.tags.as_deref())?.into_result()?;

            let now = now_ms();
            tx.execute(
                "INSERT INTO tasks (title, description, status, priority, due_date, assigned_to,
                                    version, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?8)",
                params![
                    input.title,
                    input.description,
                    input.status.as_str(),
                    input.priority.as_str(),
                    date_column(input.due_date),
                    input.assigned_to,
                    to_json_column(input.metadata.as_ref())?,
                    now,
                ],
            )?;
            let task_id = tx.last_insert_rowid();

            if let Some(tag_ids) = &input.tags {
                sync_task_tags(&tx, task_id, tag_ids, now)?;
            }

            let task = require_task(&tx, task_id, false)?;
            record_task_log(&tx, Some(task_id), actor_id, OperationType::Create, &task.record())?;
            let task = with_tags(&tx, task)?;

            tx.commit()?;
            Ok(task)
        })
    }

    /// Apply `patch` if the stored version still equals `patch.version`.
    ///
    /// The comparison and the write happen in one immediate transaction, and
    /// the write itself is conditioned on the version, so of two updates
    /// presenting the same version exactly one succeeds.
    pub fn update_task_versioned(
        &self,
        actor_id: Option<i64>,
        task_id: i64,
        patch: &TaskPatch,
    ) -> AppResult<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = require_task(&tx, task_id, false)?;
            if current.version != patch.version {
                return Err(AppError::VersionConflict {
                    expected: patch.version,
                    actual: current.version,
                });
            }

            let assigned_to = patch.assigned_to.flatten();
            reference_errors(&tx, assigned_to, patch.tags.as_deref())?.into_result()?;

            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            let mut changes = Map::new();

            if let Some(title) = &patch.title
                && *title != current.title
            {
                sets.push("title = ?");
                values.push(Box::new(title.clone()));
                changes.insert("title".into(), json!(title));
            }
            if let Some(description) = &patch.description
                && *description != current.description
            {
                sets.push("description = ?");
                values.push(Box::new(description.clone()));
                changes.insert("description".into(), json!(description));
            }
            if let Some(status) = patch.status
                && status != current.status
            {
                sets.push("status = ?");
                values.push(Box::new(status.as_str()));
                changes.insert("status".into(), json!(status));
            }
            if let Some(priority) = patch.priority
                && priority != current.priority
            {
                sets.push("priority = ?");
                values.push(Box::new(priority.as_str()));
                changes.insert("priority".into(), json!(priority));
            }
            if let Some(due_date) = patch.due_date
                && due_date != current.due_date
            {
                sets.push("due_date = ?");
                values.push(Box::new(date_column(due_date)));
                changes.insert("due_date".into(), json!(due_date));
            }
            if let Some(assigned_to) = patch.assigned_to
                && assigned_to != current.assigned_to
            {
                sets.push("assigned_to = ?");
                values.push(Box::new(assigned_to));
                changes.insert("assigned_to".into(), json!(assigned_to));
            }
            if let Some(metadata) = &patch.metadata
                && *metadata != current.metadata
            {
                sets.push("metadata = ?");
                values.push(Box::new(to_json_column(metadata.as_ref())?));
                changes.insert("metadata".into(), json!(metadata));
            }

            let new_version = patch.version + 1;
            let now = now_ms();
            sets.push("version = ?");
            values.push(Box::new(new_version));
            changes.insert("version".into(), json!(new_version));
            sets.push("updated_at = ?");
            values.push(Box::new(now));

            values.push(Box::new(task_id));
            values.push(Box::new(patch.version));
            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ? AND version = ? AND deleted_at IS NULL",
                sets.join(", ")
            );
            let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
            let updated = tx.execute(&sql, params_refs.as_slice())?;
            if updated == 0 {
                let actual = require_task(&tx, task_id, false)?.version;
                return Err(AppError::VersionConflict {
                    expected: patch.version,
                    actual,
                });
            }

            if let Some(tag_ids) = &patch.tags {
                sync_task_tags(&tx, task_id, tag_ids, now)?;
            }

            record_task_log(
                &tx,
                Some(task_id),
                actor_id,
                OperationType::Update,
                &Value::Object(changes),
            )?;
            let task = with_tags(&tx, require_task(&tx, task_id, false)?)?;

            tx.commit()?;
            Ok(task)
        })
    }

    /// Advance the status one step around the cycle. Does not consult or bump the version.
    pub fn toggle_task_status(&self, actor_id: Option<i64>, task_id: i64) -> AppResult<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = require_task(&tx, task_id, false)?;
            let next = current.status.next();
            tx.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![next.as_str(), now_ms(), task_id],
            )?;
            record_task_log(
                &tx,
                Some(task_id),
                actor_id,
                OperationType::Update,
                &json!({ "old_status": current.status, "new_status": next }),
            )?;
            let task = require_task(&tx, task_id, false)?;

            tx.commit()?;
            Ok(task)
        })
    }

    /// Mark a live task deleted. Returns the deletion timestamp.
    pub fn soft_delete_task(&self, actor_id: Option<i64>, task_id: i64) -> AppResult<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let now = now_ms();
            let deleted = tx.execute(
                "UPDATE tasks SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![now, task_id],
            )?;
            if deleted == 0 {
                return Err(AppError::task_not_found(task_id));
            }
            record_task_log(
                &tx,
                Some(task_id),
                actor_id,
                OperationType::Delete,
                &json!({ "deleted_at": now }),
            )?;

            tx.commit()?;
            Ok(now)
        })
    }

    /// Clear the deletion marker. Restoring a live task changes nothing and logs nothing.
    pub fn restore_task(&self, actor_id: Option<i64>, task_id: i64) -> AppResult<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current = require_task(&tx, task_id, true)?;
            if current.is_deleted() {
                tx.execute(
                    "UPDATE tasks SET deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
                    params![now_ms(), task_id],
                )?;
                record_task_log(
                    &tx,
                    Some(task_id),
                    actor_id,
                    OperationType::Update,
                    &json!({ "deleted_at": null }),
                )?;
            }
            let task = with_tags(&tx, require_task(&tx, task_id, false)?)?;

            tx.commit()?;
            Ok(task)
        })
    }

    /// One page of the tasks in `scope`, each with its tags.
    pub fn list_tasks(&self, scope: &QueryScope, options: &ListOptions) -> AppResult<Page<Task>> {
        let scope = scope.clone().with_trashed(options.with_trashed);
        let order = options.sort.order_clause();

        self.with_conn(|conn| {
            let (tasks, pagination) = match &options.page {
                PageRequest::Offset { page, per_page } => {
                    let total: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM tasks t{}", scope.where_clause()),
                        params_from_iter(scope.params()),
                        |row| row.get(0),
                    )?;

                    let mut values = scope.params();
                    values.push(i64::from(*per_page).into());
                    values.push((i64::from(page.saturating_sub(1)) * i64::from(*per_page)).into());
                    let sql = format!(
                        "SELECT t.* FROM tasks t{} ORDER BY {} LIMIT ? OFFSET ?",
                        scope.where_clause(),
                        order
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let tasks = stmt
                        .query_map(params_from_iter(values), parse_task_row)?
                        .collect::<Result<Vec<_>, _>>()?;

                    let info = PageInfo::Offset {
                        current_page: *page,
                        per_page: *per_page,
                        total,
                        last_page: last_page(total, *per_page),
                    };
                    (tasks, info)
                }
                PageRequest::Cursor { after, per_page } => {
                    let scope = match after {
                        Some(cursor) => {
                            let (sql, values) = cursor.seek_clause();
                            scope.clone().and(Predicate::new(sql, values))
                        }
                        None => scope.clone(),
                    };

                    // One extra row tells whether another page follows.
                    let mut values = scope.params();
                    values.push((i64::from(*per_page) + 1).into());
                    let sql = format!(
                        "SELECT t.* FROM tasks t{} ORDER BY {} LIMIT ?",
                        scope.where_clause(),
                        order
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mut tasks = stmt
                        .query_map(params_from_iter(values), parse_task_row)?
                        .collect::<Result<Vec<_>, _>>()?;

                    let has_more = tasks.len() > *per_page as usize;
                    tasks.truncate(*per_page as usize);
                    let next_cursor = if has_more {
                        tasks.last().map(|t| Cursor::after(t, options.sort).encode())
                    } else {
                        None
                    };
                    let info = PageInfo::Cursor {
                        per_page: *per_page,
                        next_cursor,
                        has_more,
                    };
                    (tasks, info)
                }
            };

            let items = tasks
                .into_iter()
                .map(|task| with_tags(conn, task))
                .collect::<AppResult<Vec<_>>>()?;
            Ok(Page { items, pagination })
        })
    }
}
