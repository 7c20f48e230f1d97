//! Task lifecycle: the entry points every caller goes through.
//!
//! Each operation resolves the task, asks the access policy, applies the
//! business rules that need more than one field (the due-date rule), and
//! hands the write to the database layer, which records the audit entry in
//! the same transaction.

use crate::db::Database;
use crate::db::filter::{FilterPipeline, QueryScope};
use crate::db::pagination::{Page, PageLimits, parse_list_options};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::input::title_error;
use crate::policy::{self, Ability};
use crate::types::{Actor, NewTag, NewTask, Tag, TagPatch, Task, TaskLog, TaskPatch, TaskStatus, UserSummary};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;

pub const DUE_DATE_PAST_MESSAGE: &str = "The due date is not allowed a past day";

/// Open tasks may not be due before `today`. Completed tasks are exempt.
pub fn check_due_date(
    status: TaskStatus,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(), ValidationErrors> {
    match due_date {
        Some(date) if status.is_open() && date < today => {
            Err(ValidationErrors::single("due_date", DUE_DATE_PAST_MESSAGE))
        }
        _ => Ok(()),
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Orchestrates task operations on behalf of an authenticated actor.
#[derive(Clone)]
pub struct TaskLifecycle {
    db: Database,
    filters: FilterPipeline,
    limits: PageLimits,
}

impl TaskLifecycle {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            filters: FilterPipeline::for_tasks(),
            limits: PageLimits::default(),
        }
    }

    pub fn with_filters(mut self, filters: FilterPipeline) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_page_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn live_task(&self, task_id: i64) -> AppResult<Task> {
        self.db
            .get_task(task_id, false)?
            .ok_or_else(|| AppError::task_not_found(task_id))
    }

    /// Tasks visible to `actor`, narrowed by filters, sorted and paged per `params`.
    ///
    /// Admins range over every task; anyone else only over tasks assigned to them.
    pub fn list(&self, actor: &Actor, params: &HashMap<String, String>) -> AppResult<Page<Task>> {
        policy::authorize(actor, Ability::ViewAny, None)?;

        let base = if actor.is_admin() {
            QueryScope::all()
        } else {
            QueryScope::assigned_to(actor.id)
        };

        let mut errors = ValidationErrors::new();
        let scope = self.filters.apply(base, params).unwrap_or_else(|e| {
            errors.merge(e);
            QueryScope::all()
        });
        let options = parse_list_options(params, self.limits).unwrap_or_else(|e| {
            errors.merge(e);
            Default::default()
        });
        errors.into_result()?;

        let page = self.db.list_tasks(&scope, &options)?;
        tracing::debug!(actor = actor.id, count = page.items.len(), "Listed tasks");
        Ok(page)
    }

    /// One live task with its tags and assigned user.
    pub fn show(&self, actor: &Actor, task_id: i64) -> AppResult<Task> {
        let task = self.db.get_task_detail(task_id)?;
        policy::authorize(actor, Ability::View, Some(&task))?;
        Ok(task)
    }

    pub fn create(&self, actor: &Actor, input: NewTask) -> AppResult<Task> {
        self.create_with(actor, input, ValidationErrors::new())
    }

    /// Create, reporting `errors` found while reading the input together with
    /// the title, due-date and reference checks.
    pub fn create_with(&self, actor: &Actor, input: NewTask, mut errors: ValidationErrors) -> AppResult<Task> {
        policy::authorize(actor, Ability::Create, None)?;

        if !errors.has("title")
            && let Some(message) = title_error(&input.title)
        {
            errors.add("title", message);
        }
        if !errors.has("status")
            && let Err(e) = check_due_date(input.status, input.due_date, today())
        {
            errors.merge(e);
        }
        errors.merge(self.db.reference_errors(input.assigned_to, input.tags.as_deref())?);
        errors.into_result()?;

        let task = self.db.insert_task(Some(actor.id), &input)?;
        tracing::info!(task_id = task.id, actor = actor.id, "Created task");
        Ok(task)
    }

    /// Apply a versioned update. A stale version is a conflict, never a validation failure.
    pub fn update(&self, actor: &Actor, task_id: i64, patch: TaskPatch) -> AppResult<Task> {
        self.update_with(actor, task_id, patch, ValidationErrors::new())
    }

    /// Update, reporting `errors` found while reading the patch together with
    /// the rule checks. Missing tasks and denied access are reported first.
    pub fn update_with(
        &self,
        actor: &Actor,
        task_id: i64,
        patch: TaskPatch,
        mut errors: ValidationErrors,
    ) -> AppResult<Task> {
        let current = self.live_task(task_id)?;
        policy::authorize(actor, Ability::Update, Some(&current))?;

        if !errors.has("title")
            && let Some(title) = &patch.title
            && let Some(message) = title_error(title)
        {
            errors.add("title", message);
        }
        // Reopening an overdue task is held to the same rule as creating one.
        if (patch.status.is_some() || patch.due_date.is_some())
            && !errors.has("status")
            && !errors.has("due_date")
        {
            let status = patch.status.unwrap_or(current.status);
            let due_date = patch.due_date.unwrap_or(current.due_date);
            if let Err(e) = check_due_date(status, due_date, today()) {
                errors.merge(e);
            }
        }
        errors.merge(
            self.db
                .reference_errors(patch.assigned_to.flatten(), patch.tags.as_deref())?,
        );
        errors.into_result()?;

        match self.db.update_task_versioned(Some(actor.id), task_id, &patch) {
            Ok(task) => {
                tracing::info!(task_id, actor = actor.id, version = task.version, "Updated task");
                Ok(task)
            }
            Err(err @ AppError::VersionConflict { expected, actual }) => {
                tracing::warn!(task_id, actor = actor.id, expected, actual, "Version conflict");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Advance pending -> in_progress -> completed -> pending.
    pub fn toggle_status(&self, actor: &Actor, task_id: i64) -> AppResult<Task> {
        let current = self.live_task(task_id)?;
        policy::authorize(actor, Ability::Update, Some(&current))?;

        let task = self.db.toggle_task_status(Some(actor.id), task_id)?;
        tracing::info!(
            task_id,
            actor = actor.id,
            from = current.status.as_str(),
            to = task.status.as_str(),
            "Toggled task status"
        );
        Ok(task)
    }

    pub fn delete(&self, actor: &Actor, task_id: i64) -> AppResult<()> {
        let current = self.live_task(task_id)?;
        policy::authorize(actor, Ability::Delete, Some(&current))?;

        self.db.soft_delete_task(Some(actor.id), task_id)?;
        tracing::info!(task_id, actor = actor.id, "Deleted task");
        Ok(())
    }

    /// Bring back a soft-deleted task.
    pub fn restore(&self, actor: &Actor, task_id: i64) -> AppResult<Task> {
        let current = self
            .db
            .get_task(task_id, true)?
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        policy::authorize(actor, Ability::Restore, Some(&current))?;

        let task = self.db.restore_task(Some(actor.id), task_id)?;
        tracing::info!(task_id, actor = actor.id, "Restored task");
        Ok(task)
    }

    /// Audit entries for a task, newest first. Deleted tasks keep their history.
    pub fn history(&self, actor: &Actor, task_id: i64) -> AppResult<Vec<TaskLog>> {
        let task = self
            .db
            .get_task(task_id, true)?
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        policy::authorize(actor, Ability::View, Some(&task))?;
        self.db.list_task_logs(task_id)
    }

    pub fn list_tags(&self, actor: &Actor) -> AppResult<Vec<Tag>> {
        require(policy::tags::view_any(actor))?;
        self.db.list_tags()
    }

    pub fn create_tag(&self, actor: &Actor, input: NewTag) -> AppResult<Tag> {
        require(policy::tags::create(actor))?;
        self.db.create_tag(&input)
    }

    pub fn update_tag(&self, actor: &Actor, tag_id: i64, patch: TagPatch) -> AppResult<Tag> {
        require(policy::tags::update(actor))?;
        self.db.update_tag(tag_id, &patch)
    }

    pub fn delete_tag(&self, actor: &Actor, tag_id: i64) -> AppResult<()> {
        require(policy::tags::delete(actor))?;
        self.db.delete_tag(tag_id)
    }

    /// Assignable users.
    pub fn list_users(&self, _actor: &Actor) -> AppResult<Vec<UserSummary>> {
        self.db.list_users()
    }
}

fn require(allowed: bool) -> AppResult<()> {
    if allowed { Ok(()) } else { Err(AppError::Forbidden) }
}
