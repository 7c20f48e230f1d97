//! Composable task filters.
//!
//! A [`FilterPipeline`] is a registry mapping query-parameter keys to
//! predicate builders. Applying it to a [`QueryScope`] narrows the scope with
//! one predicate per recognized key, all joined with AND. Keys the registry
//! does not know are ignored; keys absent from the input add nothing.

use crate::error::ValidationErrors;
use crate::input::parse_date;
use crate::types::{TaskPriority, TaskStatus};
use rusqlite::types::Value as SqlValue;
use std::collections::HashMap;

pub const KEYWORD_MAX: usize = 255;

/// One SQL condition over the task alias `t`, with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// `column = value`
    pub fn eq(column: &str, value: impl Into<SqlValue>) -> Self {
        Self::new(format!("{} = ?", column), vec![value.into()])
    }
}

/// The set of tasks a query ranges over.
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    predicates: Vec<Predicate>,
    include_deleted: bool,
}

impl QueryScope {
    /// Every task that is not soft-deleted.
    pub fn all() -> Self {
        Self::default()
    }

    /// Tasks assigned to one user.
    pub fn assigned_to(user_id: i64) -> Self {
        Self::all().and(Predicate::eq("t.assigned_to", user_id))
    }

    /// Also range over soft-deleted tasks.
    pub fn with_trashed(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// ` WHERE ...` for this scope, or an empty string when unrestricted.
    pub fn where_clause(&self) -> String {
        let mut clauses: Vec<&str> = Vec::with_capacity(self.predicates.len() + 1);
        if !self.include_deleted {
            clauses.push("t.deleted_at IS NULL");
        }
        clauses.extend(self.predicates.iter().map(|p| p.sql.as_str()));
        if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        }
    }

    /// Parameters in the order their placeholders appear in [`where_clause`](Self::where_clause).
    pub fn params(&self) -> Vec<SqlValue> {
        self.predicates
            .iter()
            .flat_map(|p| p.params.iter().cloned())
            .collect()
    }
}

/// Builds a predicate from a raw query value, or explains why the value is unusable.
pub type PredicateBuilder = fn(&str) -> Result<Predicate, String>;

/// Ordered registry of filter keys.
#[derive(Clone)]
pub struct FilterPipeline {
    filters: Vec<(&'static str, PredicateBuilder)>,
}

impl FilterPipeline {
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// The standard task filters.
    pub fn for_tasks() -> Self {
        Self::empty()
            .register("status", status)
            .register("priority", priority)
            .register("assigned_to", assigned_to)
            .register("tags", tags)
            .register("due_date_from", due_date_from)
            .register("due_date_to", due_date_to)
            .register("keyword", keyword)
    }

    /// Add a filter, replacing any builder already registered under `key`.
    pub fn register(mut self, key: &'static str, builder: PredicateBuilder) -> Self {
        match self.filters.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = builder,
            None => self.filters.push((key, builder)),
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters.iter().map(|(k, _)| *k)
    }

    /// Narrow `scope` by every recognized, non-blank key in `params`.
    pub fn apply(
        &self,
        mut scope: QueryScope,
        params: &HashMap<String, String>,
    ) -> Result<QueryScope, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (key, builder) in &self.filters {
            let Some(raw) = params.get(*key) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            match builder(raw.trim()) {
                Ok(predicate) => scope = scope.and(predicate),
                Err(message) => errors.add(*key, message),
            }
        }
        if errors.is_empty() {
            Ok(scope)
        } else {
            Err(errors)
        }
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::for_tasks()
    }
}

fn status(value: &str) -> Result<Predicate, String> {
    let status = TaskStatus::parse(value).ok_or("The selected status is invalid.")?;
    Ok(Predicate::eq("t.status", status.as_str().to_string()))
}

fn priority(value: &str) -> Result<Predicate, String> {
    let priority = TaskPriority::parse(value).ok_or("The selected priority is invalid.")?;
    Ok(Predicate::eq("t.priority", priority.as_str().to_string()))
}

fn assigned_to(value: &str) -> Result<Predicate, String> {
    let user_id: i64 = value
        .parse()
        .map_err(|_| "The assigned_to must be an integer.".to_string())?;
    Ok(Predicate::eq("t.assigned_to", user_id))
}

/// Matches tasks carrying any of the listed tag ids.
fn tags(value: &str) -> Result<Predicate, String> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "The tags must be a comma-separated list of tag ids.".to_string())?;
    if ids.is_empty() {
        return Err("The tags must be a comma-separated list of tag ids.".to_string());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    Ok(Predicate::new(
        format!(
            "EXISTS (SELECT 1 FROM tag_task tt WHERE tt.task_id = t.id AND tt.tag_id IN ({}))",
            placeholders
        ),
        ids.into_iter().map(SqlValue::from).collect(),
    ))
}

// Due dates are stored as whole days, so comparing dates is the same as
// comparing against the start or end of the given day.
fn due_date_from(value: &str) -> Result<Predicate, String> {
    let date = parse_date(value).ok_or("The due_date_from is not a valid date.")?;
    Ok(Predicate::new(
        "t.due_date >= ?",
        vec![SqlValue::from(date.to_string())],
    ))
}

fn due_date_to(value: &str) -> Result<Predicate, String> {
    let date = parse_date(value).ok_or("The due_date_to is not a valid date.")?;
    Ok(Predicate::new(
        "t.due_date <= ?",
        vec![SqlValue::from(date.to_string())],
    ))
}

/// Quote each word as an FTS5 string so user input cannot inject query syntax.
pub fn fts_query(keyword: &str) -> Option<String> {
    let terms: Vec<String> = keyword
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn keyword(value: &str) -> Result<Predicate, String> {
    if value.chars().count() > KEYWORD_MAX {
        return Err(format!(
            "The keyword may not be greater than {} characters.",
            KEYWORD_MAX
        ));
    }
    let query = fts_query(value).ok_or("The keyword must contain a word.")?;
    Ok(Predicate::new(
        "t.id IN (SELECT rowid FROM tasks_fts WHERE tasks_fts MATCH ?)",
        vec![SqlValue::from(query)],
    ))
}
