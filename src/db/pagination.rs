//! Ordering and paging for task listings.
//!
//! Two modes are supported. Offset pages are addressed by number and carry a
//! total count. Cursor pages continue from an opaque token naming the last
//! row seen, which keeps page boundaries stable while rows are inserted.
//! Both modes break ties on the task id so the ordering is total.

use crate::error::ValidationErrors;
use crate::types::{Task, TaskPriority};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Priority,
    DueDate,
    CreatedAt,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(SortField::Title),
            "priority" => Some(SortField::Priority),
            "due_date" => Some(SortField::DueDate),
            "created_at" => Some(SortField::CreatedAt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Priority => "priority",
            SortField::DueDate => "due_date",
            SortField::CreatedAt => "created_at",
        }
    }

    /// SQL expression the rows are ordered by.
    pub fn sql_expr(&self) -> &'static str {
        match self {
            SortField::Title => "t.title",
            SortField::Priority => {
                "(CASE t.priority WHEN 'low' THEN 1 WHEN 'medium' THEN 2 WHEN 'high' THEN 3 END)"
            }
            // Undated tasks sort before any date ascending.
            SortField::DueDate => "COALESCE(t.due_date, '')",
            SortField::CreatedAt => "t.created_at",
        }
    }

    /// The value of [`sql_expr`](Self::sql_expr) for an already loaded task.
    fn key_of(&self, task: &Task) -> Value {
        match self {
            SortField::Title => Value::from(task.title.clone()),
            SortField::Priority => Value::from(priority_rank(task)),
            SortField::DueDate => Value::from(
                task.due_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            ),
            SortField::CreatedAt => Value::from(task.created_at),
        }
    }

    fn key_is_integer(&self) -> bool {
        matches!(self, SortField::Priority | SortField::CreatedAt)
    }
}

fn priority_rank(task: &Task) -> i64 {
    match task.priority {
        TaskPriority::Low => 1,
        TaskPriority::Medium => 2,
        TaskPriority::High => 3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Comparison that selects rows after a cursor position.
    fn after(&self) -> &'static str {
        match self {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        }
    }
}

/// Ordering for a listing. Defaults to newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl Sort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// `ORDER BY` body including the id tie-breaker.
    pub fn order_clause(&self) -> String {
        format!(
            "{expr} {dir}, t.id {dir}",
            expr = self.field.sql_expr(),
            dir = self.direction.sql()
        )
    }
}

/// Position of the last row of a cursor page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "f")]
    pub field: SortField,
    #[serde(rename = "d")]
    pub direction: SortDirection,
    #[serde(rename = "k")]
    pub key: Value,
    #[serde(rename = "i")]
    pub id: i64,
}

impl Cursor {
    /// The cursor that continues after `task` under `sort`.
    pub fn after(task: &Task, sort: Sort) -> Self {
        Self {
            field: sort.field,
            direction: sort.direction,
            key: sort.field.key_of(task),
            id: task.id,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing plain enums, integers and strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
        let cursor: Cursor = serde_json::from_slice(&bytes).ok()?;
        let well_typed = if cursor.field.key_is_integer() {
            cursor.key.is_i64()
        } else {
            cursor.key.is_string()
        };
        well_typed.then_some(cursor)
    }

    fn key_param(&self) -> SqlValue {
        match &self.key {
            Value::Number(n) => SqlValue::Integer(n.as_i64().unwrap_or_default()),
            Value::String(s) => SqlValue::Text(s.clone()),
            _ => SqlValue::Null,
        }
    }

    /// Predicate selecting the rows strictly after this position, with its parameters.
    pub fn seek_clause(&self) -> (String, Vec<SqlValue>) {
        let expr = self.field.sql_expr();
        let op = self.direction.after();
        (
            format!(
                "({expr} {op} ? OR ({expr} = ? AND t.id {op} ?))",
                expr = expr,
                op = op
            ),
            vec![self.key_param(), self.key_param(), SqlValue::Integer(self.id)],
        )
    }
}

/// Which page of a listing to return.
#[derive(Debug, Clone, PartialEq)]
pub enum PageRequest {
    Offset { page: u32, per_page: u32 },
    /// `after` is `None` for the first cursor page.
    Cursor { after: Option<Cursor>, per_page: u32 },
}

impl PageRequest {
    pub fn per_page(&self) -> u32 {
        match self {
            PageRequest::Offset { per_page, .. } | PageRequest::Cursor { per_page, .. } => {
                *per_page
            }
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::Offset {
            page: 1,
            per_page: 10,
        }
    }
}

/// Paging metadata returned beside the items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PageInfo {
    Offset {
        current_page: u32,
        per_page: u32,
        total: i64,
        last_page: u32,
    },
    Cursor {
        per_page: u32,
        next_cursor: Option<String>,
        has_more: bool,
    },
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

/// Everything a task listing accepts besides filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub sort: Sort,
    pub page: PageRequest,
    pub with_trashed: bool,
}

/// Paging limits applied when reading list parameters.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_per_page: 10,
            max_per_page: 100,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn non_blank<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Read `sort_by`, `sort_direction`, `per_page`, `page`, `cursor` and `with_trashed`.
///
/// The presence of a `cursor` key (even empty) selects cursor mode.
pub fn parse_list_options(
    params: &HashMap<String, String>,
    limits: PageLimits,
) -> Result<ListOptions, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut sort = Sort::default();

    if let Some(raw) = non_blank(params, "sort_by") {
        match SortField::parse(raw) {
            Some(field) => sort.field = field,
            None => errors.add("sort_by", "The selected sort_by is invalid."),
        }
    }
    if let Some(raw) = non_blank(params, "sort_direction") {
        match SortDirection::parse(raw) {
            Some(direction) => sort.direction = direction,
            None => errors.add("sort_direction", "The selected sort_direction is invalid."),
        }
    }

    let mut per_page = limits.default_per_page;
    if let Some(raw) = non_blank(params, "per_page") {
        match raw.parse::<u32>() {
            Ok(n) if (1..=limits.max_per_page).contains(&n) => per_page = n,
            _ => errors.add(
                "per_page",
                format!(
                    "The per_page must be an integer between 1 and {}.",
                    limits.max_per_page
                ),
            ),
        }
    }

    let page = if let Some(raw) = params.get("cursor") {
        let after = match raw.trim() {
            "" => None,
            token => match Cursor::decode(token) {
                Some(cursor) if cursor.field == sort.field && cursor.direction == sort.direction => {
                    Some(cursor)
                }
                Some(_) => {
                    errors.add("cursor", "The cursor does not match the requested ordering.");
                    None
                }
                None => {
                    errors.add("cursor", "The cursor is invalid.");
                    None
                }
            },
        };
        PageRequest::Cursor { after, per_page }
    } else {
        let mut page = 1;
        if let Some(raw) = non_blank(params, "page") {
            match raw.parse::<u32>() {
                Ok(n) if n >= 1 => page = n,
                _ => errors.add("page", "The page must be an integer of at least 1."),
            }
        }
        PageRequest::Offset { page, per_page }
    };

    let mut with_trashed = false;
    if let Some(raw) = params.get("with_trashed") {
        match parse_bool(raw) {
            Some(b) => with_trashed = b,
            None => errors.add("with_trashed", "The with_trashed field must be true or false."),
        }
    }

    if errors.is_empty() {
        Ok(ListOptions {
            sort,
            page,
            with_trashed,
        })
    } else {
        Err(errors)
    }
}

/// Number of the last offset page; at least 1 so empty listings have one page.
pub fn last_page(total: i64, per_page: u32) -> u32 {
    let per_page = i64::from(per_page.max(1));
    let pages = (total + per_page - 1) / per_page;
    u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
}
