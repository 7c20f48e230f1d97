//! Core types for the task desk.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form key/value map attached to a task.
pub type Metadata = Map<String, Value>;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// The status reached by one toggle: pending -> in_progress -> completed -> pending.
    pub fn next(&self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }

    /// Open tasks may not carry a due date in the past.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn admin(id: i64) -> Self {
        Self { id, role: Role::Admin }
    }

    pub fn user(id: i64) -> Self {
        Self { id, role: Role::User }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

/// Compact user representation for dropdowns and the task `user` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

/// A tag that can be attached to many tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
    pub version: i64,
    pub metadata: Option<Metadata>,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,

    /// Loaded on demand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
    /// Assigned user, loaded on single fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

impl Task {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags
            .as_ref()
            .map(|tags| tags.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    /// The record as written to the audit log (no relations).
    pub fn record(&self) -> Value {
        let mut bare = self.clone();
        bare.tags = None;
        bare.user = None;
        serde_json::to_value(bare).unwrap_or(Value::Null)
    }
}

/// Kind of mutation captured by an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(OperationType::Create),
            "update" => Some(OperationType::Update),
            "delete" => Some(OperationType::Delete),
            _ => None,
        }
    }
}

/// An append-only audit record of one task mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    /// None once the task row is physically removed.
    pub task_id: Option<i64>,
    /// None for system-initiated actions or after the user is removed.
    pub user_id: Option<i64>,
    pub operation_type: OperationType,
    pub changes: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Validated input for creating a task, defaults already applied.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
    pub tags: Option<Vec<i64>>,
    pub metadata: Option<Metadata>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Validated input for updating a task.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// The version the caller last read.
    pub version: i64,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub assigned_to: Option<Option<i64>>,
    /// Full replacement of the tag set when present.
    pub tags: Option<Vec<i64>>,
    pub metadata: Option<Option<Metadata>>,
}

impl TaskPatch {
    pub fn at_version(version: i64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }
}

/// Input for creating a tag.
#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
    pub color: Option<String>,
}

/// Input for updating a tag.
#[derive(Debug, Clone, Default)]
pub struct TagPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_toggle_is_a_three_cycle() {
        let mut status = TaskStatus::Pending;
        let mut seen = Vec::new();
        for _ in 0..3 {
            status = status.next();
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![TaskStatus::InProgress, TaskStatus::Completed, TaskStatus::Pending]
        );
    }

    #[test]
    fn status_and_priority_parse_their_wire_names() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        for priority in TaskPriority::ALL {
            assert_eq!(TaskPriority::parse(priority.as_str()), Some(priority));
        }
        assert_eq!(TaskStatus::parse("done"), None);
        assert_eq!(TaskPriority::parse("urgent"), None);
    }

    #[test]
    fn task_serializes_snake_case_and_iso_dates() {
        let task = Task {
            id: 7,
            title: "Ship release notes".into(),
            description: None,
            status: TaskStatus::InProgress,
            priority: TaskPriority::High,
            due_date: NaiveDate::from_ymd_opt(2030, 1, 15),
            assigned_to: Some(2),
            version: 3,
            metadata: None,
            deleted_at: None,
            created_at: 1,
            updated_at: 2,
            tags: None,
            user: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["due_date"], "2030-01-15");
        assert!(json.get("tags").is_none());
    }
}
