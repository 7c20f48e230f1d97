//! Structured errors for task desk operations.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Message returned when an update presents a stale version.
pub const VERSION_CONFLICT_MESSAGE: &str =
    "Task has been modified by another user. Please refresh and try again.";

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    Unauthenticated,
    Forbidden,
    TaskNotFound,
    TagNotFound,
    UserNotFound,
    NotFound,
    VersionConflict,
    DatabaseError,
    InternalError,
}

/// Field-level validation failures, aggregated so a caller sees all of them at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when nothing failed, otherwise the aggregate as an error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Every failure a task desk operation can signal.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("The given data was invalid: {0}")]
    Validation(ValidationErrors),

    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("This action is unauthorized.")]
    Forbidden,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// A path that cannot name any record, such as a non-numeric id.
    #[error("The requested resource was not found.")]
    UnknownResource,

    #[error("{}", VERSION_CONFLICT_MESSAGE)]
    VersionConflict { expected: i64, actual: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(ValidationErrors::single(field, message))
    }

    pub fn task_not_found(id: i64) -> Self {
        AppError::NotFound { entity: "Task", id }
    }

    pub fn tag_not_found(id: i64) -> Self {
        AppError::NotFound { entity: "Tag", id }
    }

    pub fn user_not_found(id: i64) -> Self {
        AppError::NotFound { entity: "User", id }
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        AppError::Internal(anyhow::anyhow!("{}", err))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::ValidationFailed,
            AppError::Unauthenticated => ErrorCode::Unauthenticated,
            AppError::Forbidden => ErrorCode::Forbidden,
            AppError::NotFound { entity: "Tag", .. } => ErrorCode::TagNotFound,
            AppError::NotFound { entity: "User", .. } => ErrorCode::UserNotFound,
            AppError::NotFound { .. } => ErrorCode::TaskNotFound,
            AppError::UnknownResource => ErrorCode::NotFound,
            AppError::VersionConflict { .. } => ErrorCode::VersionConflict,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::VersionConflict { .. })
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app_err) => app_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(sql_err) => AppError::Database(sql_err),
                Err(err) => AppError::Internal(err),
            },
        }
    }
}

/// Result type for task desk operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
