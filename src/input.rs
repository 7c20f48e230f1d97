//! Readers that turn JSON request bodies into validated inputs.
//!
//! Every reader collects all field failures before returning, so a caller
//! gets one aggregated [`ValidationErrors`] instead of the first problem only.

use crate::error::ValidationErrors;
use crate::types::{Metadata, NewTag, NewTask, TagPatch, TaskPatch, TaskPriority, TaskStatus};
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::sync::LazyLock;

pub const TITLE_MIN: usize = 5;
pub const TITLE_MAX: usize = 255;
pub const TAG_NAME_MAX: usize = 50;

static EMPTY_BODY: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

/// Length check for a task title, shared by the body readers and the lifecycle.
pub fn title_error(title: &str) -> Option<String> {
    let len = title.trim().chars().count();
    if len == 0 {
        Some("The title field is required.".to_string())
    } else if len < TITLE_MIN {
        Some(format!("The title must be at least {} characters.", TITLE_MIN))
    } else if title.chars().count() > TITLE_MAX {
        Some(format!("The title may not be greater than {} characters.", TITLE_MAX))
    } else {
        None
    }
}

/// Parse a date given as `YYYY-MM-DD` or as an RFC 3339 timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Accepts JSON integers and integer strings.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Field reader over a JSON object body.
struct Reader<'a> {
    body: &'a Map<String, Value>,
    errors: ValidationErrors,
}

impl<'a> Reader<'a> {
    fn new(body: &'a Value) -> Self {
        let mut errors = ValidationErrors::new();
        let body = match body {
            Value::Object(map) => map,
            _ => {
                errors.add("body", "The request body must be a JSON object.");
                &*EMPTY_BODY
            }
        };
        Self { body, errors }
    }

    fn present(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    fn required_string(&mut self, key: &str) -> Option<String> {
        match self.body.get(key) {
            Some(v) if is_blank(v) => {
                self.errors.add(key, format!("The {} field is required.", key));
                None
            }
            None => {
                self.errors.add(key, format!("The {} field is required.", key));
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.errors.add(key, format!("The {} field must be a string.", key));
                None
            }
        }
    }

    fn nullable_string(&mut self, key: &str) -> Option<String> {
        match self.body.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.errors.add(key, format!("The {} field must be a string.", key));
                None
            }
        }
    }

    fn title(&mut self, key: &str) -> Option<String> {
        let title = self.required_string(key)?;
        if let Some(message) = title_error(&title) {
            self.errors.add(key, message);
            return None;
        }
        Some(title)
    }

    fn status(&mut self, key: &str) -> Option<TaskStatus> {
        let raw = self.nullable_string(key)?;
        let status = TaskStatus::parse(&raw);
        if status.is_none() {
            self.errors.add(key, format!("The selected {} is invalid.", key));
        }
        status
    }

    fn priority(&mut self, key: &str) -> Option<TaskPriority> {
        let raw = self.nullable_string(key)?;
        let priority = TaskPriority::parse(&raw);
        if priority.is_none() {
            self.errors.add(key, format!("The selected {} is invalid.", key));
        }
        priority
    }

    fn nullable_integer(&mut self, key: &str) -> Option<i64> {
        match self.body.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => {
                let n = as_integer(v);
                if n.is_none() {
                    self.errors.add(key, format!("The {} must be an integer.", key));
                }
                n
            }
        }
    }

    fn nullable_date(&mut self, key: &str) -> Option<NaiveDate> {
        match self.body.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                let date = parse_date(s);
                if date.is_none() {
                    self.errors
                        .add(key, format!("The {} is not a valid date.", key));
                }
                date
            }
            Some(_) => {
                self.errors
                    .add(key, format!("The {} is not a valid date.", key));
                None
            }
        }
    }

    fn id_list(&mut self, key: &str) -> Option<Vec<i64>> {
        match self.body.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let mut ids = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match as_integer(item) {
                        Some(id) => ids.push(id),
                        None => self.errors.add(
                            format!("{}.{}", key, i),
                            format!("The {}.{} must be an integer.", key, i),
                        ),
                    }
                }
                Some(ids)
            }
            Some(_) => {
                self.errors.add(key, format!("The {} must be an array.", key));
                None
            }
        }
    }

    fn metadata(&mut self, key: &str) -> Option<Metadata> {
        match self.body.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => {
                self.errors.add(key, format!("The {} must be an object.", key));
                None
            }
        }
    }

    fn into_parts<T>(self, value: T) -> (T, ValidationErrors) {
        (value, self.errors)
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors)
        }
    }
}

/// Read the body of a create-task request, applying defaults.
pub fn parse_new_task(body: &Value) -> Result<NewTask, ValidationErrors> {
    let (task, errors) = read_new_task(body);
    if errors.is_empty() {
        Ok(task)
    } else {
        Err(errors)
    }
}

/// Like [`parse_new_task`], but hands back whatever could be read alongside
/// the field errors, so later rule checks can be reported in the same response.
pub fn read_new_task(body: &Value) -> (NewTask, ValidationErrors) {
    let mut r = Reader::new(body);
    let title = r.title("title");
    let description = r.nullable_string("description");
    let status = r.status("status").unwrap_or_default();
    let priority = r.priority("priority").unwrap_or_default();
    let due_date = r.nullable_date("due_date");
    let assigned_to = r.nullable_integer("assigned_to");
    let tags = r.id_list("tags");
    let metadata = r.metadata("metadata");

    r.into_parts(NewTask {
        title: title.unwrap_or_default(),
        description,
        status,
        priority,
        due_date,
        assigned_to,
        tags,
        metadata,
    })
}

/// Read the body of an update-task request. Only keys present in the body are applied.
pub fn parse_task_patch(body: &Value) -> Result<TaskPatch, ValidationErrors> {
    let (patch, errors) = read_task_patch(body);
    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(errors)
    }
}

pub fn read_task_patch(body: &Value) -> (TaskPatch, ValidationErrors) {
    let mut r = Reader::new(body);

    let version = match r.body.get("version") {
        None | Some(Value::Null) => {
            r.errors
                .add("version", "The Version number is required for updates");
            None
        }
        Some(v) => {
            let n = as_integer(v);
            if n.is_none() {
                r.errors.add("version", "The Version must be a valid integer");
            }
            n
        }
    };

    let mut patch = TaskPatch::at_version(version.unwrap_or_default());

    if r.present("title") {
        patch.title = r.title("title");
    }
    if r.present("description") {
        patch.description = Some(r.nullable_string("description"));
    }
    if r.present("status") {
        if is_blank(&r.body["status"]) {
            r.errors.add("status", "The status field is required.");
        } else {
            patch.status = r.status("status");
        }
    }
    if r.present("priority") {
        if is_blank(&r.body["priority"]) {
            r.errors.add("priority", "The priority field is required.");
        } else {
            patch.priority = r.priority("priority");
        }
    }
    if r.present("due_date") {
        patch.due_date = Some(r.nullable_date("due_date"));
    }
    if r.present("assigned_to") {
        patch.assigned_to = Some(r.nullable_integer("assigned_to"));
    }
    patch.tags = r.id_list("tags");
    if r.present("metadata") {
        patch.metadata = Some(r.metadata("metadata"));
    }

    r.into_parts(patch)
}

fn valid_color(color: &str) -> bool {
    let bytes = color.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

fn tag_name(r: &mut Reader<'_>) -> Option<String> {
    let name = r.required_string("name")?;
    if name.chars().count() > TAG_NAME_MAX {
        r.errors.add(
            "name",
            format!("The name may not be greater than {} characters.", TAG_NAME_MAX),
        );
        return None;
    }
    Some(name)
}

fn tag_color(r: &mut Reader<'_>) -> Option<String> {
    let color = r.nullable_string("color")?;
    if !valid_color(&color) {
        r.errors
            .add("color", "The color must be a hex color such as #1D4ED8.");
        return None;
    }
    Some(color)
}

pub fn parse_new_tag(body: &Value) -> Result<NewTag, ValidationErrors> {
    let mut r = Reader::new(body);
    let name = tag_name(&mut r);
    let color = tag_color(&mut r);
    r.finish(NewTag {
        name: name.unwrap_or_default(),
        color,
    })
}

pub fn parse_tag_patch(body: &Value) -> Result<TagPatch, ValidationErrors> {
    let mut r = Reader::new(body);
    let name = if r.present("name") { tag_name(&mut r) } else { None };
    let color = tag_color(&mut r);
    r.finish(TagPatch { name, color })
}

/// Credentials submitted to the login endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn parse_credentials(body: &Value) -> Result<Credentials, ValidationErrors> {
    let mut r = Reader::new(body);
    let email = r.required_string("email");
    let password = r.required_string("password");
    r.finish(Credentials {
        email: email.unwrap_or_default(),
        password: password.unwrap_or_default(),
    })
}
