//! Seed subcommand: demo accounts, a tag palette and a handful of tasks.
//!
//! Seeding is idempotent: if the admin account already exists nothing is written.

use crate::db::Database;
use crate::types::{NewTag, NewTask, Role, TaskPriority, TaskStatus};
use anyhow::Result;

pub const SEED_PASSWORD: &str = "password";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const DEMO_EMAIL: &str = "demo@example.com";

const TAGS: &[(&str, &str)] = &[
    ("Content Marketing", "#DB2777"),
    ("Search Engine Optimization", "#7C3AED"),
    ("Social Media Marketing", "#2563EB"),
    ("Backend Development", "#0891B2"),
    ("Email Marketing", "#059669"),
    ("Data Analytics & Reporting", "#65A30D"),
    ("Frontend Development", "#CA8A04"),
    ("UX/UI Design", "#EA580C"),
    ("Account Management", "#DC2626"),
    ("Video Production", "#6B7280"),
];

/// What a seed run wrote.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub tags: usize,
    pub tasks: usize,
}

pub fn run(db: &Database) -> Result<SeedReport> {
    if db.find_user_by_email(ADMIN_EMAIL)?.is_some() {
        tracing::info!("Seed data already present");
        return Ok(SeedReport::default());
    }

    let admin = db.create_user("Admin", ADMIN_EMAIL, SEED_PASSWORD, Role::Admin)?;
    let demo = db.create_user("Demo User", DEMO_EMAIL, SEED_PASSWORD, Role::User)?;

    let mut tag_ids = Vec::with_capacity(TAGS.len());
    for (name, color) in TAGS {
        let tag = db.create_tag(&NewTag {
            name: name.to_string(),
            color: Some(color.to_string()),
        })?;
        tag_ids.push(tag.id);
    }

    let tasks = [
        ("Draft the quarterly content plan", TaskStatus::Pending, TaskPriority::High, admin.id),
        ("Audit landing page keywords", TaskStatus::InProgress, TaskPriority::Medium, demo.id),
        ("Fix the signup form validation", TaskStatus::Pending, TaskPriority::High, demo.id),
        ("Publish the onboarding video", TaskStatus::Completed, TaskPriority::Low, admin.id),
    ];
    for (i, (title, status, priority, assignee)) in tasks.iter().enumerate() {
        let input = NewTask {
            status: *status,
            priority: *priority,
            assigned_to: Some(*assignee),
            tags: Some(vec![tag_ids[i % tag_ids.len()], tag_ids[(i + 3) % tag_ids.len()]]),
            ..NewTask::titled(*title)
        };
        db.insert_task(None, &input)?;
    }

    let report = SeedReport {
        users: 2,
        tags: tag_ids.len(),
        tasks: tasks.len(),
    };
    tracing::info!(?report, "Seeded database");
    Ok(report)
}
