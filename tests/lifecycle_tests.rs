//! Integration tests for the task lifecycle.
//!
//! These run every operation through `TaskLifecycle` against an in-memory
//! database, so authorization, business rules and audit logging are all in play.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use taskdesk::db::Database;
use taskdesk::error::AppError;
use taskdesk::lifecycle::{DUE_DATE_PAST_MESSAGE, TaskLifecycle};
use taskdesk::types::{Actor, NewTag, NewTask, OperationType, Role, TagPatch, TaskPatch, TaskStatus};

struct Fixture {
    lifecycle: TaskLifecycle,
    admin: Actor,
    alice: Actor,
    bob: Actor,
}

fn setup() -> Fixture {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let admin = db
        .create_user("Admin", "admin@example.com", "password", Role::Admin)
        .unwrap();
    let alice = db
        .create_user("Alice", "alice@example.com", "password", Role::User)
        .unwrap();
    let bob = db
        .create_user("Bob", "bob@example.com", "password", Role::User)
        .unwrap();
    Fixture {
        lifecycle: TaskLifecycle::new(db),
        admin: admin.actor(),
        alice: alice.actor(),
        bob: bob.actor(),
    }
}

fn assigned(title: &str, user: &Actor) -> NewTask {
    NewTask {
        assigned_to: Some(user.id),
        ..NewTask::titled(title)
    }
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

mod visibility {
    use super::*;

    #[test]
    fn users_only_see_their_own_tasks() {
        let f = setup();
        f.lifecycle.create(&f.admin, assigned("for alice", &f.alice)).unwrap();
        f.lifecycle.create(&f.admin, assigned("for bob", &f.bob)).unwrap();
        f.lifecycle.create(&f.admin, NewTask::titled("unassigned")).unwrap();

        let page = f.lifecycle.list(&f.alice, &HashMap::new()).unwrap();
        let titles: Vec<_> = page.items.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["for alice"]);

        let page = f.lifecycle.list(&f.admin, &HashMap::new()).unwrap();
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn show_of_another_users_task_is_forbidden() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("private", &f.bob)).unwrap();

        let err = f.lifecycle.show(&f.alice, task.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let shown = f.lifecycle.show(&f.bob, task.id).unwrap();
        assert_eq!(shown.user.map(|u| u.name), Some("Bob".to_string()));
    }

    #[test]
    fn users_may_add_tags_but_only_admins_remove_them() {
        let f = setup();
        let tag = f
            .lifecycle
            .create_tag(
                &f.alice,
                NewTag {
                    name: "Ops".into(),
                    color: None,
                },
            )
            .unwrap();

        let err = f.lifecycle.delete_tag(&f.alice, tag.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        let err = f
            .lifecycle
            .update_tag(&f.bob, tag.id, TagPatch::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        f.lifecycle.delete_tag(&f.admin, tag.id).unwrap();
        assert!(f.lifecycle.list_tags(&f.alice).unwrap().is_empty());
    }

    #[test]
    fn invalid_list_parameters_are_reported_together() {
        let f = setup();
        let err = f
            .lifecycle
            .list(&f.admin, &params(&[("status", "archived"), ("sort_by", "colour")]))
            .unwrap_err();
        let errors = err.validation_errors().expect("validation error");
        assert!(errors.has("status"));
        assert!(errors.has("sort_by"));
    }
}

mod due_dates {
    use super::*;

    #[test]
    fn open_task_due_yesterday_is_rejected() {
        let f = setup();
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        let input = NewTask {
            due_date: Some(yesterday),
            ..NewTask::titled("Late report")
        };

        let err = f.lifecycle.create(&f.alice, input).unwrap_err();
        let errors = err.validation_errors().expect("validation error");
        assert_eq!(errors.messages("due_date"), [DUE_DATE_PAST_MESSAGE.to_string()]);
    }

    #[test]
    fn completed_task_may_carry_a_past_due_date() {
        let f = setup();
        let input = NewTask {
            status: TaskStatus::Completed,
            due_date: Some(Utc::now().date_naive() - Duration::days(30)),
            ..NewTask::titled("done long ago")
        };
        assert!(f.lifecycle.create(&f.alice, input).is_ok());
    }

    #[test]
    fn today_is_not_in_the_past() {
        let f = setup();
        let input = NewTask {
            due_date: Some(Utc::now().date_naive()),
            ..NewTask::titled("due today")
        };
        assert!(f.lifecycle.create(&f.alice, input).is_ok());
    }

    #[test]
    fn update_checks_due_date_against_resulting_status() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("Triage inbox", &f.alice)).unwrap();
        let past = Utc::now().date_naive() - Duration::days(2);

        let mut patch = TaskPatch::at_version(task.version);
        patch.due_date = Some(Some(past));
        assert!(f.lifecycle.update(&f.alice, task.id, patch.clone()).is_err());

        patch.status = Some(TaskStatus::Completed);
        let updated = f.lifecycle.update(&f.alice, task.id, patch).unwrap();
        assert_eq!(updated.due_date, Some(past));
    }

    #[test]
    fn reopening_an_overdue_task_is_rejected() {
        let f = setup();
        let input = NewTask {
            status: TaskStatus::Completed,
            due_date: Some(Utc::now().date_naive() - Duration::days(3)),
            ..assigned("Finished late", &f.alice)
        };
        let task = f.lifecycle.create(&f.admin, input).unwrap();

        let mut reopen = TaskPatch::at_version(task.version);
        reopen.status = Some(TaskStatus::Pending);
        let err = f.lifecycle.update(&f.alice, task.id, reopen).unwrap_err();
        let errors = err.validation_errors().expect("validation error");
        assert_eq!(errors.messages("due_date"), [DUE_DATE_PAST_MESSAGE.to_string()]);
        let stored = f.lifecycle.show(&f.alice, task.id).unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);

        // Reopening with a fresh due date, or editing other fields, is fine.
        let mut rename = TaskPatch::at_version(task.version);
        rename.title = Some("Finished late, renamed".into());
        let renamed = f.lifecycle.update(&f.alice, task.id, rename).unwrap();

        let mut reschedule = TaskPatch::at_version(renamed.version);
        reschedule.status = Some(TaskStatus::InProgress);
        reschedule.due_date = Some(Some(Utc::now().date_naive() + Duration::days(7)));
        let reopened = f.lifecycle.update(&f.alice, task.id, reschedule).unwrap();
        assert_eq!(reopened.status, TaskStatus::InProgress);
    }
}

mod validation {
    use super::*;

    #[test]
    fn create_enforces_title_length() {
        let f = setup();
        for title in ["".to_string(), "t".to_string(), "x".repeat(400)] {
            let err = f.lifecycle.create(&f.admin, NewTask::titled(title.clone())).unwrap_err();
            assert!(
                err.validation_errors().is_some_and(|e| e.has("title")),
                "title of {} chars accepted",
                title.len()
            );
        }
        assert!(f.lifecycle.create(&f.admin, NewTask::titled("Fiver")).is_ok());
    }

    #[test]
    fn update_enforces_title_length() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, NewTask::titled("Valid title")).unwrap();
        let mut patch = TaskPatch::at_version(task.version);
        patch.title = Some(String::new());

        let err = f.lifecycle.update(&f.admin, task.id, patch).unwrap_err();
        assert!(err.validation_errors().unwrap().has("title"));
        let stored = f.lifecycle.show(&f.admin, task.id).unwrap();
        assert_eq!(stored.title, "Valid title");
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn rule_and_reference_failures_are_reported_together() {
        let f = setup();
        let input = NewTask {
            due_date: Some(Utc::now().date_naive() - Duration::days(1)),
            assigned_to: Some(9_999),
            tags: Some(vec![4_242]),
            ..NewTask::titled("x")
        };

        let err = f.lifecycle.create(&f.admin, input).unwrap_err();
        let errors = err.validation_errors().expect("validation error");
        for field in ["title", "due_date", "assigned_to", "tags.0"] {
            assert!(errors.has(field), "missing {}", field);
        }
    }

    #[test]
    fn reader_errors_merge_with_rule_checks() {
        let f = setup();
        let mut pending = taskdesk::error::ValidationErrors::new();
        pending.add("priority", "The selected priority is invalid.");
        let input = NewTask {
            due_date: Some(Utc::now().date_naive() - Duration::days(1)),
            ..NewTask::titled("Looks fine")
        };

        let err = f.lifecycle.create_with(&f.admin, input, pending).unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert!(errors.has("priority"));
        assert!(errors.has("due_date"));
    }
}

mod versioning {
    use super::*;

    #[test]
    fn second_writer_with_same_version_conflicts() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("shared", &f.alice)).unwrap();
        assert_eq!(task.version, 1);

        let mut first = TaskPatch::at_version(1);
        first.title = Some("first".into());
        let updated = f.lifecycle.update(&f.alice, task.id, first).unwrap();
        assert_eq!(updated.version, 2);

        let mut second = TaskPatch::at_version(1);
        second.title = Some("second".into());
        let err = f.lifecycle.update(&f.admin, task.id, second).unwrap_err();
        assert!(err.is_conflict());

        let current = f.lifecycle.show(&f.alice, task.id).unwrap();
        assert_eq!(current.title, "first");
        assert_eq!(current.version, 2);
    }

    #[test]
    fn toggle_cycles_through_all_statuses() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("cycle", &f.alice)).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(f.lifecycle.toggle_status(&f.alice, task.id).unwrap().status);
        }
        assert_eq!(
            seen,
            [TaskStatus::InProgress, TaskStatus::Completed, TaskStatus::Pending]
        );

        let current = f.lifecycle.show(&f.alice, task.id).unwrap();
        assert_eq!(current.version, 1);
    }

    #[test]
    fn toggle_of_another_users_task_is_forbidden() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("bob's", &f.bob)).unwrap();
        let err = f.lifecycle.toggle_status(&f.alice, task.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}

mod soft_delete {
    use super::*;

    #[test]
    fn deleted_tasks_disappear_until_restored() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("ephemeral", &f.alice)).unwrap();

        f.lifecycle.delete(&f.alice, task.id).unwrap();
        assert!(matches!(
            f.lifecycle.show(&f.alice, task.id).unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(f.lifecycle.list(&f.alice, &HashMap::new()).unwrap().items.is_empty());

        let trashed = f
            .lifecycle
            .list(&f.admin, &params(&[("with_trashed", "true")]))
            .unwrap();
        assert_eq!(trashed.items.len(), 1);
        assert!(trashed.items[0].deleted_at.is_some());

        let restored = f.lifecycle.restore(&f.admin, task.id).unwrap();
        assert!(restored.deleted_at.is_none());
        assert_eq!(f.lifecycle.list(&f.alice, &HashMap::new()).unwrap().items.len(), 1);
    }

    #[test]
    fn deleting_twice_is_not_found() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, NewTask::titled("Delete once")).unwrap();
        f.lifecycle.delete(&f.admin, task.id).unwrap();
        assert!(matches!(
            f.lifecycle.delete(&f.admin, task.id).unwrap_err(),
            AppError::NotFound { .. }
        ));
    }

    #[test]
    fn history_survives_deletion_newest_first() {
        let f = setup();
        let task = f.lifecycle.create(&f.admin, assigned("audited", &f.alice)).unwrap();
        let mut patch = TaskPatch::at_version(1);
        patch.title = Some("audited twice".into());
        f.lifecycle.update(&f.alice, task.id, patch).unwrap();
        f.lifecycle.delete(&f.alice, task.id).unwrap();

        let history = f.lifecycle.history(&f.admin, task.id).unwrap();
        let ops: Vec<_> = history.iter().map(|l| l.operation_type).collect();
        assert_eq!(
            ops,
            [OperationType::Delete, OperationType::Update, OperationType::Create]
        );
        assert_eq!(history[1].user_id, Some(f.alice.id));
        assert_eq!(history[1].changes["title"], "audited twice");
    }
}
