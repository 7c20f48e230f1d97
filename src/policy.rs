//! Role-based access policy.
//!
//! Each check is a pure function of the actor and, where it applies, the
//! resource. Admins may act on any task; regular users only on tasks
//! assigned to them.

use crate::error::{AppError, AppResult};
use crate::types::{Actor, Task};

/// A capability that may be requested on tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    ViewAny,
    Create,
    View,
    Update,
    Delete,
    Restore,
    ForceDelete,
}

impl Ability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ability::ViewAny => "view_any",
            Ability::Create => "create",
            Ability::View => "view",
            Ability::Update => "update",
            Ability::Delete => "delete",
            Ability::Restore => "restore",
            Ability::ForceDelete => "force_delete",
        }
    }
}

fn owns_or_admin(actor: &Actor, task: Option<&Task>) -> bool {
    actor.is_admin() || task.is_some_and(|t| t.assigned_to == Some(actor.id))
}

/// Whether `actor` holds `ability`, optionally on a specific task.
pub fn allows(actor: &Actor, ability: Ability, task: Option<&Task>) -> bool {
    match ability {
        Ability::ViewAny | Ability::Create => true,
        Ability::View | Ability::Update | Ability::Delete | Ability::Restore => {
            owns_or_admin(actor, task)
        }
        // Permanent removal is reserved.
        Ability::ForceDelete => false,
    }
}

/// Like [`allows`] but signals a forbidden error.
pub fn authorize(actor: &Actor, ability: Ability, task: Option<&Task>) -> AppResult<()> {
    if allows(actor, ability, task) {
        Ok(())
    } else {
        tracing::warn!(
            actor = actor.id,
            ability = ability.as_str(),
            task_id = task.map(|t| t.id),
            "Access denied"
        );
        Err(AppError::Forbidden)
    }
}

/// Tags are shared vocabulary: anyone may read or add one, only admins may change or remove one.
pub mod tags {
    use crate::types::Actor;

    pub fn view_any(_actor: &Actor) -> bool {
        true
    }

    pub fn create(_actor: &Actor) -> bool {
        true
    }

    pub fn update(actor: &Actor) -> bool {
        actor.is_admin()
    }

    pub fn delete(actor: &Actor) -> bool {
        actor.is_admin()
    }
}
