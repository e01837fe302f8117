//! Stored documents: projects (parents) and their expense/task children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ripple_core::{Entity, ExpenseId, Money, ProjectId, TaskId};

/// A stored document kept in a named collection.
pub trait Document: Entity<Id: core::fmt::Display + Send + Sync> + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
}

/// A project and its derived aggregates.
///
/// `budget_spent`, `remaining_budget` and `progress` are owned by the
/// consistency triggers; business writes only touch `name` and `budget`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub budget: Money,
    pub budget_spent: Money,
    pub remaining_budget: Money,
    /// Completed-task percentage; `None` until the project has a task.
    pub progress: Option<u8>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>, budget: Money) -> Self {
        Self {
            id,
            name: name.into(),
            budget,
            budget_spent: Money::ZERO,
            remaining_budget: budget,
            progress: None,
            updated_at: Utc::now(),
        }
    }
}

impl Entity for Project {
    type Id = ProjectId;

    fn id(&self) -> ProjectId {
        self.id
    }
}

impl Document for Project {
    const COLLECTION: &'static str = "projects";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub amount: Money,
}

impl Expense {
    pub fn new(project_id: Option<ProjectId>, amount: Money) -> Self {
        Self {
            id: ExpenseId::new(),
            project_id,
            amount,
        }
    }
}

impl Entity for Expense {
    type Id = ExpenseId;

    fn id(&self) -> ExpenseId {
        self.id
    }
}

impl Document for Expense {
    const COLLECTION: &'static str = "expenses";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub completed: bool,
}

impl Task {
    pub fn new(project_id: Option<ProjectId>, completed: bool) -> Self {
        Self {
            id: TaskId::new(),
            project_id,
            completed,
        }
    }
}

impl Entity for Task {
    type Id = TaskId;

    fn id(&self) -> TaskId {
        self.id
    }
}

impl Document for Task {
    const COLLECTION: &'static str = "tasks";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_has_full_remaining_budget_and_no_progress() {
        let p = Project::new(ProjectId::new(), "Site build", Money::from_major(1000));
        assert_eq!(p.budget_spent, Money::ZERO);
        assert_eq!(p.remaining_budget, Money::from_major(1000));
        assert_eq!(p.progress, None);
    }

    #[test]
    fn project_serializes_snake_case_minor_units() {
        let p = Project::new(ProjectId::new(), "p", Money::from_minor(12_345));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["remaining_budget"], 12_345);
        assert!(json["progress"].is_null());
    }
}
