use std::collections::HashMap;
use std::sync::RwLock;

use ripple_core::{ExpectedVersion, ExpenseId, ProjectId, TaskId};

use crate::model::{Document, Expense, Project, Task};

use super::r#trait::{ChildQuery, ParentStore, StoreError, Versioned};

/// In-memory document store holding projects, expenses and tasks.
///
/// Intended for tests/dev and the demo binary. One `RwLock` per collection;
/// project writes check and bump the version under the write lock.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    projects: RwLock<HashMap<ProjectId, Versioned<Project>>>,
    expenses: RwLock<HashMap<ExpenseId, Expense>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or blindly replace) a project. New documents start at version 1.
    pub fn insert_project(&self, project: Project) -> ProjectId {
        let id = project.id;
        if let Ok(mut projects) = self.projects.write() {
            let version = projects.get(&id).map(|v| v.version + 1).unwrap_or(1);
            projects.insert(id, Versioned::new(version, project));
        }
        id
    }

    pub fn project(&self, id: ProjectId) -> Option<Versioned<Project>> {
        self.projects.read().ok()?.get(&id).cloned()
    }

    pub fn remove_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| StoreError::Poisoned(Project::COLLECTION))?;
        Ok(projects.remove(&id).map(|v| v.doc))
    }

    /// Insert or replace an expense, returning the previous document.
    pub fn put_expense(&self, expense: Expense) -> Result<Option<Expense>, StoreError> {
        let mut expenses = self
            .expenses
            .write()
            .map_err(|_| StoreError::Poisoned(Expense::COLLECTION))?;
        Ok(expenses.insert(expense.id, expense))
    }

    pub fn expense(&self, id: ExpenseId) -> Option<Expense> {
        self.expenses.read().ok()?.get(&id).cloned()
    }

    pub fn expense_count(&self) -> usize {
        self.expenses.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn remove_expense(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        let mut expenses = self
            .expenses
            .write()
            .map_err(|_| StoreError::Poisoned(Expense::COLLECTION))?;
        Ok(expenses.remove(&id))
    }

    /// Insert or replace a task, returning the previous document.
    pub fn put_task(&self, task: Task) -> Result<Option<Task>, StoreError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| StoreError::Poisoned(Task::COLLECTION))?;
        Ok(tasks.insert(task.id, task))
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().ok()?.get(&id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn remove_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| StoreError::Poisoned(Task::COLLECTION))?;
        Ok(tasks.remove(&id))
    }
}

impl ParentStore<Project> for InMemoryDocumentStore {
    fn read(&self, id: ProjectId) -> Result<Option<Versioned<Project>>, StoreError> {
        let projects = self
            .projects
            .read()
            .map_err(|_| StoreError::Poisoned(Project::COLLECTION))?;
        Ok(projects.get(&id).cloned())
    }

    fn write_if(&self, id: ProjectId, expected: ExpectedVersion, doc: Project) -> Result<u64, StoreError> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| StoreError::Poisoned(Project::COLLECTION))?;

        let current = projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found::<Project>(id))?;

        if !expected.matches(current.version) {
            return Err(StoreError::Conflict {
                collection: Project::COLLECTION,
                id: id.to_string(),
                expected,
                actual: current.version,
            });
        }

        current.version += 1;
        current.doc = doc;
        Ok(current.version)
    }
}

impl ChildQuery<Project, Expense> for InMemoryDocumentStore {
    fn children_of(&self, parent_id: ProjectId) -> Result<Vec<Expense>, StoreError> {
        let expenses = self
            .expenses
            .read()
            .map_err(|_| StoreError::Poisoned(Expense::COLLECTION))?;
        Ok(expenses
            .values()
            .filter(|e| e.project_id == Some(parent_id))
            .cloned()
            .collect())
    }
}

impl ChildQuery<Project, Task> for InMemoryDocumentStore {
    fn children_of(&self, parent_id: ProjectId) -> Result<Vec<Task>, StoreError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| StoreError::Poisoned(Task::COLLECTION))?;
        Ok(tasks
            .values()
            .filter(|t| t.project_id == Some(parent_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::Money;

    #[test]
    fn write_if_checks_version() {
        let store = InMemoryDocumentStore::new();
        let project = Project::new(ProjectId::new(), "p", Money::from_major(5));
        let id = store.insert_project(project.clone());

        assert_eq!(store.write_if(id, ExpectedVersion::Exact(1), project.clone()), Ok(2));
        let err = store
            .write_if(id, ExpectedVersion::Exact(1), project.clone())
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                collection: "projects",
                id: id.to_string(),
                expected: ExpectedVersion::Exact(1),
                actual: 2,
            }
        );
    }

    #[test]
    fn write_if_on_missing_parent_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let project = Project::new(ProjectId::new(), "p", Money::ZERO);
        let err = store.write_if(project.id, ExpectedVersion::Any, project).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn children_are_scoped_to_parent() {
        let store = InMemoryDocumentStore::new();
        let a = ProjectId::new();
        let b = ProjectId::new();
        store.put_expense(Expense::new(Some(a), Money::from_major(1))).unwrap();
        store.put_expense(Expense::new(Some(b), Money::from_major(2))).unwrap();
        store.put_expense(Expense::new(None, Money::from_major(3))).unwrap();
        store.put_task(Task::new(Some(a), true)).unwrap();

        let expenses = ChildQuery::<Project, Expense>::children_of(&store, a).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, Money::from_major(1));

        let tasks = ChildQuery::<Project, Task>::children_of(&store, a).unwrap();
        assert_eq!(tasks.len(), 1);
        let none = ChildQuery::<Project, Task>::children_of(&store, b).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn put_returns_previous_document() {
        let store = InMemoryDocumentStore::new();
        let mut expense = Expense::new(None, Money::from_major(1));
        assert_eq!(store.put_expense(expense.clone()).unwrap(), None);
        expense.amount = Money::from_major(9);
        let previous = store.put_expense(expense.clone()).unwrap().unwrap();
        assert_eq!(previous.amount, Money::from_major(1));
        assert_eq!(store.remove_expense(expense.id).unwrap(), Some(expense));
    }
}
