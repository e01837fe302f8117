//! Business-side writes for projects, expenses and tasks.
//!
//! Every operation follows the same order:
//!
//! ```text
//! 1. Write the document to the store
//!   ↓
//! 2. Emit the matching event (carrying current and previous parent ids)
//! ```
//!
//! The write is never undone because of anything that happens downstream.
//! If the bus rejects the event, the caller gets [`ServiceError::Publish`] and
//! the document stays written.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use ripple_core::{ExpenseId, Money, ProjectId, TaskId};
use ripple_events::{
    EmissionError, EventBus, EventMeta, EventPayload, ExpenseChanged, ProjectChanged, TaskChanged,
};

use crate::model::{Document, Expense, Project, Task};
use crate::store::{InMemoryDocumentStore, Recompute, StoreError, run_transaction};

const SOURCE: &str = "project-service";

/// Business writes race with trigger commits on the same project document.
const PROJECT_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The document was written but its event was rejected.
    #[error("written but not published: {0}")]
    Publish(#[from] EmissionError),
}

impl ServiceError {
    fn not_found<D: Document>(id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            collection: D::COLLECTION,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectService {
    store: Arc<InMemoryDocumentStore>,
    bus: EventBus,
}

impl ProjectService {
    pub fn new(store: Arc<InMemoryDocumentStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &Arc<InMemoryDocumentStore> {
        &self.store
    }

    fn publish(&self, payload: EventPayload) -> Result<(), ServiceError> {
        let receipt = self.bus.emit(payload, EventMeta::from_source(SOURCE))?;
        debug!(
            event_id = %receipt.event_id(),
            event_type = receipt.envelope.event_type(),
            handlers = receipt.handlers_invoked,
            "business event published"
        );
        Ok(())
    }

    pub fn create_project(&self, name: impl Into<String>, budget: Money) -> Result<Project, ServiceError> {
        let project = Project::new(ProjectId::new(), name, budget);
        self.store.insert_project(project.clone());
        self.publish(EventPayload::ProjectCreated(ProjectChanged { project_id: project.id }))?;
        Ok(project)
    }

    /// Change a project's budget. Derived fields are left to the triggers.
    pub fn set_project_budget(&self, id: ProjectId, budget: Money) -> Result<(), ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = run_transaction::<Project, _, _, StoreError>(self.store.as_ref(), id, |project| {
                let mut next = project.clone();
                next.budget = budget;
                Ok(Recompute::Write(next))
            });
            match result {
                Ok(_) => break,
                Err(StoreError::NotFound { .. }) => return Err(ServiceError::not_found::<Project>(id)),
                Err(err) if err.is_conflict() && attempt < PROJECT_WRITE_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
        self.publish(EventPayload::ProjectUpdated(ProjectChanged { project_id: id }))
    }

    pub fn create_expense(&self, project_id: Option<ProjectId>, amount: Money) -> Result<Expense, ServiceError> {
        let expense = Expense::new(project_id, amount);
        self.store.put_expense(expense.clone())?;
        self.publish(EventPayload::ExpenseCreated(ExpenseChanged {
            expense_id: expense.id,
            project_id,
            previous_project_id: None,
            amount: Some(amount),
        }))?;
        Ok(expense)
    }

    /// Replace an existing expense (amount and/or project link).
    pub fn update_expense(&self, expense: Expense) -> Result<(), ServiceError> {
        if self.store.expense(expense.id).is_none() {
            return Err(ServiceError::not_found::<Expense>(expense.id));
        }
        let previous = self.store.put_expense(expense.clone())?;
        let previous_project_id = previous
            .and_then(|p| p.project_id)
            .filter(|prev| Some(*prev) != expense.project_id);

        self.publish(EventPayload::ExpenseUpdated(ExpenseChanged {
            expense_id: expense.id,
            project_id: expense.project_id,
            previous_project_id,
            amount: Some(expense.amount),
        }))
    }

    pub fn delete_expense(&self, id: ExpenseId) -> Result<Expense, ServiceError> {
        let removed = self
            .store
            .remove_expense(id)?
            .ok_or_else(|| ServiceError::not_found::<Expense>(id))?;
        self.publish(EventPayload::ExpenseDeleted(ExpenseChanged {
            expense_id: id,
            project_id: removed.project_id,
            previous_project_id: None,
            amount: Some(removed.amount),
        }))?;
        Ok(removed)
    }

    pub fn create_task(&self, project_id: Option<ProjectId>, completed: bool) -> Result<Task, ServiceError> {
        let task = Task::new(project_id, completed);
        self.store.put_task(task.clone())?;
        self.publish(EventPayload::TaskCreated(TaskChanged {
            task_id: task.id,
            project_id,
            previous_project_id: None,
            completed: Some(completed),
        }))?;
        Ok(task)
    }

    pub fn update_task(&self, task: Task) -> Result<(), ServiceError> {
        if self.store.task(task.id).is_none() {
            return Err(ServiceError::not_found::<Task>(task.id));
        }
        let previous = self.store.put_task(task.clone())?;
        let previous_project_id = previous
            .and_then(|p| p.project_id)
            .filter(|prev| Some(*prev) != task.project_id);

        self.publish(EventPayload::TaskUpdated(TaskChanged {
            task_id: task.id,
            project_id: task.project_id,
            previous_project_id,
            completed: Some(task.completed),
        }))
    }

    pub fn set_task_completed(&self, id: TaskId, completed: bool) -> Result<(), ServiceError> {
        let mut task = self
            .store
            .task(id)
            .ok_or_else(|| ServiceError::not_found::<Task>(id))?;
        task.completed = completed;
        self.update_task(task)
    }

    pub fn delete_task(&self, id: TaskId) -> Result<Task, ServiceError> {
        let removed = self
            .store
            .remove_task(id)?
            .ok_or_else(|| ServiceError::not_found::<Task>(id))?;
        self.publish(EventPayload::TaskDeleted(TaskChanged {
            task_id: id,
            project_id: removed.project_id,
            previous_project_id: None,
            completed: Some(removed.completed),
        }))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_events::{EventEnvelope, SubscriptionPattern, types};
    use std::sync::Mutex;

    fn service() -> (ProjectService, Arc<Mutex<Vec<EventPayload>>>) {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(SubscriptionPattern::All, move |e: &EventEnvelope| {
            sink.lock().unwrap().push(e.data().clone());
            Ok(())
        });
        (ProjectService::new(Arc::new(InMemoryDocumentStore::new()), bus), seen)
    }

    #[test]
    fn moving_an_expense_reports_previous_project() {
        let (svc, seen) = service();
        let a = svc.create_project("a", Money::from_major(10)).unwrap();
        let b = svc.create_project("b", Money::from_major(10)).unwrap();
        let mut expense = svc.create_expense(Some(a.id), Money::from_major(3)).unwrap();

        expense.project_id = Some(b.id);
        svc.update_expense(expense.clone()).unwrap();

        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(
            last,
            EventPayload::ExpenseUpdated(ExpenseChanged {
                expense_id: expense.id,
                project_id: Some(b.id),
                previous_project_id: Some(a.id),
                amount: Some(Money::from_major(3)),
            })
        );
    }

    #[test]
    fn delete_carries_removed_parent() {
        let (svc, seen) = service();
        let p = svc.create_project("p", Money::ZERO).unwrap();
        let task = svc.create_task(Some(p.id), false).unwrap();
        svc.delete_task(task.id).unwrap();

        let events = seen.lock().unwrap();
        let EventPayload::TaskDeleted(deleted) = events.last().unwrap() else {
            panic!("expected task deletion");
        };
        assert_eq!(deleted.project_id, Some(p.id));
        assert_eq!(events.last().unwrap().event_type(), types::TASK_DELETED);
    }

    #[test]
    fn unknown_documents_are_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.delete_expense(ExpenseId::new()),
            Err(ServiceError::NotFound { collection: "expenses", .. })
        ));
        assert!(matches!(
            svc.set_project_budget(ProjectId::new(), Money::ZERO),
            Err(ServiceError::NotFound { collection: "projects", .. })
        ));
    }

    #[test]
    fn write_survives_rejected_publish() {
        let (svc, _) = service();
        svc.bus.dispose();
        let err = svc.create_expense(None, Money::from_major(1)).unwrap_err();
        assert!(matches!(err, ServiceError::Publish(EmissionError::Disposed)));
        assert_eq!(svc.store().expense_count(), 1);
    }
}
