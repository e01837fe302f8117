//! Budget aggregation: `budget_spent = Σ expense.amount`,
//! `remaining_budget = budget - budget_spent`.

use chrono::{DateTime, Utc};

use ripple_core::{Money, ProjectId};
use ripple_events::{EventEnvelope, EventPayload, SubscriptionPattern, types};

use crate::model::{Expense, Project};
use crate::store::Recompute;

use super::{ConsistencyTrigger, RecomputeError, linked_parents};

#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetTrigger;

impl ConsistencyTrigger for BudgetTrigger {
    type Parent = Project;
    type Child = Expense;

    fn name(&self) -> &str {
        "budget-aggregation"
    }

    fn description(&self) -> &str {
        "Recomputes project budget_spent and remaining_budget from its expenses"
    }

    fn bound_event_types(&self) -> Vec<SubscriptionPattern> {
        vec![
            SubscriptionPattern::exact(types::EXPENSE_CREATED),
            SubscriptionPattern::exact(types::EXPENSE_UPDATED),
            SubscriptionPattern::exact(types::EXPENSE_DELETED),
            // A budget edit changes remaining_budget too.
            SubscriptionPattern::exact(types::PROJECT_UPDATED),
        ]
    }

    fn parent_ids(&self, event: &EventEnvelope) -> Vec<ProjectId> {
        match event.data() {
            EventPayload::ExpenseCreated(e) | EventPayload::ExpenseUpdated(e) | EventPayload::ExpenseDeleted(e) => {
                linked_parents(e.project_id, e.previous_project_id)
            }
            EventPayload::ProjectUpdated(p) => vec![p.project_id],
            _ => vec![],
        }
    }

    fn recompute(
        &self,
        project: &Project,
        expenses: &[Expense],
        now: DateTime<Utc>,
    ) -> Result<Recompute<Project>, RecomputeError> {
        let spent = Money::checked_sum(expenses.iter().map(|e| e.amount))
            .ok_or(RecomputeError::Overflow { field: "budget_spent" })?;
        let remaining = project
            .budget
            .checked_sub(spent)
            .ok_or(RecomputeError::Overflow {
                field: "remaining_budget",
            })?;

        if project.budget_spent == spent && project.remaining_budget == remaining {
            return Ok(Recompute::Unchanged);
        }

        let mut next = project.clone();
        next.budget_spent = spent;
        next.remaining_budget = remaining;
        next.updated_at = now;
        Ok(Recompute::Write(next))
    }
}
