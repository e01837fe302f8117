//! Progress aggregation: percentage of completed tasks, rounded half-up.

use chrono::{DateTime, Utc};

use ripple_core::ProjectId;
use ripple_events::{EventEnvelope, EventPayload, SubscriptionPattern, types};

use crate::model::{Project, Task};
use crate::store::Recompute;

use super::{ConsistencyTrigger, RecomputeError, linked_parents};

/// `round_half_up(100 * completed / total)` in integer arithmetic.
///
/// `None` when `total == 0`.
pub fn progress_percent(completed: usize, total: usize) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    Some(((200 * completed + total) / (2 * total)) as u8)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTrigger;

impl ConsistencyTrigger for ProgressTrigger {
    type Parent = Project;
    type Child = Task;

    fn name(&self) -> &str {
        "progress-aggregation"
    }

    fn description(&self) -> &str {
        "Recomputes project progress from completed tasks"
    }

    fn bound_event_types(&self) -> Vec<SubscriptionPattern> {
        vec![
            SubscriptionPattern::exact(types::TASK_CREATED),
            SubscriptionPattern::exact(types::TASK_UPDATED),
            SubscriptionPattern::exact(types::TASK_DELETED),
        ]
    }

    fn parent_ids(&self, event: &EventEnvelope) -> Vec<ProjectId> {
        match event.data() {
            EventPayload::TaskCreated(t) | EventPayload::TaskUpdated(t) | EventPayload::TaskDeleted(t) => {
                linked_parents(t.project_id, t.previous_project_id)
            }
            _ => vec![],
        }
    }

    fn recompute(
        &self,
        project: &Project,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> Result<Recompute<Project>, RecomputeError> {
        let completed = tasks.iter().filter(|t| t.completed).count();
        // Zero tasks leaves whatever was there before.
        let Some(progress) = progress_percent(completed, tasks.len()) else {
            return Ok(Recompute::Unchanged);
        };
        if project.progress == Some(progress) {
            return Ok(Recompute::Unchanged);
        }

        let mut next = project.clone();
        next.progress = Some(progress);
        next.updated_at = now;
        Ok(Recompute::Write(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ripple_core::Money;

    #[test]
    fn rounds_half_up() {
        assert_eq!(progress_percent(1, 3), Some(33));
        assert_eq!(progress_percent(2, 3), Some(67));
        assert_eq!(progress_percent(1, 8), Some(13));
        assert_eq!(progress_percent(1, 200), Some(1));
        assert_eq!(progress_percent(0, 5), Some(0));
        assert_eq!(progress_percent(5, 5), Some(100));
        assert_eq!(progress_percent(0, 0), None);
    }

    #[test]
    fn zero_tasks_is_a_no_op() {
        let mut project = Project::new(ProjectId::new(), "p", Money::ZERO);
        project.progress = Some(40);
        assert_eq!(ProgressTrigger.recompute(&project, &[], Utc::now()), Ok(Recompute::Unchanged));
    }

    #[test]
    fn writes_new_percentage() {
        let project = Project::new(ProjectId::new(), "p", Money::ZERO);
        let tasks = vec![
            Task::new(Some(project.id), true),
            Task::new(Some(project.id), false),
            Task::new(Some(project.id), false),
        ];
        let Recompute::Write(next) = ProgressTrigger.recompute(&project, &tasks, Utc::now()).unwrap() else {
            panic!("expected a write");
        };
        assert_eq!(next.progress, Some(33));
    }

    proptest! {
        #[test]
        fn matches_decimal_half_up(total in 1usize..2_000, completed_frac in 0.0f64..=1.0) {
            let completed = ((total as f64) * completed_frac) as usize;
            let expected = (100.0 * completed as f64 / total as f64 + 0.5).floor() as u8;
            prop_assert_eq!(progress_percent(completed, total), Some(expected));
        }
    }
}
