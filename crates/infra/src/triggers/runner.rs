use std::thread;

use chrono::Utc;
use tracing::{debug, error, warn};

use ripple_core::Entity;
use ripple_events::EventEnvelope;

use crate::retry::RetryPolicy;
use crate::store::{ChildQuery, ParentStore, StoreError, TxOutcome, run_transaction};

use super::{ConsistencyTrigger, RecomputeError, TriggerError};

type ParentId<T> = <<T as ConsistencyTrigger>::Parent as Entity>::Id;

/// Why one read-recompute-write cycle stopped.
enum CycleError {
    Store(StoreError),
    Recompute(RecomputeError),
}

impl From<StoreError> for CycleError {
    fn from(err: StoreError) -> Self {
        CycleError::Store(err)
    }
}

/// Result of reconciling one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentReport<I> {
    pub parent_id: I,
    pub outcome: TxOutcome,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReport<I> {
    /// The event carried no parent; nothing to recompute.
    Skipped,
    Reconciled(Vec<ParentReport<I>>),
}

/// Runs one trigger against one store with conflict retries.
#[derive(Debug)]
pub struct TriggerRunner<T, S> {
    trigger: T,
    store: S,
    retry: RetryPolicy,
}

impl<T, S> TriggerRunner<T, S>
where
    T: ConsistencyTrigger,
    S: ParentStore<T::Parent> + ChildQuery<T::Parent, T::Child>,
{
    pub fn new(trigger: T, store: S) -> Self {
        Self {
            trigger,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn trigger(&self) -> &T {
        &self.trigger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Recompute every parent linked to `event`.
    ///
    /// All linked parents are attempted even if one fails; the first failure
    /// is returned.
    pub fn handle(&self, event: &EventEnvelope) -> Result<TriggerReport<ParentId<T>>, TriggerError> {
        let parents = self.trigger.parent_ids(event);
        if parents.is_empty() {
            debug!(
                trigger = self.trigger.name(),
                event_id = %event.id(),
                event_type = event.event_type(),
                "child not linked to a parent; skipping"
            );
            return Ok(TriggerReport::Skipped);
        }

        let mut reports = Vec::with_capacity(parents.len());
        let mut first_error = None;
        for parent_id in parents {
            match self.reconcile(parent_id, event) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(TriggerReport::Reconciled(reports)),
        }
    }

    /// Recompute one parent outside of any event (manual reconciliation).
    pub fn reconcile_parent(&self, parent_id: ParentId<T>) -> Result<ParentReport<ParentId<T>>, TriggerError> {
        self.run_cycles(parent_id, None)
    }

    fn reconcile(
        &self,
        parent_id: ParentId<T>,
        event: &EventEnvelope,
    ) -> Result<ParentReport<ParentId<T>>, TriggerError> {
        self.run_cycles(parent_id, Some(event))
    }

    fn run_cycles(
        &self,
        parent_id: ParentId<T>,
        event: Option<&EventEnvelope>,
    ) -> Result<ParentReport<ParentId<T>>, TriggerError> {
        let trigger = self.trigger.name();
        let event_id = event.map(|e| e.id().to_string()).unwrap_or_default();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = run_transaction::<T::Parent, S, _, CycleError>(&self.store, parent_id, |parent| {
                let children =
                    <S as ChildQuery<T::Parent, T::Child>>::children_of(&self.store, parent_id)?;
                self.trigger
                    .recompute(parent, &children, Utc::now())
                    .map_err(CycleError::Recompute)
            });

            match result {
                Ok(outcome) => {
                    debug!(
                        trigger,
                        parent_id = %parent_id,
                        event_id = %event_id,
                        attempt,
                        committed = outcome.is_committed(),
                        version = outcome.version(),
                        "derived fields reconciled"
                    );
                    return Ok(ParentReport {
                        parent_id,
                        outcome,
                        attempts: attempt,
                    });
                }
                Err(CycleError::Recompute(RecomputeError::Overflow { field })) => {
                    error!(
                        trigger,
                        parent_id = %parent_id,
                        event_id = %event_id,
                        field,
                        "unresolved inconsistency: derived value overflowed, parent left unchanged"
                    );
                    return Err(TriggerError::Overflow {
                        trigger: trigger.to_string(),
                        parent_id: parent_id.to_string(),
                        field,
                    });
                }
                Err(CycleError::Store(StoreError::NotFound { .. })) => {
                    warn!(
                        trigger,
                        parent_id = %parent_id,
                        event_id = %event_id,
                        "parent not found; derived fields not updated"
                    );
                    return Err(TriggerError::ParentNotFound {
                        trigger: trigger.to_string(),
                        parent_id: parent_id.to_string(),
                    });
                }
                Err(CycleError::Store(err)) if err.is_conflict() => {
                    if self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for_attempt(attempt);
                        debug!(
                            trigger,
                            parent_id = %parent_id,
                            event_id = %event_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "write conflict; retrying recompute"
                        );
                        thread::sleep(delay);
                        continue;
                    }

                    error!(
                        trigger,
                        parent_id = %parent_id,
                        event_id = %event_id,
                        attempts = attempt,
                        error = %err,
                        "unresolved inconsistency: retries exhausted, manual reconciliation required"
                    );
                    return Err(TriggerError::Unresolved {
                        trigger: trigger.to_string(),
                        parent_id: parent_id.to_string(),
                        attempts: attempt,
                    });
                }
                Err(CycleError::Store(err)) => {
                    error!(
                        trigger,
                        parent_id = %parent_id,
                        event_id = %event_id,
                        error = %err,
                        "store failure during recompute"
                    );
                    return Err(TriggerError::Store {
                        trigger: trigger.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
}
