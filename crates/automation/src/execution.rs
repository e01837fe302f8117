//! Guarded execution of agent bodies and rule actions: panic capture and
//! timeouts.
//!
//! - Without a timeout the body runs inline on the emitting thread.
//! - With a timeout the body runs on a named worker thread and the caller
//!   waits at most `timeout`. A timed-out body keeps running detached; its
//!   eventual result is discarded.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use ripple_events::panic_message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("execution failed: {0}")]
    Failed(String),

    #[error("execution panicked: {0}")]
    Panicked(String),

    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::TimedOut(_))
    }
}

/// Run `body` on the current thread, converting a panic into an error.
pub fn run_inline<T, F>(body: F) -> Result<T, ExecutionError>
where
    F: FnOnce() -> Result<T, String>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(msg)) => Err(ExecutionError::Failed(msg)),
        Err(panic) => Err(ExecutionError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Run `body` on a worker thread named `name`, waiting at most `timeout`.
pub fn run_with_timeout<T, F>(name: &str, timeout: Duration, body: F) -> Result<T, ExecutionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            // Receiver may be gone after a timeout; nothing to report then.
            let _ = tx.send(run_inline(body));
        })
        .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ExecutionError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExecutionError::Panicked(
            "worker exited without reporting".to_string(),
        )),
    }
}
