//! Tracing/logging initialization.
//!
//! Structured JSON by default so that the `event_id`, `agent_id`, `rule_id`
//! and `parent_id` fields emitted across the engine are queryable. Filtering
//! follows `RUST_LOG` (default `info`); `RIPPLE_LOG_FORMAT=pretty` switches to
//! human-readable output for local runs.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Read `RIPPLE_LOG_FORMAT`; anything unrecognised means JSON.
    pub fn from_env() -> Self {
        match std::env::var("RIPPLE_LOG_FORMAT").as_deref() {
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize tracing using `RIPPLE_LOG_FORMAT` and `RUST_LOG`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(LogFormat::from_env());
}

pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_thread_names(true);

    // A subscriber may already be installed (tests, embedding hosts).
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
