use axum::Router;
use axum::http::StatusCode;

use crate::app::errors;

pub mod events;
pub mod operator;
pub mod projects;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .merge(operator::router())
        .merge(events::router())
        .merge(projects::router())
}

/// Run engine work off the async runtime: emits dispatch synchronously and
/// trigger retries sleep between attempts.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, axum::response::Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::error!(error = %e, "blocking task failed");
        errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "worker_failed", e.to_string())
    })
}
