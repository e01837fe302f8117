//! Event intake and recent-event inspection.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use ripple_events::{EventEnvelope, EventMeta};

use crate::app::dto::{EmitEventRequest, EmitEventResponse, RecentEventsQuery};
use crate::app::routes::blocking;
use crate::app::{errors, services::AppServices};

const DEFAULT_LIMIT: usize = 50;
const DEFAULT_SOURCE: &str = "api";

pub fn router() -> Router {
    Router::new().route("/events", get(recent_events).post(emit_event))
}

/// GET /events?limit=50
///
/// Most recent first. `limit` is capped at the bus history capacity.
pub async fn recent_events(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<RecentEventsQuery>,
) -> axum::response::Response {
    let capacity = services.engine.bus().config().capacity;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(capacity);
    let recent = services.engine.recent_events(limit);
    let items: Vec<&EventEnvelope> = recent.iter().map(|e| e.as_ref()).collect();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "items": items, "limit": limit })),
    )
        .into_response()
}

/// POST /events `{ "type": "invoice:paid", "data": {...}, "source": "billing" }`
pub async fn emit_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<EmitEventRequest>,
) -> axum::response::Response {
    let source = body.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    let result = blocking(move || {
        services
            .engine
            .emit_raw(&body.event_type, body.data, EventMeta::from_source(source))
    })
    .await;

    match result {
        Ok(Ok(receipt)) => (StatusCode::ACCEPTED, Json(EmitEventResponse::from(&receipt))).into_response(),
        Ok(Err(e)) => errors::emission_error_to_response(e),
        Err(resp) => resp,
    }
}
