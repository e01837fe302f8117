//! Operator controls: list and toggle agents and rules, read counters.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use ripple_core::{AgentId, RuleId};

use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(stats))
        .route("/agents", get(list_agents))
        .route("/agents/:id/enable", post(enable_agent))
        .route("/agents/:id/disable", post(disable_agent))
        .route("/rules", get(list_rules))
        .route("/rules/:id/enable", post(enable_rule))
        .route("/rules/:id/disable", post(disable_rule))
}

/// GET /stats
pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    (StatusCode::OK, Json(services.engine.stats())).into_response()
}

/// GET /agents
pub async fn list_agents(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let items = services.engine.list_agents();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn enable_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    toggle_agent(&services, &id, true)
}

pub async fn disable_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    toggle_agent(&services, &id, false)
}

fn toggle_agent(services: &AppServices, raw_id: &str, enabled: bool) -> axum::response::Response {
    let id: AgentId = match errors::parse_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = if enabled {
        services.engine.enable_agent(&id)
    } else {
        services.engine.disable_agent(&id)
    };
    if let Err(e) = result {
        return errors::engine_error_to_response(e);
    }
    info!(agent_id = %id, enabled, "agent toggled by operator");

    match services.engine.agents().get_agent(&id) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "unknown_agent", format!("agent '{id}' is not registered")),
    }
}

/// GET /rules
pub async fn list_rules(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let items = services.engine.list_rules();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn enable_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    toggle_rule(&services, &id, true)
}

pub async fn disable_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    toggle_rule(&services, &id, false)
}

fn toggle_rule(services: &AppServices, raw_id: &str, enabled: bool) -> axum::response::Response {
    let id: RuleId = match errors::parse_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = if enabled {
        services.engine.enable_rule(&id)
    } else {
        services.engine.disable_rule(&id)
    };
    if let Err(e) = result {
        return errors::engine_error_to_response(e);
    }
    info!(rule_id = %id, enabled, "rule toggled by operator");

    match services.engine.rules().get_rule(&id) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "unknown_rule", format!("rule '{id}' does not exist")),
    }
}
