use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ripple_automation::{EngineError, RegistryError, RuleError};
use ripple_events::EmissionError;
use ripple_infra::{ServiceError, StoreError};

pub fn emission_error_to_response(err: EmissionError) -> axum::response::Response {
    let code = match &err {
        EmissionError::MissingType => "missing_type",
        EmissionError::InvalidType(_) => "invalid_type",
        EmissionError::MalformedPayload { .. } => "malformed_payload",
        EmissionError::HopLimitExceeded { .. } => "hop_limit_exceeded",
        EmissionError::Disposed => "bus_disposed",
        EmissionError::Poisoned => {
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "bus_poisoned", err.to_string());
        }
    };
    json_error(StatusCode::BAD_REQUEST, code, err.to_string())
}

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Registry(RegistryError::UnknownAgent(id)) => {
            json_error(StatusCode::NOT_FOUND, "unknown_agent", format!("agent '{id}' is not registered"))
        }
        EngineError::Rule(RuleError::UnknownRule(id)) => {
            json_error(StatusCode::NOT_FOUND, "unknown_rule", format!("rule '{id}' does not exist"))
        }
        EngineError::Registry(e @ RegistryError::DuplicateAgent(_)) => {
            json_error(StatusCode::CONFLICT, "duplicate_agent", e.to_string())
        }
        EngineError::Rule(e @ RuleError::DuplicateRule(_)) => {
            json_error(StatusCode::CONFLICT, "duplicate_rule", e.to_string())
        }
        EngineError::Emission(e) => emission_error_to_response(e),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "engine_error", other.to_string()),
    }
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ServiceError::Store(e @ StoreError::Conflict { .. }) => {
            json_error(StatusCode::CONFLICT, "conflict", e.to_string())
        }
        ServiceError::Store(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
        // The write happened; only the notification was refused.
        ServiceError::Publish(e) => json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment, answering `400 invalid_id` on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
