use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use ripple_automation::{ActionDescriptor, PropagationRule};
use ripple_core::RuleId;
use ripple_events::{BusConfig, SubscriptionPattern};
use ripple_infra::EngineConfig;

use ripple_api::app::{AppServices, build_app, build_services};

fn services_with(config: EngineConfig) -> AppServices {
    build_services(&config, None).expect("services")
}

fn app() -> Router {
    build_app(services_with(EngineConfig::default()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_project(app: &Router, budget: i64) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/projects",
        Some(json!({ "name": "Website", "budget": budget })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn project(app: &Router, id: &str) -> Value {
    let (status, body) = send(app, Method::GET, &format!("/projects/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_is_ok() {
    let (status, _) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn lists_trigger_agents() {
    let (status, body) = send(&app(), Method::GET, "/agents", None).await;
    assert_eq!(status, StatusCode::OK);

    let mut ids: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, ["budget-aggregation", "progress-aggregation"]);
    assert!(body["items"][0]["enabled"].as_bool().unwrap());
}

#[tokio::test]
async fn budget_follows_expenses_over_http() {
    let app = app();
    let id = create_project(&app, 100_000).await;

    let (status, e1) = send(
        &app,
        Method::POST,
        "/expenses",
        Some(json!({ "project_id": id, "amount": 20_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    send(
        &app,
        Method::POST,
        "/expenses",
        Some(json!({ "project_id": id, "amount": 15_000 })),
    )
    .await;

    let p = project(&app, &id).await;
    assert_eq!(p["budget_spent"], 35_000);
    assert_eq!(p["remaining_budget"], 65_000);

    let e1_id = e1["id"].as_str().unwrap();
    let (status, _) = send(&app, Method::DELETE, &format!("/expenses/{e1_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let p = project(&app, &id).await;
    assert_eq!(p["budget_spent"], 15_000);
    assert_eq!(p["remaining_budget"], 85_000);
}

#[tokio::test]
async fn budget_edit_moves_remaining() {
    let app = app();
    let id = create_project(&app, 10_000).await;
    send(
        &app,
        Method::POST,
        "/expenses",
        Some(json!({ "project_id": id, "amount": 4_000 })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/projects/{id}/budget"),
        Some(json!({ "budget": 5_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining_budget"], 1_000);
}

#[tokio::test]
async fn progress_follows_task_completion() {
    let app = app();
    let id = create_project(&app, 0).await;

    let mut task_ids = Vec::new();
    for _ in 0..3 {
        let (_, task) = send(&app, Method::POST, "/tasks", Some(json!({ "project_id": id }))).await;
        task_ids.push(task["id"].as_str().unwrap().to_string());
    }
    assert_eq!(project(&app, &id).await["progress"], 0);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/tasks/{}/completed", task_ids[0]),
        Some(json!({ "completed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(project(&app, &id).await["progress"], 33);
}

#[tokio::test]
async fn disabled_agent_skips_recompute_until_next_event() {
    let app = app();
    let id = create_project(&app, 1_000).await;

    let (status, agent) = send(&app, Method::POST, "/agents/budget-aggregation/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["enabled"], false);

    send(
        &app,
        Method::POST,
        "/expenses",
        Some(json!({ "project_id": id, "amount": 100 })),
    )
    .await;
    assert_eq!(project(&app, &id).await["budget_spent"], 0);

    send(&app, Method::POST, "/agents/budget-aggregation/enable", None).await;
    send(
        &app,
        Method::POST,
        "/expenses",
        Some(json!({ "project_id": id, "amount": 50 })),
    )
    .await;
    assert_eq!(project(&app, &id).await["budget_spent"], 150);
}

#[tokio::test]
async fn unknown_ids_map_to_json_errors() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/agents/nope/enable", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_agent");

    let (status, body) = send(&app, Method::POST, "/rules/nope/disable", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_rule");

    let (status, body) = send(&app, Method::GET, "/projects/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn malformed_events_are_rejected() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/events",
        Some(json!({ "type": "has space", "data": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_type");

    let (status, body) = send(&app, Method::POST, "/events", Some(json!({ "type": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_type");

    let (status, body) = send(&app, Method::POST, "/events", Some(json!({ "type": "*" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_type");

    let (status, body) = send(
        &app,
        Method::POST,
        "/events",
        Some(json!({ "type": "expense:created", "data": { "amount": "lots" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformed_payload");

    let (_, stats) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(stats["total_events"], 0);
}

#[tokio::test]
async fn emitted_events_show_up_most_recent_first() {
    let app = app();
    for n in 0..3 {
        let (status, receipt) = send(
            &app,
            Method::POST,
            "/events",
            Some(json!({ "type": "crm:note_added", "data": { "n": n }, "source": "crm" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(receipt["type"], "crm:note_added");
        assert_eq!(receipt["hop"], 0);
    }

    let (status, body) = send(&app, Method::GET, "/events?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["data"]["n"], 2);
    assert_eq!(items[0]["source"], "crm");
    assert_eq!(items[1]["data"]["n"], 1);
}

#[tokio::test]
async fn event_limit_is_capped_at_capacity() {
    let config = EngineConfig::default().with_bus(BusConfig::default().with_capacity(3));
    let app = build_app(services_with(config));
    for _ in 0..5 {
        send(&app, Method::POST, "/events", Some(json!({ "type": "crm:ping" }))).await;
    }

    let (_, body) = send(&app, Method::GET, "/events?limit=100", None).await;
    assert_eq!(body["limit"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 3);

    let (_, stats) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(stats["total_events"], 5);
    assert_eq!(stats["recent_buffer_len"], 3);
}

#[tokio::test]
async fn rules_can_be_listed_and_toggled() {
    let services = services_with(EngineConfig::default());
    services
        .engine
        .add_rule(
            PropagationRule::new(
                RuleId::new("note-follow-up").unwrap(),
                "Follow up on notes",
                SubscriptionPattern::exact("crm:note_added"),
            )
            .then(ActionDescriptor::new(
                "emit",
                json!({ "type": "crm:followed_up", "data": {} }),
            )),
        )
        .unwrap();
    let app = build_app(services);

    send(&app, Method::POST, "/events", Some(json!({ "type": "crm:note_added" }))).await;
    let (_, body) = send(&app, Method::GET, "/events", None).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items[0]["type"], "crm:followed_up");
    assert_eq!(items[0]["hop"], 1);
    assert_eq!(items[0]["source"], "rule:note-follow-up");

    let (status, rule) = send(&app, Method::POST, "/rules/note-follow-up/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rule["enabled"], false);
    assert_eq!(rule["fired_count"], 1);

    send(&app, Method::POST, "/events", Some(json!({ "type": "crm:note_added" }))).await;
    let (_, stats) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(stats["total_events"], 3);
    assert_eq!(stats["propagation_rules"], 0);
    assert_eq!(stats["total_rules"], 1);

    let (_, rules) = send(&app, Method::GET, "/rules", None).await;
    assert_eq!(rules["items"][0]["id"], "note-follow-up");
}
