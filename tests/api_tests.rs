//! API integration tests

use axum::body::Body;
use axum::Router;
use hyper::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use parley::AppState;

async fn setup_app() -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    // Run migrations manually
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            organizer_id TEXT NOT NULL,
            provider_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'negotiating', 'agreed', 'declined', 'in_progress', 'completed', 'cancelled')),
            engagement_status TEXT NOT NULL DEFAULT 'none' CHECK (engagement_status IN ('none', 'negotiating', 'active')),
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create requests table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS proposals (
            id TEXT PRIMARY KEY NOT NULL,
            request_id TEXT NOT NULL REFERENCES requests(id),
            from_actor_id TEXT NOT NULL,
            round INTEGER NOT NULL,
            parent_proposal_id TEXT REFERENCES proposals(id),
            quote_amount REAL,
            timeline TEXT,
            scope_ref TEXT,
            terms_ref TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted', 'rejected', 'superseded')),
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (request_id, round)
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create proposals table");

    let state = AppState::new(pool);
    parley::api::router().with_state(state)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Create a request with opening terms; returns (request_id, proposal_id)
async fn open_negotiation(app: &Router, organizer: Uuid, amount: f64) -> (String, String) {
    let (status, body) = post_json(
        app,
        "/requests",
        json!({
            "title": "Logo design",
            "description": "A logo for the launch",
            "organizer_id": organizer,
            "terms": { "quote_amount": amount, "timeline": "4 weeks" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let request_id = body["request"]["id"].as_str().unwrap().to_string();
    let proposal_id = body["active_proposal"]["id"].as_str().unwrap().to_string();
    (request_id, proposal_id)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_request_with_opening_terms() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();

    let (request_id, _) = open_negotiation(&app, organizer, 5000.0).await;

    let (status, body) = get_json(&app, &format!("/requests/{}/thread", request_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "pending");
    assert_eq!(body["round_count"], 1);
    assert_eq!(body["active_proposal"]["quote_amount"], 5000.0);
}

#[tokio::test]
async fn test_create_request_without_terms() {
    let app = setup_app().await;

    let (status, body) = post_json(
        &app,
        "/requests",
        json!({
            "title": "Untitled gig",
            "organizer_id": Uuid::new_v4(),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["round_count"], 0);
    assert!(body.get("active_proposal").is_none());
}

#[tokio::test]
async fn test_list_requests() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();

    open_negotiation(&app, organizer, 100.0).await;
    open_negotiation(&app, organizer, 200.0).await;

    let (status, body) = get_json(&app, "/requests").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_full_negotiation_over_http() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();
    let provider = Uuid::new_v4();

    let (request_id, p1) = open_negotiation(&app, organizer, 5000.0).await;

    // Provider counters at 4000; the timeline carries forward
    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/counter", request_id),
        json!({
            "actor_id": provider,
            "base_proposal_id": p1,
            "changes": { "quote_amount": 4000.0 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "negotiating");
    assert_eq!(body["active_proposal"]["round"], 2);
    assert_eq!(body["active_proposal"]["quote_amount"], 4000.0);
    assert_eq!(body["active_proposal"]["timeline"], "4 weeks");
    // The counter's author cannot act on it
    assert_eq!(body["actionable"], false);

    let p2 = body["active_proposal"]["id"].as_str().unwrap().to_string();

    // Organizer accepts
    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/accept", request_id),
        json!({ "actor_id": organizer, "proposal_id": p2 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "agreed");
    assert_eq!(body["request"]["engagement_status"], "active");
    assert_eq!(body["request"]["provider_id"], provider.to_string());
    assert_eq!(body["is_active_engagement"], true);

    // Delivery lifecycle
    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/delivery/start", request_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "in_progress");

    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/delivery/complete", request_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "completed");
}

#[tokio::test]
async fn test_self_action_is_forbidden() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();

    let (request_id, p1) = open_negotiation(&app, organizer, 1000.0).await;

    let (status, _) = post_json(
        &app,
        &format!("/requests/{}/accept", request_id),
        json!({ "actor_id": organizer, "proposal_id": p1 }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_double_submit_conflicts() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();

    let (request_id, _) = open_negotiation(&app, organizer, 1000.0).await;

    let (status, _) = post_json(
        &app,
        &format!("/requests/{}/proposals", request_id),
        json!({ "organizer_id": organizer, "terms": { "quote_amount": 900.0 } }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reject_round_one_declines_and_closes() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();
    let provider = Uuid::new_v4();

    let (request_id, p1) = open_negotiation(&app, organizer, 1000.0).await;

    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/reject", request_id),
        json!({ "actor_id": provider, "proposal_id": p1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "declined");
    assert_eq!(body["request"]["engagement_status"], "none");

    // Thread is closed for good
    let (status, _) = post_json(
        &app,
        &format!("/requests/{}/counter", request_id),
        json!({
            "actor_id": organizer,
            "base_proposal_id": p1,
            "changes": { "quote_amount": 800.0 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_terms_unprocessable() {
    let app = setup_app().await;

    let (status, _) = post_json(
        &app,
        "/requests",
        json!({
            "title": "Bad quote",
            "organizer_id": Uuid::new_v4(),
            "terms": { "quote_amount": -50.0 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_request_not_found() {
    let app = setup_app().await;

    let (status, _) = get_json(&app, &format!("/requests/{}/thread", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_request() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();

    let (request_id, _) = open_negotiation(&app, organizer, 1000.0).await;

    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/cancel", request_id),
        json!({ "actor_id": organizer }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "cancelled");
}

#[tokio::test]
async fn test_delivery_before_agreement_is_bad_request() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();

    let (request_id, _) = open_negotiation(&app, organizer, 1000.0).await;

    let (status, _) = post_json(
        &app,
        &format!("/requests/{}/delivery/start", request_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_directed_request_refuses_outsiders() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();
    let provider = Uuid::new_v4();
    let outsider = Uuid::new_v4();

    let (status, body) = post_json(
        &app,
        "/requests",
        json!({
            "title": "Logo design",
            "organizer_id": organizer,
            "provider_id": provider,
            "terms": { "quote_amount": 1000.0 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = body["request"]["id"].as_str().unwrap().to_string();
    let p1 = body["active_proposal"]["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        &app,
        &format!("/requests/{}/accept", request_id),
        json!({ "actor_id": outsider, "proposal_id": p1 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app,
        &format!("/requests/{}/accept", request_id),
        json!({ "actor_id": provider, "proposal_id": p1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "agreed");
}

#[tokio::test]
async fn test_thread_actionable_flag_for_actor() {
    let app = setup_app().await;
    let organizer = Uuid::new_v4();
    let provider = Uuid::new_v4();

    let (request_id, _) = open_negotiation(&app, organizer, 1000.0).await;

    let (status, body) = get_json(
        &app,
        &format!("/requests/{}/thread?actor_id={}", request_id, provider),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actionable"], true);

    let (_, body) = get_json(
        &app,
        &format!("/requests/{}/thread?actor_id={}", request_id, organizer),
    )
    .await;
    assert_eq!(body["actionable"], false);
}
