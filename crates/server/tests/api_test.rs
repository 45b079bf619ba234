//! Integration tests for the HTTP API.
//!
//! The router is driven in-process through `tower::ServiceExt::oneshot`
//! against a temporary store.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tinyledger_chain::Ledger;
use tinyledger_server::{build_router, AppState};
use tinyledger_storage::Storage;
use tower::ServiceExt;

fn ready_app() -> (Router, AppState) {
    let ledger = Ledger::new(Storage::open_temporary().unwrap());
    ledger.ensure_genesis().unwrap();
    let state = AppState::new(ledger);
    state.mark_ready();
    (build_router(state.clone()), state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_logs_start_with_genesis() {
    let (app, _) = ready_app();

    let (status, body) = send(&app, get("/logs")).await;
    assert_eq!(status, StatusCode::OK);

    let blocks = body.as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["transaction"]["fromAddress"], "NULL");
    assert_eq!(blocks[0]["transaction"]["toAddress"], "0x0");
    assert_eq!(blocks[0]["transaction"]["amount"], 0);
    assert!(blocks[0].get("_id").is_none());
}

#[tokio::test]
async fn test_transfer_then_read() {
    let (app, state) = ready_app();
    let h0 = state.ledger().latest_block().unwrap().hash().to_hex();

    let (status, block) = send(
        &app,
        post_json(
            "/transfer",
            json!({"fromAddress": "alice", "toAddress": "bob", "amount": 50}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(block["prevHash"], h0);
    assert_eq!(block["transaction"]["fromAddress"], "alice");
    assert_eq!(block["transaction"]["amount"], 50);

    let (_, logs) = send(&app, get("/logs")).await;
    assert_eq!(logs[0], block);

    let (status, body) = send(&app, get("/balance/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"balance": -50}));

    let (_, body) = send(&app, get("/balance/bob")).await;
    assert_eq!(body, json!({"balance": 50}));

    let (_, body) = send(&app, get("/balance/nobody")).await;
    assert_eq!(body, json!({"balance": 0}));
}

#[tokio::test]
async fn test_transfer_missing_fields() {
    let (app, _) = ready_app();

    let (status, body) = send(&app, post_json("/transfer", json!({"fromAddress": "alice"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "toAddress, amount is missing");

    // Nothing was appended.
    let (_, logs) = send(&app, get("/logs")).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transfer_without_content_type_lists_every_field() {
    let (app, _) = ready_app();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/transfer")
        .body(Body::from(json!({"fromAddress": "alice"}).to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "fromAddress, toAddress, amount is missing");

    let (_, logs) = send(&app, get("/logs")).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transfer_malformed_body() {
    let (app, _) = ready_app();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/transfer")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, _) = send(
        &app,
        post_json(
            "/transfer",
            json!({"fromAddress": "a", "toAddress": "b", "amount": "lots"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_balance_without_address() {
    let (app, _) = ready_app();

    let (status, body) = send(&app, get("/balance/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Address not provided");
}

#[tokio::test]
async fn test_not_ready_rejects_requests() {
    let ledger = Ledger::new(Storage::open_temporary().unwrap());
    let app = build_router(AppState::new(ledger));

    let (status, body) = send(&app, get("/logs")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Service is not ready");

    let (status, _) = send(
        &app,
        post_json("/transfer", json!({"fromAddress": "a", "toAddress": "b", "amount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "starting");
}

#[tokio::test]
async fn test_health_when_ready() {
    let (app, _) = ready_app();

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_uninitialized_store_is_internal_error() {
    // Ready gate open but no genesis: the read fails inside the ledger.
    let state = AppState::new(Ledger::new(Storage::open_temporary().unwrap()));
    state.mark_ready();
    let app = build_router(state);

    let (status, body) = send(&app, get("/logs")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed reading blockchain history");

    let (status, body) = send(&app, get("/balance/alice")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Reading balance failed for address provided");

    let (status, body) = send(
        &app,
        post_json("/transfer", json!({"fromAddress": "a", "toAddress": "b", "amount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Transfer failed between recipients");
}

#[tokio::test]
async fn test_cors_headers() {
    let (app, _) = ready_app();

    let req = Request::builder()
        .uri("/logs")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://example.com"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/transfer")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");
    let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_string();
    for method in ["GET", "POST", "OPTIONS"] {
        assert!(methods.contains(method), "{} missing from {}", method, methods);
    }
}
