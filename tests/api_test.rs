use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use raspadinha::{
    api::{build_app, AppState},
    config::RaspadinhaConfig,
    Platform,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

fn test_app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RaspadinhaConfig::default();
    config.storage.data_directory = dir.path().to_string_lossy().into_owned();

    let platform = Platform::open(&config).unwrap();
    let state = Arc::new(AppState {
        platform,
        admin_key: Some(ADMIN_KEY.to_string()),
        metrics_enabled: true,
        version: "test".to_string(),
    });
    (dir, build_app(state, &config))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(_) => builder.header(header::CONTENT_TYPE, "application/json"),
        None => builder,
    }
}

async fn send(app: &Router, builder: axum::http::request::Builder, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn admin(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = request(method, uri, body.clone()).header("x-admin-key", ADMIN_KEY);
    send(app, builder, body).await
}

async fn player(
    app: &Router,
    user_id: u64,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = request(method, uri, body.clone()).header("x-user-id", user_id.to_string());
    send(app, builder, body).await
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

/// Creates a game whose only outcome pays `prize`
async fn certain_win_game(app: &Router, price: &str, prize: &str) -> u64 {
    let (status, game) = admin(
        app,
        Method::POST,
        "/admin/games",
        Some(json!({ "name": "Certeira", "price": price, "target_rtp": "90" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let game_id = game["id"].as_u64().unwrap();

    let (status, _) = admin(
        app,
        Method::PUT,
        &format!("/admin/games/{}/prizes", game_id),
        Some(json!({ "prizes": [{ "prize_value": prize, "probability": "1" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    game_id
}

async fn funded_user(app: &Router, amount: &str) -> u64 {
    let (status, user) = admin(app, Method::POST, "/admin/users", Some(json!({ "name": "ana" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = user["id"].as_u64().unwrap();

    let (status, _) = admin(
        app,
        Method::POST,
        &format!("/admin/users/{}/deposit", user_id),
        Some(json!({ "amount": amount })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    user_id
}

#[tokio::test]
async fn test_health_and_request_id() {
    let (_dir, app) = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_play_flow() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "10.00", "25.00").await;
    let user_id = funded_user(&app, "10.00").await;

    let (status, body) = player(&app, user_id, Method::POST, &format!("/games/{}/play", game_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isWinner"], true);
    assert_eq!(decimal(&body["prizeValue"]), Decimal::from(25));
    assert_eq!(decimal(&body["multiplier"]), Decimal::from_str("2.5").unwrap());
    assert_eq!(decimal(&body["newBalance"]), Decimal::from(25));
    assert_eq!(body["ledgerEntryIds"].as_array().unwrap().len(), 2);
    assert!(body["message"].as_str().unwrap().contains("won"));

    let (status, balance) = player(&app, user_id, Method::GET, "/me/balance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&balance["balance"]), Decimal::from(25));

    let (_, plays) = player(&app, user_id, Method::GET, "/me/plays", None).await;
    assert_eq!(plays["total_returned"], 1);
    assert_eq!(plays["items"][0]["id"], body["playId"]);

    let (_, transactions) = player(&app, user_id, Method::GET, "/me/transactions?limit=10", None).await;
    let kinds: Vec<&str> = transactions["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["prize", "game_cost", "deposit"]);
}

#[tokio::test]
async fn test_play_requires_user_header() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "1.00", "2.00").await;

    let (status, body) = send(
        &app,
        request(Method::POST, &format!("/games/{}/play", game_id), None),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(!body["request_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_play_rejections_map_to_status_codes() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "5.00", "6.00").await;
    let user_id = funded_user(&app, "4.99").await;

    let (status, body) = player(&app, user_id, Method::POST, &format!("/games/{}/play", game_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = player(&app, user_id, Method::POST, "/games/999/play", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, game) = admin(
        &app,
        Method::POST,
        "/admin/games",
        Some(json!({ "name": "Vazia", "price": "1.00", "target_rtp": "90" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = player(
        &app,
        user_id,
        Method::POST,
        &format!("/games/{}/play", game["id"]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "GAME_MISCONFIGURED");

    let (status, _) = admin(
        &app,
        Method::POST,
        &format!("/admin/games/{}/status", game_id),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = player(&app, user_id, Method::POST, &format!("/games/{}/play", game_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "GAME_UNAVAILABLE");

    let (_, balance) = player(&app, user_id, Method::GET, "/me/balance", None).await;
    assert_eq!(decimal(&balance["balance"]), Decimal::from_str("4.99").unwrap());
}

#[tokio::test]
async fn test_price_guard_in_body() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "3.00", "3.00").await;
    let user_id = funded_user(&app, "3.00").await;
    let uri = format!("/games/{}/play", game_id);

    let (status, body) = player(&app, user_id, Method::POST, &uri, Some(json!({ "expectedPrice": "2.00" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = player(&app, user_id, Method::POST, &uri, Some(json!({ "expectedPrice": "3.00" }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let (_dir, app) = test_app();
    let body = json!({ "name": "Sem chave", "price": "1.00", "target_rtp": "90" });

    let (status, response) = send(
        &app,
        request(Method::POST, "/admin/games", Some(body.clone())),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["code"], "FORBIDDEN");

    let (status, _) = send(
        &app,
        request(Method::POST, "/admin/games", Some(body.clone())).header("x-admin-key", "wrong"),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, games) = admin(&app, Method::GET, "/admin/games", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(games.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_payout_table_is_rejected() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "1.00", "1.00").await;

    let (status, body) = admin(
        &app,
        Method::PUT,
        &format!("/admin/games/{}/prizes", game_id),
        Some(json!({ "prizes": [
            { "prize_value": "0", "probability": "0.8" },
            { "prize_value": "5", "probability": "0.3" }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("above 1"));

    let (_, details) = send(&app, request(Method::GET, &format!("/games/{}", game_id), None), None).await;
    assert_eq!(details["prizes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_withdrawal_round_trip() {
    let (_dir, app) = test_app();
    let user_id = funded_user(&app, "40.00").await;

    let (status, entry) = player(
        &app,
        user_id,
        Method::POST,
        "/me/withdrawals",
        Some(json!({ "amount": "15.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["status"], "pending");

    let (status, cancelled) = admin(
        &app,
        Method::POST,
        &format!("/admin/withdrawals/{}/cancel", entry["id"]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = admin(
        &app,
        Method::POST,
        &format!("/admin/withdrawals/{}/approve", entry["id"]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, balance) = player(&app, user_id, Method::GET, "/me/balance", None).await;
    assert_eq!(decimal(&balance["balance"]), Decimal::from(40));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "1.00", "2.00").await;
    let user_id = funded_user(&app, "1.00").await;
    player(&app, user_id, Method::POST, &format!("/games/{}/play", game_id), None).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("raspadinha_plays_total{outcome=\"win\"} 1"));
}

#[tokio::test]
async fn test_malformed_price_guard_is_rejected() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "3.00", "3.00").await;
    let user_id = funded_user(&app, "6.00").await;
    let uri = format!("/games/{}/play", game_id);

    let (status, body) = player(&app, user_id, Method::POST, &uri, Some(json!({ "expectedPrice": "abc" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // A guard sent without a content type is still honoured
    let guard = json!({ "expectedPrice": "2.00" });
    let builder = Request::builder()
        .method(Method::POST)
        .uri(&uri)
        .header("x-user-id", user_id.to_string());
    let (status, body) = send(&app, builder, Some(guard)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("price changed"));

    let (_, balance) = player(&app, user_id, Method::GET, "/me/balance", None).await;
    assert_eq!(decimal(&balance["balance"]), Decimal::from(6));

    // No body at all means no guard
    let (status, _) = player(&app, user_id, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_play_by_unknown_user_is_not_found() {
    let (_dir, app) = test_app();
    let game_id = certain_win_game(&app, "1.00", "2.00").await;

    let (status, body) = player(&app, 4242, Method::POST, &format!("/games/{}/play", game_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = admin(&app, Method::GET, "/admin/users/4242", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_operator_finds_and_resolves_pending_withdrawals() {
    let (_dir, app) = test_app();
    let user_id = funded_user(&app, "30.00").await;

    for amount in ["10.00", "5.00"] {
        let (status, _) = player(
            &app,
            user_id,
            Method::POST,
            "/me/withdrawals",
            Some(json!({ "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, pending) = admin(&app, Method::GET, "/admin/withdrawals/pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["total_returned"], 2);
    let oldest = &pending["items"][0];
    assert_eq!(oldest["user_id"], user_id);
    assert_eq!(decimal(&oldest["amount"]), Decimal::from(10));

    let (status, _) = admin(
        &app,
        Method::POST,
        &format!("/admin/withdrawals/{}/approve", oldest["id"]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, pending) = admin(&app, Method::GET, "/admin/withdrawals/pending", None).await;
    assert_eq!(pending["total_returned"], 1);
    assert_eq!(decimal(&pending["items"][0]["amount"]), Decimal::from(5));

    let (status, details) = admin(&app, Method::GET, &format!("/admin/users/{}?limit=2", user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["user"]["id"], user_id);
    assert_eq!(decimal(&details["user"]["balance"]), Decimal::from(15));
    let statuses: Vec<&str> = details["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["pending", "completed"]);
}

#[tokio::test]
async fn test_oversized_admin_amounts_are_bad_requests() {
    let (_dir, app) = test_app();
    let (status, game) = admin(
        &app,
        Method::POST,
        "/admin/games",
        Some(json!({ "name": "Centavo", "price": "0.01", "target_rtp": "90" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = admin(
        &app,
        Method::PUT,
        &format!("/admin/games/{}/prizes", game["id"]),
        Some(json!({ "prizes": [{ "prize_value": "10000000000000000000000000000", "probability": "1" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let user_id = funded_user(&app, "1.00").await;
    let (status, _) = admin(
        &app,
        Method::POST,
        &format!("/admin/users/{}/deposit", user_id),
        Some(json!({ "amount": "50000000000000000000000000000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
