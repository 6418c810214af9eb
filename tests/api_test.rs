mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use cardvault_core::cache::LogInvalidationSink;
use cardvault_core::config::FulfillmentPolicy;
use cardvault_core::db::schema::probe_capabilities;
use cardvault_core::handlers::auth::{sign, SIGNATURE_HEADER};
use cardvault_core::{create_app, AppState};
use common::*;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";
const NOTIFY_SECRET: &str = "test-notify-secret";

async fn app_state(pool: &sqlx::PgPool) -> AppState {
    let capabilities = probe_capabilities(pool).await.unwrap();
    AppState::new(
        pool.clone(),
        capabilities,
        FulfillmentPolicy::default(),
        None,
        Arc::new(LogInvalidationSink),
        ADMIN_KEY.to_string(),
        NOTIFY_SECRET.to_string(),
    )
}

fn notify_payload(order_id: &str, amount: &str) -> String {
    json!({ "order_id": order_id, "amount": amount, "trade_no": "T-API" }).to_string()
}

fn notify_request_with(body: String, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/payments/notify")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).unwrap()
}

fn notify_request(order_id: &str, amount: &str) -> Request<Body> {
    let body = notify_payload(order_id, amount);
    let signature = sign(NOTIFY_SECRET, body.as_bytes()).unwrap();
    notify_request_with(body, Some(signature))
}

#[tokio::test]
async fn test_health_reports_ok() {
    let db = setup_db().await;
    let app = create_app(app_state(&db.pool).await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_payment_notification_flow() {
    let db = setup_db().await;
    insert_order(&db.pool, "ord-api", "prod-a", "9.99").await;
    insert_card(&db.pool, "prod-a", "KEY-API").await;
    let state = app_state(&db.pool).await;

    let response = create_app(state.clone())
        .oneshot(notify_request("ord-api", "10.00"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = create_app(state.clone())
        .oneshot(notify_request("ord-api", "9.99"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetch_order(&db.pool, "ord-api").await.status, "delivered");

    let response = create_app(state)
        .oneshot(notify_request("nope", "9.99"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsigned_notification_is_rejected() {
    let db = setup_db().await;
    insert_order(&db.pool, "ord-forged", "prod-a", "9.99").await;
    insert_card(&db.pool, "prod-a", "KEY-FORGED").await;
    let state = app_state(&db.pool).await;

    let response = create_app(state.clone())
        .oneshot(notify_request_with(notify_payload("ord-forged", "9.99"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = sign("guessed-secret", notify_payload("ord-forged", "9.99").as_bytes()).unwrap();
    let response = create_app(state.clone())
        .oneshot(notify_request_with(notify_payload("ord-forged", "9.99"), Some(forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signed_for_other_amount = sign(NOTIFY_SECRET, notify_payload("ord-forged", "0.01").as_bytes()).unwrap();
    let response = create_app(state)
        .oneshot(notify_request_with(
            notify_payload("ord-forged", "9.99"),
            Some(signed_for_other_amount),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let order = fetch_order(&db.pool, "ord-forged").await;
    assert_eq!(order.status, "pending");
    assert_eq!(order.card_key, None);
}

#[tokio::test]
async fn test_signed_malformed_notification_is_validation_error() {
    let db = setup_db().await;
    let app = create_app(app_state(&db.pool).await);
    let body = r#"{"order_id":"ord-x","amount":"not money"}"#.to_string();
    let signature = sign(NOTIFY_SECRET, body.as_bytes()).unwrap();

    let response = app
        .oneshot(notify_request_with(body, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_order() {
    let db = setup_db().await;
    insert_order(&db.pool, "ord-view", "prod-a", "1.00").await;
    let state = app_state(&db.pool).await;

    let response = create_app(state.clone())
        .oneshot(Request::builder().uri("/orders/ord-view").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = create_app(state)
        .oneshot(Request::builder().uri("/orders/ghost").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_compensate_requires_key() {
    let db = setup_db().await;
    insert_order(&db.pool, "ord-adm", "prod-a", "1.00").await;
    set_order_status(&db.pool, "ord-adm", "paid").await;
    let state = app_state(&db.pool).await;

    let response = create_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/orders/ord-adm/compensate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(fetch_order(&db.pool, "ord-adm").await.status, "paid");

    let response = create_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/orders/ord-adm/compensate")
                .header("Authorization", format!("Bearer {}", ADMIN_KEY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetch_order(&db.pool, "ord-adm").await.status, "refunded");
}

#[tokio::test]
async fn test_admin_refund_without_gateway_is_validation_error() {
    let db = setup_db().await;
    insert_order(&db.pool, "ord-ref", "prod-a", "1.00").await;
    set_trade_no(&db.pool, "ord-ref", "T-1").await;
    let app = create_app(app_state(&db.pool).await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/orders/ord-ref/refund")
                .header("Authorization", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
