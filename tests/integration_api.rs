//! API Integration Tests
//!
//! Drive the full router (middleware included) against the in-memory store
//! and broker.

use axum::http::StatusCode;
use serde_json::json;
use transfer_gateway::api::routes::{CardTransferRequest, TransactionResponse};
use transfer_gateway::ledger::AccountDirectory;
use transfer_gateway::TransactionEvent;
use uuid::Uuid;

mod common;

use common::{create_account, post_json, spawn_app};

const ALICE_CARD: &str = "4276000000000001";
const BOB_CARD: &str = "4276000000000002";
const ALICE_ACCOUNT_NUMBER: &str = "40817810000000000001";
const BOB_ACCOUNT_NUMBER: &str = "40817810000000000002";

#[tokio::test]
async fn test_card_transfer_e2e() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    // 1. Provision both accounts
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 1000).await;
    let bob_account = create_account(&app.router, bob, BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;

    // 2. Alice pays Bob by card
    let body = serde_json::to_string(&CardTransferRequest {
        account_id: Some(alice_account.to_string()),
        card_number: Some(BOB_CARD.to_string()),
        amount: Some(300),
    })
    .unwrap();
    let (status, json) =
        post_json(&app.router, "/transaction/transfer/card", Some(alice), body).await;
    assert_eq!(status, StatusCode::CREATED, "Transfer failed: {}", json);

    let response: TransactionResponse = serde_json::from_value(json).unwrap();
    assert_eq!(response.status, "Success");

    // 3. Balances moved
    assert_eq!(
        app.store.balance(alice_account).await.unwrap().unwrap().minor_units(),
        700
    );
    assert_eq!(
        app.store.balance(bob_account).await.unwrap().unwrap().minor_units(),
        300
    );

    // 4. Both projection queues hold the event
    for queue in ["postgres", "mongo"] {
        let messages = app.broker.messages(queue).await;
        assert_eq!(messages.len(), 1, "queue {}", queue);
        let event: TransactionEvent = serde_json::from_value(messages[0].payload.clone()).unwrap();
        assert_eq!(event.transfer_id(), response.transaction_id);
    }
}

#[tokio::test]
async fn test_phone_and_account_number_transfers() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 1000).await;
    let bob_account = create_account(&app.router, bob, BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;

    let (status, _) = post_json(
        &app.router,
        "/service/account/link/phone",
        None,
        json!({ "phone_number": "+15551234567", "account_id": bob_account }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = post_json(
        &app.router,
        "/transaction/transfer/phone",
        Some(alice),
        json!({
            "account_id": alice_account,
            "phone_number": " +15551234567 ",
            "amount": 500
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = post_json(
        &app.router,
        "/transaction/transfer/account",
        Some(alice),
        json!({
            "account_id": alice_account,
            "account_number": "40817-81000-00000-00002",
            "amount": 100
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(
        app.store.balance(bob_account).await.unwrap().unwrap().minor_units(),
        600
    );
    assert_eq!(app.broker.messages("postgres").await.len(), 2);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = spawn_app().await;
    let alice_account =
        create_account(&app.router, Uuid::new_v4(), ALICE_ACCOUNT_NUMBER, ALICE_CARD, 1000).await;

    let (status, json) = post_json(
        &app.router,
        "/transaction/transfer/card",
        None,
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 1 }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "missing_identity");
    assert_eq!(app.store.transfer_count().await, 0);
}

#[tokio::test]
async fn test_foreign_sender_account_is_forbidden() {
    let app = spawn_app().await;
    let alice_account =
        create_account(&app.router, Uuid::new_v4(), ALICE_ACCOUNT_NUMBER, ALICE_CARD, 1000).await;
    create_account(&app.router, Uuid::new_v4(), BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;

    // Mallory claims Alice's account
    let (status, json) = post_json(
        &app.router,
        "/transaction/transfer/card",
        Some(Uuid::new_v4()),
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 10 }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error_code"], "unauthorized_transfer");
    assert_eq!(
        app.store.balance(alice_account).await.unwrap().unwrap().minor_units(),
        1000
    );
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 1000).await;
    create_account(&app.router, Uuid::new_v4(), BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;

    let cases = [
        // Malformed JSON
        "{".to_string(),
        // Negative amount does not fit the wire type
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": -5 }).to_string(),
        // Zero amount
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 0 }).to_string(),
        // Missing recipient
        json!({ "account_id": alice_account, "amount": 5 }).to_string(),
        // Sender account is not a UUID
        json!({ "account_id": "acc-1", "card_number": BOB_CARD, "amount": 5 }).to_string(),
        // Paying oneself
        json!({ "account_id": alice_account, "card_number": ALICE_CARD, "amount": 5 }).to_string(),
    ];

    for body in cases {
        let (status, json) =
            post_json(&app.router, "/transaction/transfer/card", Some(alice), body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
        assert_eq!(json["error_code"], "invalid_request", "body {}", body);
    }

    assert_eq!(app.store.transfer_count().await, 0);
    assert!(app.broker.messages("mongo").await.is_empty());
}

#[tokio::test]
async fn test_unknown_recipient_is_not_found() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 1000).await;

    let (status, json) = post_json(
        &app.router,
        "/transaction/transfer/card",
        Some(alice),
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 5 }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "recipient_not_found");
    assert_eq!(json["details"], "card");
}

#[tokio::test]
async fn test_insufficient_funds() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 10).await;
    create_account(&app.router, Uuid::new_v4(), BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;

    let (status, json) = post_json(
        &app.router,
        "/transaction/transfer/card",
        Some(alice),
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 11 }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "insufficient_funds");
}

#[tokio::test]
async fn test_store_outage_is_service_unavailable() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 100).await;
    create_account(&app.router, Uuid::new_v4(), BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;
    app.store.set_unavailable(true);

    let (status, json) = post_json(
        &app.router,
        "/transaction/transfer/card",
        Some(alice),
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 5 }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error_code"], "service_unavailable");
    // Internal detail stays out of the response
    assert_eq!(json["error"], "Service temporarily unavailable");
}

#[tokio::test]
async fn test_broker_outage_still_succeeds() {
    let app = spawn_app().await;
    let alice = Uuid::new_v4();
    let alice_account =
        create_account(&app.router, alice, ALICE_ACCOUNT_NUMBER, ALICE_CARD, 100).await;
    create_account(&app.router, Uuid::new_v4(), BOB_ACCOUNT_NUMBER, BOB_CARD, 0).await;
    app.broker.fail_publishes(true);

    let (status, _) = post_json(
        &app.router,
        "/transaction/transfer/card",
        Some(alice),
        json!({ "account_id": alice_account, "card_number": BOB_CARD, "amount": 5 }).to_string(),
    )
    .await;

    // Money moved; propagation is left to the outbox relay
    assert_eq!(status, StatusCode::CREATED);
    assert!(app.broker.messages("postgres").await.is_empty());

    app.broker.fail_publishes(false);
    let report = transfer_gateway::jobs::relay_pending(app.store.as_ref(), &app.publisher, 10)
        .await
        .unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(app.broker.messages("postgres").await.len(), 1);
}

#[tokio::test]
async fn test_provisioning_validation() {
    let app = spawn_app().await;

    let (status, json) = post_json(
        &app.router,
        "/service/account/link/card",
        None,
        json!({ "card_number": "1234", "account_id": Uuid::new_v4() }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"], "Invalid card details");

    let (status, json) = post_json(
        &app.router,
        "/service/account/link/phone",
        None,
        json!({ "phone_number": "+15551234567", "account_id": Uuid::nil() }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"], "Invalid account ID");

    let (status, json) = post_json(
        &app.router,
        "/service/account/link/card",
        None,
        json!({ "card_number": BOB_CARD, "account_id": Uuid::new_v4() }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "account_not_found");
}

#[tokio::test]
async fn test_create_account_is_idempotent() {
    let app = spawn_app().await;
    let user = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    let body = json!({
        "account_id": account_id,
        "user_id": user,
        "account_number": ALICE_ACCOUNT_NUMBER,
        "phone_number": "+15551234567",
        "currency": "RUB",
        "balance": 50,
        "card_number": ALICE_CARD,
    });

    let (status, json) =
        post_json(&app.router, "/service/account/create", None, body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["created"], true);

    let (status, json) =
        post_json(&app.router, "/service/account/create", None, body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["created"], false);
    assert_eq!(
        app.store.balance(account_id).await.unwrap().unwrap().minor_units(),
        50
    );
}

#[tokio::test]
async fn test_health_check() {
    use axum::{body::Body, http::Request};
    use tower::util::ServiceExt;

    let app = spawn_app().await;
    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
