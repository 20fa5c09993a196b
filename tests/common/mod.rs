//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::util::ServiceExt;
use uuid::Uuid;

use transfer_gateway::api::{self, AppState};
use transfer_gateway::broker::{FanoutTopology, InMemoryBroker, TransferEventPublisher};
use transfer_gateway::crypto::SivCipher;
use transfer_gateway::db;
use transfer_gateway::ledger::InMemoryStore;

pub const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Router wired to in-memory store and broker
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub broker: Arc<InMemoryBroker>,
    pub publisher: TransferEventPublisher,
}

pub async fn spawn_app() -> TestApp {
    let cipher = Arc::new(SivCipher::from_hex(KEY_HEX).unwrap());
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());

    let topology = FanoutTopology::default()
        .declare(broker.clone())
        .await
        .expect("Failed to declare topology");
    let publisher = TransferEventPublisher::new(topology);

    let state = AppState::assemble(
        cipher,
        store.clone(),
        publisher.clone(),
        Duration::from_secs(1),
    );

    TestApp {
        router: api::build_router(state),
        store,
        broker,
        publisher,
    }
}

/// POST a JSON body, optionally as `user`; returns status and parsed body
pub async fn post_json(
    router: &Router,
    uri: &str,
    user: Option<Uuid>,
    body: String,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("X-Request-User-Id", user.to_string());
    }

    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Provision an account with a linked card through the HTTP surface
pub async fn create_account(
    router: &Router,
    user_id: Uuid,
    account_number: &str,
    card_number: &str,
    balance: u64,
) -> Uuid {
    let account_id = Uuid::new_v4();
    let body = serde_json::json!({
        "account_id": account_id,
        "user_id": user_id,
        "account_number": account_number,
        "phone_number": format!("+7{}", &account_number[account_number.len() - 10..]),
        "currency": "RUB",
        "balance": balance,
        "card_number": card_number,
    });

    let (status, _) = post_json(router, "/service/account/create", None, body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED, "Account creation failed");

    account_id
}

/// Setup test database - truncate tables for a fresh state
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = db::connect(&database_url, 5)
        .await
        .expect("Failed to connect to DB");
    db::verify_connection(&pool)
        .await
        .expect("Database is not answering queries");

    let mut required = db::LEDGER_TABLES.to_vec();
    required.extend_from_slice(db::BROKER_TABLES);
    assert!(
        db::check_schema(&pool, &required).await.unwrap(),
        "Apply migrations/001_init.sql before running database tests"
    );

    sqlx::query(
        r#"
        TRUNCATE TABLE transfer_outbox, transfers, card_to_account, phone_to_account, accounts,
            broker_messages, broker_bindings, broker_queues, broker_exchanges
        CASCADE
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    pool
}
