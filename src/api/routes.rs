//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    middleware,
    routing::post,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{OperationContext, RecipientIdentifier};
use crate::error::AppError;
use crate::handlers::{
    CreateAccountCommand, CreateAccountResult, LinkCardCommand, LinkPhoneCommand,
    TransferCommand,
};

use super::middleware::require_identity_middleware;
use super::state::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

/// Inbound transfer body, one shape per identifier kind.
///
/// Fields are optional so that a missing field is reported by the transfer
/// builder rather than as a JSON error.
pub trait TransferRequest: DeserializeOwned + Send + 'static {
    fn into_command(self) -> TransferCommand;
}

// No Debug: these carry raw card and phone numbers.

#[derive(Default, Deserialize, Serialize)]
pub struct CardTransferRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct PhoneTransferRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct AccountTransferRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
}

impl TransferRequest for CardTransferRequest {
    fn into_command(self) -> TransferCommand {
        TransferCommand {
            sender_account_id: self.account_id,
            recipient: self.card_number.map(RecipientIdentifier::Card),
            amount: self.amount,
        }
    }
}

impl TransferRequest for PhoneTransferRequest {
    fn into_command(self) -> TransferCommand {
        TransferCommand {
            sender_account_id: self.account_id,
            recipient: self.phone_number.map(RecipientIdentifier::Phone),
            amount: self.amount,
        }
    }
}

impl TransferRequest for AccountTransferRequest {
    fn into_command(self) -> TransferCommand {
        TransferCommand {
            sender_account_id: self.account_id,
            recipient: self.account_number.map(RecipientIdentifier::AccountNumber),
            amount: self.amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub status: String,
    pub transaction_id: Uuid,
}

#[derive(Deserialize, Serialize)]
pub struct CreateAccountRequest {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub account_number: String,
    pub phone_number: String,
    pub currency: String,
    pub balance: u64,
    pub card_number: String,
}

#[derive(Deserialize, Serialize)]
pub struct LinkCardRequest {
    pub card_number: String,
    pub account_id: Uuid,
}

#[derive(Deserialize, Serialize)]
pub struct LinkPhoneRequest {
    pub phone_number: String,
    pub account_id: Uuid,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    let transactions = Router::new()
        .route("/transaction/transfer/card", post(transfer::<CardTransferRequest>))
        .route("/transaction/transfer/phone", post(transfer::<PhoneTransferRequest>))
        .route(
            "/transaction/transfer/account",
            post(transfer::<AccountTransferRequest>),
        )
        .route_layer(middleware::from_fn(require_identity_middleware));

    let service = Router::new()
        .route("/service/account/create", post(create_account))
        .route("/service/account/link/card", post(link_card))
        .route("/service/account/link/phone", post(link_phone));

    transactions.merge(service)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

// =========================================================================
// POST /transaction/transfer/{card,phone,account}
// =========================================================================

/// Transfer funds to the account behind a card, phone or account number
async fn transfer<R: TransferRequest>(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<R>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let command = json_body(payload)?.into_command();

    let result = state.transfers.execute(command, &context).await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            status: "Success".to_string(),
            transaction_id: result.transfer_id,
        }),
    ))
}

// =========================================================================
// POST /service/account/create
// =========================================================================

/// Create an account and link its card
async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateAccountResult>), AppError> {
    let request = json_body(payload)?;

    let result = state
        .provisioning
        .create_account(CreateAccountCommand {
            account_id: request.account_id,
            user_id: request.user_id,
            account_number: request.account_number,
            phone_number: request.phone_number,
            currency: request.currency,
            balance: request.balance,
            card_number: request.card_number,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

// =========================================================================
// POST /service/account/link/card
// =========================================================================

async fn link_card(
    State(state): State<AppState>,
    payload: Result<Json<LinkCardRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let request = json_body(payload)?;

    state
        .provisioning
        .link_card(LinkCardCommand {
            card_number: request.card_number,
            account_id: request.account_id,
        })
        .await?;

    Ok(StatusCode::CREATED)
}

// =========================================================================
// POST /service/account/link/phone
// =========================================================================

async fn link_phone(
    State(state): State<AppState>,
    payload: Result<Json<LinkPhoneRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let request = json_body(payload)?;

    state
        .provisioning
        .link_phone(LinkPhoneCommand {
            phone_number: request.phone_number,
            account_id: request.account_id,
        })
        .await?;

    Ok(StatusCode::CREATED)
}
