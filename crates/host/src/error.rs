//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::TransactionId;
use domain::AccountError;
use runtime::CallError;
use saga::SagaError;
use state_store::StorageError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Account operation error.
    Account(AccountError),
    /// Multi-party transaction error.
    Saga(SagaError),
    /// An entity could not be reached.
    Call(CallError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(id) = self.pending_transaction() {
            // Not a failure: the outcome is decided later by recovery.
            let body = serde_json::json!({ "transaction_id": id, "status": "pending" });
            return (StatusCode::ACCEPTED, axum::Json(body)).into_response();
        }

        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Account(err) => account_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Call(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl ApiError {
    fn pending_transaction(&self) -> Option<TransactionId> {
        match self {
            ApiError::Account(AccountError::OutcomePending(id))
            | ApiError::Saga(SagaError::OutcomePending(id)) => Some(*id),
            _ => None,
        }
    }
}

fn account_error_to_response(err: AccountError) -> (StatusCode, String) {
    match &err {
        AccountError::Storage(StorageError::ConcurrencyConflict { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        AccountError::Call(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::TooFewParticipants(_) | SagaError::DuplicateParticipant(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::Expired(_) => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Call(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        SagaError::OutcomePending(_) => (StatusCode::ACCEPTED, err.to_string()),
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        ApiError::Account(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        ApiError::Call(err)
    }
}
