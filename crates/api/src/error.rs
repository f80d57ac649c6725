//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use serde::Serialize;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Caller identity is missing or malformed.
    #[error("{0}")]
    Unauthorized(String),
    /// Caller is authenticated but lacks the required role.
    #[error("Insufficient permissions")]
    Forbidden,
    /// Malformed request: body, path parameter or field value.
    #[error("{0}")]
    Validation(String),
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: &'static str,
    pub message: String,
}

impl ApiError {
    /// Returns the HTTP status and stable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "insufficient_permissions"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            ApiError::Domain(err) => domain_status_and_code(err),
        }
    }
}

fn domain_status_and_code(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::EmptyCart => (StatusCode::BAD_REQUEST, "empty_cart"),
        DomainError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, "insufficient_stock"),
        DomainError::CartItemNotFound(_) => (StatusCode::NOT_FOUND, "cart_item_not_found"),
        DomainError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "product_not_found"),
        DomainError::AddressNotFound(_) => (StatusCode::NOT_FOUND, "address_not_found"),
        DomainError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "order_not_found"),
        DomainError::InvalidOrderStatusTransition { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_order_status_transition")
        }
        DomainError::InvalidQuantity { .. } | DomainError::AmountOutOfRange => {
            (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
        }
        DomainError::Store(StoreError::LockTimeout) => {
            (StatusCode::SERVICE_UNAVAILABLE, "lock_timeout")
        }
        DomainError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
        DomainError::CorruptStatus { .. } | DomainError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "Internal server error".to_string()
        } else if matches!(&self, ApiError::Domain(e) if e.is_retryable()) {
            tracing::warn!(error = %self, "retryable storage error");
            "The request conflicted with concurrent activity; retry it".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error_code,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
