//! Error bridge between the domain taxonomy and HTTP responses.
//!
//! Domain errors arrive unchanged from the engine; this module owns the
//! canonical status mapping and the JSON error envelope, implementing Axum's
//! `IntoResponse`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use std::fmt;

use flashsale_core::SaleError;

use crate::response::ErrorBody;

/// Application error for web handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    /// User-facing message.
    message: String,
    /// Short error detail (the domain error's display form).
    error: Option<String>,
    /// Per-field validation messages.
    errors: Option<BTreeMap<String, String>>,
}

impl AppError {
    /// Create an error with an explicit status.
    #[must_use]
    pub const fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            error: None,
            errors: None,
        }
    }

    /// 400 with a per-field validation map.
    #[must_use]
    pub fn validation(message: impl Into<String>, errors: BTreeMap<String, String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error: None,
            errors: Some(errors),
        }
    }

    /// 500 with a neutral body.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Canonical domain-to-HTTP status mapping.
impl From<SaleError> for AppError {
    fn from(error: SaleError) -> Self {
        let (status, message) = match &error {
            SaleError::SaleNotFound => (StatusCode::NOT_FOUND, "Sale not found"),
            SaleError::ItemNotFound => (StatusCode::NOT_FOUND, "Item not found"),
            SaleError::CheckoutNotFound => (StatusCode::NOT_FOUND, "Checkout not found"),

            SaleError::SaleNotActive => (StatusCode::BAD_REQUEST, "Sale is not active"),
            SaleError::SaleOutOfStock => (StatusCode::BAD_REQUEST, "Sale is out of stock"),
            SaleError::SaleLimitExceeded => {
                (StatusCode::BAD_REQUEST, "Purchase would exceed sale limit")
            }
            SaleError::NoItemsToPurchase => (StatusCode::BAD_REQUEST, "No items to purchase"),
            SaleError::ItemNotInSale => (StatusCode::BAD_REQUEST, "Item not in current sale"),
            SaleError::CheckoutExpired => (StatusCode::BAD_REQUEST, "Checkout expired"),
            SaleError::ItemAlreadyInCheckout => {
                (StatusCode::BAD_REQUEST, "Item already in checkout")
            }
            SaleError::UserAlreadyCheckedOutItem => {
                (StatusCode::BAD_REQUEST, "User already checked out this item")
            }
            SaleError::UserLimitExceeded => {
                (StatusCode::BAD_REQUEST, "User has reached maximum items limit")
            }
            SaleError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),

            SaleError::ItemAlreadySold => (StatusCode::CONFLICT, "Items already sold"),
            SaleError::AllItemsSold => {
                (StatusCode::CONFLICT, "All items from checkout already sold")
            }
            SaleError::CheckoutAlreadyProcessed => (
                StatusCode::CONFLICT,
                "Checkout code has already been processed",
            ),
            SaleError::PurchaseInProgress => (
                StatusCode::CONFLICT,
                "Another purchase is in progress for this checkout",
            ),

            SaleError::TransactionFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Transaction failed")
            }
            SaleError::Database(_) | SaleError::Cache(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        Self {
            status,
            message: message.to_string(),
            error: Some(error.to_string()),
            errors: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                message = %self.message,
                error = self.error.as_deref().unwrap_or(""),
                "Request failed"
            );
        }

        // Infrastructure detail stays out of 5xx bodies.
        let error = if self.status.is_server_error() {
            None
        } else {
            self.error
        };

        let body = ErrorBody {
            message: self.message,
            error,
            errors: self.errors,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: SaleError) -> StatusCode {
        AppError::from(error).status()
    }

    #[test]
    fn not_found_kinds_map_to_404() {
        assert_eq!(status_of(SaleError::SaleNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(SaleError::ItemNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(SaleError::CheckoutNotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn admission_kinds_map_to_400() {
        for error in [
            SaleError::SaleNotActive,
            SaleError::SaleOutOfStock,
            SaleError::SaleLimitExceeded,
            SaleError::NoItemsToPurchase,
            SaleError::ItemNotInSale,
            SaleError::CheckoutExpired,
            SaleError::ItemAlreadyInCheckout,
            SaleError::UserAlreadyCheckedOutItem,
            SaleError::UserLimitExceeded,
        ] {
            assert_eq!(status_of(error), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn contention_kinds_map_to_409() {
        for error in [
            SaleError::ItemAlreadySold,
            SaleError::AllItemsSold,
            SaleError::CheckoutAlreadyProcessed,
            SaleError::PurchaseInProgress,
        ] {
            assert_eq!(status_of(error), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn infrastructure_kinds_map_to_500_with_neutral_detail() {
        assert_eq!(
            status_of(SaleError::TransactionFailed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(SaleError::Database("pool exhausted".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
