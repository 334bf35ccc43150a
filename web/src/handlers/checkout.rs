//! Checkout endpoint.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::response::DataBody;
use crate::state::AppState;

/// Query parameters of `POST /checkout`.
#[derive(Debug, Deserialize)]
pub struct CheckoutParams {
    user_id: Option<String>,
    item_id: Option<String>,
}

/// Checkout response payload.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Checkout code, reused across additions within the sale.
    pub code: String,
    /// Items currently in the checkout.
    pub items_count: usize,
    /// End of the sale window, RFC3339.
    pub sale_ends_at: String,
}

/// POST `/checkout?user_id={u}&item_id={i}`
pub async fn checkout(
    State(state): State<AppState>,
    Query(params): Query<CheckoutParams>,
) -> Result<Json<DataBody<CheckoutResponse>>, AppError> {
    let mut field_errors = BTreeMap::new();
    let user_id = params.user_id.unwrap_or_default();
    let item_id = params.item_id.unwrap_or_default();
    if user_id.is_empty() {
        field_errors.insert("user_id".to_string(), "user_id is required".to_string());
    }
    if item_id.is_empty() {
        field_errors.insert("item_id".to_string(), "item_id is required".to_string());
    }
    if !field_errors.is_empty() {
        tracing::warn!(%user_id, %item_id, "Checkout validation failed");
        return Err(AppError::validation("Validation failed", field_errors));
    }

    tracing::info!(%user_id, %item_id, "Checkout request received");

    let confirmation = state.checkout.checkout(&user_id, &item_id).await?;

    Ok(Json(DataBody::with_message(
        CheckoutResponse {
            code: confirmation.code,
            items_count: confirmation.items_count,
            sale_ends_at: confirmation.sale_ends_at.to_rfc3339(),
        },
        "Checkout completed successfully",
    )))
}
