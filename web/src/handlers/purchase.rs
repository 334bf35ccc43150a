//! Purchase endpoint.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use flashsale_core::PurchaseResult;

use crate::error::AppError;
use crate::response::DataBody;
use crate::state::AppState;

/// Query parameters of `POST /purchase`.
#[derive(Debug, Deserialize)]
pub struct PurchaseParams {
    code: Option<String>,
}

/// POST `/purchase?code={checkout_code}`
pub async fn purchase(
    State(state): State<AppState>,
    Query(params): Query<PurchaseParams>,
) -> Result<Json<DataBody<PurchaseResult>>, AppError> {
    let code = params.code.unwrap_or_default();
    if code.is_empty() {
        return Err(AppError::validation(
            "Validation failed",
            BTreeMap::from([(
                "code".to_string(),
                "checkout code is required".to_string(),
            )]),
        ));
    }

    tracing::info!(%code, "Purchase request received");

    let result = state.purchase.purchase(&code).await?;

    tracing::info!(
        %code,
        total_purchased = result.total_purchased,
        failed_count = result.failed_count,
        "Purchase completed"
    );

    Ok(Json(DataBody::with_message(
        result,
        "Purchase completed successfully",
    )))
}
