//! Administrative sale creation.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use flashsale_core::{codes, fixtures, Sale, SaleError, SaleStore};

use crate::error::AppError;
use crate::response::DataBody;
use crate::state::AppState;

/// Request body of `POST /admin/sales`.
#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    /// RFC3339 window start; defaults to the top of the current hour.
    pub started_at: Option<String>,
    /// RFC3339 window end; defaults to one hour after the start.
    pub ended_at: Option<String>,
    /// Inventory size.
    pub total_items: i32,
}

/// Response body of `POST /admin/sales`.
#[derive(Debug, Serialize)]
pub struct CreateSaleResponse {
    /// New sale id.
    pub id: String,
    /// Window start, RFC3339.
    pub started_at: String,
    /// Window end, RFC3339.
    pub ended_at: String,
    /// Inventory size.
    pub total_items: i32,
}

/// POST `/admin/sales`
///
/// Creates a sale and bulk-inserts its generated items. Refuses to overlap a
/// currently active sale.
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<DataBody<CreateSaleResponse>>), AppError> {
    let mut field_errors = BTreeMap::new();

    if request.total_items <= 0 {
        field_errors.insert(
            "total_items".to_string(),
            "Total items must be greater than 0".to_string(),
        );
    }

    let now = Utc::now();
    let started_at = match &request.started_at {
        Some(raw) => parse_rfc3339(raw).unwrap_or_else(|| {
            field_errors.insert(
                "started_at".to_string(),
                "Invalid started_at time format (use RFC3339)".to_string(),
            );
            now
        }),
        None => top_of_hour(now),
    };
    let ended_at = match &request.ended_at {
        Some(raw) => parse_rfc3339(raw).unwrap_or_else(|| {
            field_errors.insert(
                "ended_at".to_string(),
                "Invalid ended_at time format (use RFC3339)".to_string(),
            );
            now
        }),
        None => started_at + Duration::hours(1),
    };

    if field_errors.is_empty() && started_at >= ended_at {
        field_errors.insert(
            "started_at".to_string(),
            "started_at must be before ended_at".to_string(),
        );
    }
    if !field_errors.is_empty() {
        return Err(AppError::validation("Validation failed", field_errors));
    }

    match state.sales.active_sale().await {
        Ok(active) => {
            tracing::warn!(active_sale = %active.id, "Refusing to overlap active sale");
            return Err(AppError::new(
                StatusCode::CONFLICT,
                "A sale is currently active. Wait until it ends before creating a new one."
                    .to_string(),
            ));
        }
        Err(SaleError::SaleNotFound) => {}
        Err(error) => return Err(error.into()),
    }

    let sale = Sale::new(codes::sale_id(), started_at, ended_at, request.total_items, now)?;
    state.sales.create_sale(&sale).await?;

    let items = fixtures::items_for_sale(&sale.id, sale.total_items, now);
    state.sales.create_items(&items).await?;

    tracing::info!(
        sale_id = %sale.id,
        started_at = %sale.started_at,
        ended_at = %sale.ended_at,
        total_items = sale.total_items,
        "Sale created"
    );

    Ok((
        StatusCode::CREATED,
        Json(DataBody::with_message(
            CreateSaleResponse {
                id: sale.id,
                started_at: sale.started_at.to_rfc3339(),
                ended_at: sale.ended_at.to_rfc3339(),
                total_items: sale.total_items,
            },
            "Sale created successfully",
        )),
    ))
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn top_of_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}
