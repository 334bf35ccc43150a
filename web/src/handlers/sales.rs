//! Sale and inventory query endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use flashsale_core::{Sale, SaleStore};

use crate::error::AppError;
use crate::response::DataBody;
use crate::state::AppState;

/// Sale representation on the wire.
#[derive(Debug, Serialize)]
pub struct SaleResponse {
    /// Sale id.
    pub id: String,
    /// Window start, RFC3339.
    pub started_at: String,
    /// Window end, RFC3339.
    pub ended_at: String,
    /// Inventory size.
    pub total_items: i32,
    /// Items committed as sold.
    pub items_sold: i32,
    /// Whether the window contains the current instant.
    pub active: bool,
}

impl SaleResponse {
    fn from_sale(sale: &Sale) -> Self {
        Self {
            id: sale.id.clone(),
            started_at: sale.started_at.to_rfc3339(),
            ended_at: sale.ended_at.to_rfc3339(),
            total_items: sale.total_items,
            items_sold: sale.items_sold,
            active: sale.is_active(Utc::now()),
        }
    }
}

/// Item representation on the wire.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    /// Item id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display image.
    pub image_url: String,
    /// Whether the item has been sold.
    pub sold: bool,
}

/// GET `/sales/active`
pub async fn active_sale(
    State(state): State<AppState>,
) -> Result<Json<DataBody<SaleResponse>>, AppError> {
    let sale = state.sales.active_sale().await?;
    Ok(Json(DataBody::new(SaleResponse::from_sale(&sale))))
}

/// GET `/sales/{id}`
pub async fn sale_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataBody<SaleResponse>>, AppError> {
    let sale = state.sales.sale(&id).await?;
    Ok(Json(DataBody::new(SaleResponse::from_sale(&sale))))
}

/// Query parameters of the items listing.
#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    /// When set, only unsold items are returned.
    #[serde(default)]
    available: bool,
}

/// GET `/sales/{id}/items`
pub async fn sale_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<DataBody<Vec<ItemResponse>>>, AppError> {
    // 404 for unknown sales rather than an empty list.
    state.sales.sale(&id).await?;

    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let offset = query.offset.unwrap_or(0).max(0);

    let items = state
        .sales
        .items_for_sale(&id, query.available, limit, offset)
        .await?;

    let body = items
        .into_iter()
        .map(|item| ItemResponse {
            id: item.id,
            name: item.name,
            image_url: item.image_url,
            sold: item.sold,
        })
        .collect();

    Ok(Json(DataBody::new(body)))
}
