//! Router assembly.

use std::time::Duration;

use axum::http::{HeaderName, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, checkout, health, purchase, sales};
use crate::state::AppState;

/// Per-request deadline; long enough to ride out purchase retries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Build the complete router: sale queries, checkout/purchase, admin and
/// health, wrapped in panic recovery, timeout, CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("accept"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-csrf-token"),
        ]);

    Router::new()
        .route("/health", get(health::health))
        .route("/sales/active", get(sales::active_sale))
        .route("/sales/:id", get(sales::sale_by_id))
        .route("/sales/:id/items", get(sales::sale_items))
        .route("/admin/sales", post(admin::create_sale))
        .route("/checkout", post(checkout::checkout))
        .route("/purchase", post(purchase::purchase))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
