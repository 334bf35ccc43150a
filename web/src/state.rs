//! Shared application state for request handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use flashsale_core::{Limits, SystemClock};
use flashsale_engine::{CheckoutFlow, PurchaseEngine};
use flashsale_postgres::{PgCheckoutStore, PgSaleStore};
use flashsale_redis::RedisCache;

/// Checkout flow over the production stores.
pub type CheckoutService = CheckoutFlow<PgSaleStore, PgCheckoutStore, RedisCache, SystemClock>;
/// Purchase engine over the production stores.
pub type PurchaseService = PurchaseEngine<PgSaleStore, PgCheckoutStore, RedisCache, SystemClock>;

/// State shared by every handler. Cloning is cheap: the stores wrap pooled
/// connections and the engines are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Direct sale/item reads for the query endpoints.
    pub sales: PgSaleStore,
    /// Coordination store (health probe).
    pub cache: RedisCache,
    /// Checkout phase of the engine.
    pub checkout: Arc<CheckoutService>,
    /// Purchase phase of the engine.
    pub purchase: Arc<PurchaseService>,
    /// Process start, for uptime reporting.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Assemble the state from connected stores.
    #[must_use]
    pub fn new(
        sales: PgSaleStore,
        checkouts: PgCheckoutStore,
        cache: RedisCache,
        limits: Limits,
    ) -> Self {
        let checkout = Arc::new(CheckoutFlow::new(
            sales.clone(),
            checkouts.clone(),
            cache.clone(),
            SystemClock,
            limits,
        ));
        let purchase = Arc::new(PurchaseEngine::new(
            sales.clone(),
            checkouts,
            cache.clone(),
            SystemClock,
            limits,
        ));

        Self {
            sales,
            cache,
            checkout,
            purchase,
            started_at: Utc::now(),
        }
    }
}
