//! Checkout phase: bind a user to an item under a reusable checkout code.
//!
//! Checkout does **not** reserve inventory. The coordination-store checks
//! (filter, slot counter, checked-item set) shed load and rate-limit; only
//! the durable store's item row is authoritative. Cache failures on the
//! advisory steps are logged and treated as "no objection" so the flow keeps
//! working through a degraded coordination store.

use chrono::{DateTime, Utc};

use flashsale_core::codes;
use flashsale_core::{
    Cache, Checkout, CheckoutStore, Clock, Limits, Result, Sale, SaleError, SaleStore,
};

/// Successful checkout response: the (possibly reused) code, the number of
/// items now in the checkout, and when the sale window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfirmation {
    /// Server-issued checkout code, stable across additions within a sale.
    pub code: String,
    /// Items currently in the checkout.
    pub items_count: usize,
    /// End of the sale window.
    pub sale_ends_at: DateTime<Utc>,
}

/// The checkout phase of the allocation engine.
pub struct CheckoutFlow<S, C, K, T> {
    sales: S,
    checkouts: C,
    cache: K,
    clock: T,
    limits: Limits,
}

impl<S, C, K, T> CheckoutFlow<S, C, K, T>
where
    S: SaleStore,
    C: CheckoutStore,
    K: Cache,
    T: Clock,
{
    /// Create a checkout flow over the given stores.
    pub const fn new(sales: S, checkouts: C, cache: K, clock: T, limits: Limits) -> Self {
        Self {
            sales,
            checkouts,
            cache,
            clock,
            limits,
        }
    }

    /// Add an item to the user's active checkout in the current sale,
    /// creating the checkout (and its code) on first use.
    ///
    /// # Errors
    ///
    /// Fails with `SaleNotActive`/`SaleNotFound` outside a sale window,
    /// `ItemAlreadySold`, `UserLimitExceeded`, `UserAlreadyCheckedOutItem`,
    /// `ItemNotFound` or `ItemNotInSale` per the admission rules.
    pub async fn checkout(&self, user_id: &str, item_id: &str) -> Result<CheckoutConfirmation> {
        if user_id.is_empty() {
            return Err(SaleError::Validation("user id cannot be empty".into()));
        }
        if item_id.is_empty() {
            return Err(SaleError::Validation("item id cannot be empty".into()));
        }

        let now = self.clock.now();
        // "No active sale" and "sale window closed" are the same answer for a
        // buyer: there is nothing to check out right now.
        let sale = self.sales.active_sale().await.map_err(|error| match error {
            SaleError::SaleNotFound => SaleError::SaleNotActive,
            other => other,
        })?;
        if !sale.is_active(now) {
            return Err(SaleError::SaleNotActive);
        }

        // Fast negative path: a filter miss proves the item was never sold and
        // skips the durable read. A hit is only a hint and is verified below.
        match self.cache.item_probably_sold(item_id).await {
            Ok(true) => {
                let item = self.sales.item(item_id).await?;
                if item.sold {
                    return Err(SaleError::ItemAlreadySold);
                }
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%error, item_id, "Sold-items filter check failed, continuing");
            }
        }

        match self
            .cache
            .available_checkout_slots(&sale.id, user_id, self.limits.max_items_per_user)
            .await
        {
            Ok(slots) if slots <= 0 => return Err(SaleError::UserLimitExceeded),
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, user_id, "Checkout slot check failed, continuing");
            }
        }

        match self
            .cache
            .has_checked_out_item(&sale.id, user_id, item_id)
            .await
        {
            Ok(true) => return Err(SaleError::UserAlreadyCheckedOutItem),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%error, user_id, item_id, "Checked-item set probe failed, continuing");
            }
        }

        let item = self.sales.item(item_id).await?;
        if !item.belongs_to_sale(&sale.id) {
            return Err(SaleError::ItemNotInSale);
        }
        if item.sold {
            // Negative-cache the authoritative answer for the fast path.
            if let Err(error) = self.cache.add_sold_item(item_id).await {
                tracing::warn!(%error, item_id, "Failed to record sold item in filter");
            }
            return Err(SaleError::ItemAlreadySold);
        }

        let code = self.resolve_code(&sale, user_id, now).await?;
        let checkout = self.append_to_checkout(&sale, user_id, item_id, &code, now).await?;

        if let Err(error) = self
            .cache
            .increment_user_checkout_count(&sale.id, user_id)
            .await
        {
            tracing::warn!(%error, user_id, sale_id = %sale.id, "Failed to increment checkout counter");
        }
        if let Err(error) = self
            .cache
            .add_checked_out_item(&sale.id, user_id, item_id, sale.remaining(now))
            .await
        {
            tracing::warn!(%error, user_id, item_id, "Failed to record checked-out item");
        }

        tracing::info!(
            user_id,
            item_id,
            sale_id = %sale.id,
            code = %code,
            items_count = checkout.item_count(),
            "Checkout completed"
        );

        Ok(CheckoutConfirmation {
            code,
            items_count: checkout.item_count(),
            sale_ends_at: sale.ended_at,
        })
    }

    /// Return the user's existing checkout code for this sale, or mint and
    /// register a fresh one with TTL equal to the remaining sale window.
    async fn resolve_code(&self, sale: &Sale, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let existing = match self.cache.user_checkout_code(&sale.id, user_id).await {
            Ok(code) => code,
            Err(error) => {
                tracing::warn!(%error, user_id, "Checkout code lookup failed, minting fresh code");
                None
            }
        };

        if let Some(code) = existing {
            return Ok(code);
        }

        let code = codes::checkout_code(&sale.id);
        let ttl = sale.remaining(now);

        if let Err(error) = self
            .cache
            .set_user_checkout_code(&sale.id, user_id, &code, ttl)
            .await
        {
            tracing::warn!(%error, user_id, "Failed to bind user checkout code");
        }
        if let Err(error) = self.cache.set_checkout_code(&code, ttl).await {
            tracing::warn!(%error, code = %code, "Failed to register checkout code marker");
        }

        Ok(code)
    }

    /// Create the checkout on first use, or append the item to it. The store's
    /// unique `(attempt, item)` constraint decides concurrent duplicates.
    async fn append_to_checkout(
        &self,
        sale: &Sale,
        user_id: &str,
        item_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Checkout> {
        match self.checkouts.checkout_by_code(code).await {
            Ok(mut checkout) => {
                checkout
                    .add_item(item_id)
                    .map_err(|_| SaleError::UserAlreadyCheckedOutItem)?;
                self.checkouts
                    .add_item(code, item_id)
                    .await
                    .map_err(|error| match error {
                        SaleError::ItemAlreadyInCheckout => SaleError::UserAlreadyCheckedOutItem,
                        other => other,
                    })?;
                Ok(checkout)
            }
            Err(SaleError::CheckoutNotFound) => {
                let checkout =
                    Checkout::new(code, &sale.id, user_id, vec![item_id.to_string()], now)?;
                self.checkouts.create_checkout(&checkout).await?;
                Ok(checkout)
            }
            Err(error) => Err(error),
        }
    }
}
