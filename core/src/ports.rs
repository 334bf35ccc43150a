//! Capability traits implemented by the concrete stores.
//!
//! The engine depends on three capability sets:
//!
//! - [`SaleStore`] / [`SaleTx`]: the durable store of record. It exclusively
//!   owns the `item.sold` and `sale.items_sold` truths; `SaleTx` is a
//!   serializable transaction whose [`SaleTx::mark_item_sold`] conditional
//!   update is the sole per-item sold transition.
//! - [`CheckoutStore`]: checkout persistence (attempt rows + item rows).
//! - [`Cache`]: the coordination store holding derived counters for fast
//!   admission, the checkout-code registry, per-user checked-item sets, the
//!   sold-items probabilistic filter and per-resource exclusion keys. On
//!   disagreement the durable store wins and the cache is reconciled.
//!
//! All traits use `async fn` directly; the engine is generic over them rather
//! than holding trait objects, so the in-memory test doubles plug in without
//! boxing.

use chrono::Duration;

use crate::checkout::Checkout;
use crate::error::Result;
use crate::item::Item;
use crate::purchase::PurchaseResult;
use crate::sale::Sale;

/// Durable store of record for sales and items.
#[allow(async_fn_in_trait)]
pub trait SaleStore: Send + Sync {
    /// Transaction handle type opened by [`SaleStore::begin`].
    type Tx: SaleTx;

    /// Fetch the sale whose window contains the current instant.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SaleError::SaleNotFound`] if no sale is active.
    async fn active_sale(&self) -> Result<Sale>;

    /// Fetch a sale by id.
    async fn sale(&self, id: &str) -> Result<Sale>;

    /// Insert a new sale.
    async fn create_sale(&self, sale: &Sale) -> Result<()>;

    /// Fetch an item by id.
    async fn item(&self, id: &str) -> Result<Item>;

    /// List a sale's items in creation order. With `only_available`, sold
    /// items are filtered out (serviced by the partial unsold index).
    async fn items_for_sale(
        &self,
        sale_id: &str,
        only_available: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>>;

    /// Bulk-insert items for a sale.
    async fn create_items(&self, items: &[Item]) -> Result<()>;

    /// Count committed (sold) items of a sale. Used to reconcile the derived
    /// coordination counter at startup.
    async fn sold_item_count(&self, sale_id: &str) -> Result<i64>;

    /// Read the frozen idempotency record for a checkout code outside a
    /// transaction. Lets the purchase engine answer "already processed" even
    /// after the checkout rows were cleaned up.
    async fn purchase_result(&self, code: &str) -> Result<Option<PurchaseResult>>;

    /// Open a serializable transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Operations available inside a serializable purchase transaction.
///
/// Either [`SaleTx::commit`] or [`SaleTx::rollback`] must be called; dropping
/// the handle rolls back.
#[allow(async_fn_in_trait)]
pub trait SaleTx: Send {
    /// Fetch a sale by id within the transaction.
    async fn sale(&mut self, id: &str) -> Result<Sale>;

    /// Fetch an item by id within the transaction.
    async fn item(&mut self, id: &str) -> Result<Item>;

    /// Conditionally mark an item sold to `user_id`.
    ///
    /// Implemented as a single conditional write that succeeds only while the
    /// item is unsold. Returns `true` iff this call won the item; `false`
    /// means some other purchase already did.
    async fn mark_item_sold(&mut self, item_id: &str, user_id: &str) -> Result<bool>;

    /// Persist the sale row's `items_sold` counter.
    async fn update_sale(&mut self, sale: &Sale) -> Result<()>;

    /// Read the idempotency record for a checkout code, if any.
    async fn purchase_result(&mut self, code: &str) -> Result<Option<PurchaseResult>>;

    /// Insert the idempotency record. Writing an already-present code is a
    /// no-op; presence is decided by [`SaleTx::purchase_result`] beforehand.
    async fn save_purchase_result(&mut self, code: &str, result: &PurchaseResult) -> Result<()>;

    /// Commit the transaction.
    async fn commit(self) -> Result<()>;

    /// Roll the transaction back.
    async fn rollback(self) -> Result<()>;
}

/// Checkout attempt persistence.
#[allow(async_fn_in_trait)]
pub trait CheckoutStore: Send + Sync {
    /// Load a checkout (attempt row plus its items) by code.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SaleError::CheckoutNotFound`] if the code is unknown.
    async fn checkout_by_code(&self, code: &str) -> Result<Checkout>;

    /// Persist a new checkout with its initial items.
    async fn create_checkout(&self, checkout: &Checkout) -> Result<()>;

    /// Append an item to an existing checkout. The unique
    /// `(attempt, item)` constraint protects against concurrent duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SaleError::ItemAlreadyInCheckout`] if the item is
    /// already present.
    async fn add_item(&self, code: &str, item_id: &str) -> Result<()>;

    /// Best-effort audit record of a purchase attempt over a checkout item.
    async fn log_attempt(
        &self,
        sale_id: &str,
        user_id: &str,
        code: &str,
        item_id: &str,
    ) -> Result<()>;

    /// Delete a checkout and its items after the purchase committed.
    async fn delete_checkout(&self, code: &str) -> Result<()>;
}

/// Coordination store: derived counters, code registry, checked-item sets,
/// the sold-items filter and exclusion keys.
///
/// Multi-key admission decisions are server-evaluated scripts: the read and
/// the increments cannot interleave with other clients. Client-side
/// read-decide-write sequences are forbidden for admission.
#[allow(async_fn_in_trait)]
pub trait Cache: Send + Sync {
    // ── Sold-items filter ───────────────────────────────────────────

    /// Record an item as sold in the probabilistic filter.
    async fn add_sold_item(&self, item_id: &str) -> Result<()>;

    /// Fast membership check. `false` means definitely never added; `true`
    /// means *possibly* sold and must be verified against the durable store
    /// wherever the protocol requires an authoritative answer.
    async fn item_probably_sold(&self, item_id: &str) -> Result<bool>;

    // ── Derived counters ────────────────────────────────────────────

    /// Items the user has purchased in this sale (derived counter).
    async fn user_item_count(&self, sale_id: &str, user_id: &str) -> Result<i64>;

    /// Items the user has placed into checkout in this sale.
    async fn user_checkout_count(&self, sale_id: &str, user_id: &str) -> Result<i64>;

    /// Increment the user's checkout counter by one.
    async fn increment_user_checkout_count(&self, sale_id: &str, user_id: &str) -> Result<()>;

    /// Remaining checkout slots: `max - purchased - checkout_count`.
    async fn available_checkout_slots(
        &self,
        sale_id: &str,
        user_id: &str,
        max_items: i64,
    ) -> Result<i64>;

    /// Items sold in the sale (derived counter).
    async fn sale_items_sold(&self, sale_id: &str) -> Result<i64>;

    /// Overwrite the sale's sold counter. Used by startup reconciliation,
    /// where the durable count wins.
    async fn set_sale_items_sold(&self, sale_id: &str, count: i64) -> Result<()>;

    // ── Checkout code registry ──────────────────────────────────────

    /// The user's active checkout code in this sale, if any.
    async fn user_checkout_code(&self, sale_id: &str, user_id: &str) -> Result<Option<String>>;

    /// Bind the user's active checkout code for the remainder of the sale.
    async fn set_user_checkout_code(
        &self,
        sale_id: &str,
        user_id: &str,
        code: &str,
        ttl: Duration,
    ) -> Result<()>;

    /// Drop the user's checkout code and checkout counter after commit.
    async fn remove_user_checkout_state(&self, sale_id: &str, user_id: &str) -> Result<()>;

    /// Register a checkout code marker with the given TTL.
    async fn set_checkout_code(&self, code: &str, ttl: Duration) -> Result<()>;

    /// Whether a checkout code marker exists.
    async fn checkout_code_exists(&self, code: &str) -> Result<bool>;

    /// Remove a checkout code marker.
    async fn remove_checkout_code(&self, code: &str) -> Result<()>;

    // ── Checked-item sets ───────────────────────────────────────────

    /// Whether the user already checked this item out in this sale.
    async fn has_checked_out_item(
        &self,
        sale_id: &str,
        user_id: &str,
        item_id: &str,
    ) -> Result<bool>;

    /// Record an item in the user's checked-item set, with TTL.
    async fn add_checked_out_item(
        &self,
        sale_id: &str,
        user_id: &str,
        item_id: &str,
        ttl: Duration,
    ) -> Result<()>;

    // ── Atomic admission scripts ────────────────────────────────────

    /// Atomically check-and-increment both the sale and user counters by
    /// `item_count`. Either both increment or neither. Returns `false`
    /// (without incrementing) if either limit would be exceeded.
    async fn purchase_check(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
        max_sale_items: i64,
        max_user_items: i64,
    ) -> Result<bool>;

    /// Atomically check-and-increment the user counter by `item_count`.
    async fn user_limit_check(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
        max_items: i64,
    ) -> Result<bool>;

    /// Atomically check-and-increment the sale counter by `item_count`.
    async fn sale_limit_check(&self, sale_id: &str, item_count: i64, max_items: i64)
        -> Result<bool>;

    /// Unconditionally apply a committed purchase delta to both counters
    /// (step-15 reconciliation; the durable store has already committed).
    async fn increment_counters(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
    ) -> Result<()>;

    // ── Mutual exclusion ────────────────────────────────────────────

    /// Try to acquire the exclusion key. Returns `true` iff this caller set
    /// the key; the TTL bounds the hold time if the caller dies.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Release the exclusion key. Must run on every exit path of the caller.
    async fn release_lock(&self, key: &str) -> Result<()>;
}
