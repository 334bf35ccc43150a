//! Test doubles for the flash sale capability traits.
//!
//! This crate provides:
//! - [`TestClock`]: a shared, settable time source
//! - [`MemoryStore`]: an in-memory [`SaleStore`] + [`CheckoutStore`]
//! - [`MemoryCache`]: an in-memory [`Cache`] with the same atomicity contract
//!   as the real coordination store (every multi-key decision happens under
//!   one mutex acquisition, so scripts cannot interleave)
//!
//! The doubles model the *concurrency-relevant* behavior of the real stores:
//! the conditional `mark_item_sold` admits exactly one winner per item, the
//! admission scripts check-and-increment atomically, and exclusion keys are
//! first-caller-wins. Two simplifications are deliberate and documented:
//! TTLs are accepted but never expire, and `MemoryTx` applies writes
//! immediately (statement-level atomicity) rather than buffering until
//! commit — the engine's error paths roll back before any write, so the
//! difference is unobservable in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use flashsale_core::{
    Cache, Checkout, CheckoutStore, Clock, Item, PurchaseResult, Result, Sale, SaleError,
    SaleStore, SaleTx,
};

// ════════════════════════════════════════════════════════════════════
// Clock
// ════════════════════════════════════════════════════════════════════

/// Shared, settable clock. Clones observe the same instant; tests advance it
/// to cross sale-window boundaries.
#[derive(Debug, Clone)]
pub struct TestClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl TestClock {
    /// Create a clock pinned at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move the clock to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.lock();
        *guard += by;
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

// ════════════════════════════════════════════════════════════════════
// Durable store double
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct WorldState {
    sales: HashMap<String, Sale>,
    items: HashMap<String, Item>,
    checkouts: HashMap<String, Checkout>,
    attempt_log: Vec<(String, String, String, String)>,
    purchase_results: HashMap<String, PurchaseResult>,
}

/// In-memory durable store implementing both [`SaleStore`] and
/// [`CheckoutStore`]. Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<WorldState>>,
    clock: TestClock,
}

impl MemoryStore {
    /// Create an empty store whose `active_sale` is evaluated against `clock`.
    #[must_use]
    pub fn new(clock: TestClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState::default())),
            clock,
        }
    }

    /// Seed a sale together with its items.
    pub fn seed_sale(&self, sale: Sale, items: Vec<Item>) {
        let mut state = self.lock();
        for item in items {
            state.items.insert(item.id.clone(), item);
        }
        state.sales.insert(sale.id.clone(), sale);
    }

    /// Direct read of an item, for assertions.
    #[must_use]
    pub fn item_snapshot(&self, item_id: &str) -> Option<Item> {
        self.lock().items.get(item_id).cloned()
    }

    /// Direct read of a sale, for assertions.
    #[must_use]
    pub fn sale_snapshot(&self, sale_id: &str) -> Option<Sale> {
        self.lock().sales.get(sale_id).cloned()
    }

    /// Direct read of a stored purchase result, for assertions.
    #[must_use]
    pub fn purchase_result_snapshot(&self, code: &str) -> Option<PurchaseResult> {
        self.lock().purchase_results.get(code).cloned()
    }

    /// Number of audit rows logged for a checkout code.
    #[must_use]
    pub fn logged_attempts(&self, code: &str) -> usize {
        self.lock()
            .attempt_log
            .iter()
            .filter(|(_, _, c, _)| c == code)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SaleStore for MemoryStore {
    type Tx = MemoryTx;

    async fn active_sale(&self) -> Result<Sale> {
        let now = self.clock.now();
        self.lock()
            .sales
            .values()
            .find(|sale| sale.is_active(now))
            .cloned()
            .ok_or(SaleError::SaleNotFound)
    }

    async fn sale(&self, id: &str) -> Result<Sale> {
        self.lock()
            .sales
            .get(id)
            .cloned()
            .ok_or(SaleError::SaleNotFound)
    }

    async fn create_sale(&self, sale: &Sale) -> Result<()> {
        self.lock().sales.insert(sale.id.clone(), sale.clone());
        Ok(())
    }

    async fn item(&self, id: &str) -> Result<Item> {
        self.lock()
            .items
            .get(id)
            .cloned()
            .ok_or(SaleError::ItemNotFound)
    }

    async fn items_for_sale(
        &self,
        sale_id: &str,
        only_available: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>> {
        let state = self.lock();
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|item| item.sale_id == sale_id && (!only_available || !item.sold))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn create_items(&self, items: &[Item]) -> Result<()> {
        let mut state = self.lock();
        for item in items {
            state.items.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    async fn sold_item_count(&self, sale_id: &str) -> Result<i64> {
        Ok(self
            .lock()
            .items
            .values()
            .filter(|item| item.sale_id == sale_id && item.sold)
            .count() as i64)
    }

    async fn purchase_result(&self, code: &str) -> Result<Option<PurchaseResult>> {
        Ok(self.lock().purchase_results.get(code).cloned())
    }

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx {
            state: Arc::clone(&self.state),
            clock: self.clock.clone(),
        })
    }
}

/// Transaction handle over [`MemoryStore`].
///
/// Writes apply immediately under the store mutex, which preserves the
/// single-winner property of the conditional update. Commit and rollback are
/// no-ops; see the crate docs for why that is sufficient here.
pub struct MemoryTx {
    state: Arc<Mutex<WorldState>>,
    clock: TestClock,
}

impl MemoryTx {
    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SaleTx for MemoryTx {
    async fn sale(&mut self, id: &str) -> Result<Sale> {
        self.lock()
            .sales
            .get(id)
            .cloned()
            .ok_or(SaleError::SaleNotFound)
    }

    async fn item(&mut self, id: &str) -> Result<Item> {
        self.lock()
            .items
            .get(id)
            .cloned()
            .ok_or(SaleError::ItemNotFound)
    }

    async fn mark_item_sold(&mut self, item_id: &str, user_id: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut state = self.lock();
        match state.items.get_mut(item_id) {
            Some(item) if !item.sold => {
                item.sold = true;
                item.sold_to_user_id = Some(user_id.to_string());
                item.sold_at = Some(now);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn update_sale(&mut self, sale: &Sale) -> Result<()> {
        self.lock().sales.insert(sale.id.clone(), sale.clone());
        Ok(())
    }

    async fn purchase_result(&mut self, code: &str) -> Result<Option<PurchaseResult>> {
        Ok(self.lock().purchase_results.get(code).cloned())
    }

    async fn save_purchase_result(&mut self, code: &str, result: &PurchaseResult) -> Result<()> {
        self.lock()
            .purchase_results
            .entry(code.to_string())
            .or_insert_with(|| result.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl CheckoutStore for MemoryStore {
    async fn checkout_by_code(&self, code: &str) -> Result<Checkout> {
        self.lock()
            .checkouts
            .get(code)
            .cloned()
            .ok_or(SaleError::CheckoutNotFound)
    }

    async fn create_checkout(&self, checkout: &Checkout) -> Result<()> {
        self.lock()
            .checkouts
            .insert(checkout.code.clone(), checkout.clone());
        Ok(())
    }

    async fn add_item(&self, code: &str, item_id: &str) -> Result<()> {
        let mut state = self.lock();
        let checkout = state
            .checkouts
            .get_mut(code)
            .ok_or(SaleError::CheckoutNotFound)?;
        if checkout.item_ids.iter().any(|id| id == item_id) {
            return Err(SaleError::ItemAlreadyInCheckout);
        }
        checkout.item_ids.push(item_id.to_string());
        Ok(())
    }

    async fn log_attempt(
        &self,
        sale_id: &str,
        user_id: &str,
        code: &str,
        item_id: &str,
    ) -> Result<()> {
        self.lock().attempt_log.push((
            sale_id.to_string(),
            user_id.to_string(),
            code.to_string(),
            item_id.to_string(),
        ));
        Ok(())
    }

    async fn delete_checkout(&self, code: &str) -> Result<()> {
        self.lock().checkouts.remove(code);
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════
// Coordination store double
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct CacheState {
    sold_filter: HashSet<String>,
    sale_sold: HashMap<String, i64>,
    user_purchased: HashMap<(String, String), i64>,
    user_checkout_count: HashMap<(String, String), i64>,
    user_checkout_code: HashMap<(String, String), String>,
    code_markers: HashSet<String>,
    checked_items: HashMap<(String, String), HashSet<String>>,
    locks: HashSet<String>,
}

/// In-memory coordination store. Clones share state.
///
/// Every trait method takes the single interior mutex once, so multi-key
/// admission decisions are atomic exactly like server-evaluated scripts.
/// The sold-items "filter" is an exact set: `item_probably_sold` never
/// reports a false positive, which is a legal (if generous) filter.
#[derive(Clone, Default)]
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an exclusion key is currently held, for assertions.
    #[must_use]
    pub fn lock_held(&self, key: &str) -> bool {
        self.lock().locks.contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn key(sale_id: &str, user_id: &str) -> (String, String) {
        (sale_id.to_string(), user_id.to_string())
    }
}

impl Cache for MemoryCache {
    async fn add_sold_item(&self, item_id: &str) -> Result<()> {
        self.lock().sold_filter.insert(item_id.to_string());
        Ok(())
    }

    async fn item_probably_sold(&self, item_id: &str) -> Result<bool> {
        Ok(self.lock().sold_filter.contains(item_id))
    }

    async fn user_item_count(&self, sale_id: &str, user_id: &str) -> Result<i64> {
        Ok(*self
            .lock()
            .user_purchased
            .get(&Self::key(sale_id, user_id))
            .unwrap_or(&0))
    }

    async fn user_checkout_count(&self, sale_id: &str, user_id: &str) -> Result<i64> {
        Ok(*self
            .lock()
            .user_checkout_count
            .get(&Self::key(sale_id, user_id))
            .unwrap_or(&0))
    }

    async fn increment_user_checkout_count(&self, sale_id: &str, user_id: &str) -> Result<()> {
        *self
            .lock()
            .user_checkout_count
            .entry(Self::key(sale_id, user_id))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn available_checkout_slots(
        &self,
        sale_id: &str,
        user_id: &str,
        max_items: i64,
    ) -> Result<i64> {
        let state = self.lock();
        let key = Self::key(sale_id, user_id);
        let purchased = *state.user_purchased.get(&key).unwrap_or(&0);
        let in_checkout = *state.user_checkout_count.get(&key).unwrap_or(&0);
        Ok(max_items - purchased - in_checkout)
    }

    async fn sale_items_sold(&self, sale_id: &str) -> Result<i64> {
        Ok(*self.lock().sale_sold.get(sale_id).unwrap_or(&0))
    }

    async fn set_sale_items_sold(&self, sale_id: &str, count: i64) -> Result<()> {
        self.lock().sale_sold.insert(sale_id.to_string(), count);
        Ok(())
    }

    async fn user_checkout_code(&self, sale_id: &str, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .user_checkout_code
            .get(&Self::key(sale_id, user_id))
            .cloned())
    }

    async fn set_user_checkout_code(
        &self,
        sale_id: &str,
        user_id: &str,
        code: &str,
        _ttl: Duration,
    ) -> Result<()> {
        self.lock()
            .user_checkout_code
            .insert(Self::key(sale_id, user_id), code.to_string());
        Ok(())
    }

    async fn remove_user_checkout_state(&self, sale_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.lock();
        let key = Self::key(sale_id, user_id);
        state.user_checkout_code.remove(&key);
        state.user_checkout_count.remove(&key);
        Ok(())
    }

    async fn set_checkout_code(&self, code: &str, _ttl: Duration) -> Result<()> {
        self.lock().code_markers.insert(code.to_string());
        Ok(())
    }

    async fn checkout_code_exists(&self, code: &str) -> Result<bool> {
        Ok(self.lock().code_markers.contains(code))
    }

    async fn remove_checkout_code(&self, code: &str) -> Result<()> {
        self.lock().code_markers.remove(code);
        Ok(())
    }

    async fn has_checked_out_item(
        &self,
        sale_id: &str,
        user_id: &str,
        item_id: &str,
    ) -> Result<bool> {
        Ok(self
            .lock()
            .checked_items
            .get(&Self::key(sale_id, user_id))
            .is_some_and(|set| set.contains(item_id)))
    }

    async fn add_checked_out_item(
        &self,
        sale_id: &str,
        user_id: &str,
        item_id: &str,
        _ttl: Duration,
    ) -> Result<()> {
        self.lock()
            .checked_items
            .entry(Self::key(sale_id, user_id))
            .or_default()
            .insert(item_id.to_string());
        Ok(())
    }

    async fn purchase_check(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
        max_sale_items: i64,
        max_user_items: i64,
    ) -> Result<bool> {
        let mut state = self.lock();
        let user_key = Self::key(sale_id, user_id);
        let sale_count = *state.sale_sold.get(sale_id).unwrap_or(&0);
        let user_count = *state.user_purchased.get(&user_key).unwrap_or(&0);

        if sale_count + item_count > max_sale_items || user_count + item_count > max_user_items {
            return Ok(false);
        }

        *state.sale_sold.entry(sale_id.to_string()).or_insert(0) += item_count;
        *state.user_purchased.entry(user_key).or_insert(0) += item_count;
        Ok(true)
    }

    async fn user_limit_check(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
        max_items: i64,
    ) -> Result<bool> {
        let mut state = self.lock();
        let key = Self::key(sale_id, user_id);
        let count = *state.user_purchased.get(&key).unwrap_or(&0);
        if count + item_count > max_items {
            return Ok(false);
        }
        *state.user_purchased.entry(key).or_insert(0) += item_count;
        Ok(true)
    }

    async fn sale_limit_check(
        &self,
        sale_id: &str,
        item_count: i64,
        max_items: i64,
    ) -> Result<bool> {
        let mut state = self.lock();
        let count = *state.sale_sold.get(sale_id).unwrap_or(&0);
        if count + item_count > max_items {
            return Ok(false);
        }
        *state.sale_sold.entry(sale_id.to_string()).or_insert(0) += item_count;
        Ok(true)
    }

    async fn increment_counters(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
    ) -> Result<()> {
        let mut state = self.lock();
        *state.sale_sold.entry(sale_id.to_string()).or_insert(0) += item_count;
        *state
            .user_purchased
            .entry(Self::key(sale_id, user_id))
            .or_insert(0) += item_count;
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, _ttl: Duration) -> Result<bool> {
        Ok(self.lock().locks.insert(key.to_string()))
    }

    async fn release_lock(&self, key: &str) -> Result<()> {
        self.lock().locks.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn purchase_check_is_all_or_nothing() {
        let cache = MemoryCache::new();
        assert!(cache.purchase_check("s1", "u1", 3, 10, 10).await.unwrap());
        assert_eq!(cache.sale_items_sold("s1").await.unwrap(), 3);
        assert_eq!(cache.user_item_count("s1", "u1").await.unwrap(), 3);

        // Would exceed the user cap: neither counter moves.
        assert!(!cache.purchase_check("s1", "u1", 8, 100, 10).await.unwrap());
        assert_eq!(cache.sale_items_sold("s1").await.unwrap(), 3);
        assert_eq!(cache.user_item_count("s1", "u1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn exclusion_key_is_first_caller_wins() {
        let cache = MemoryCache::new();
        assert!(cache
            .acquire_lock("purchase:CHK-x", Duration::seconds(3))
            .await
            .unwrap());
        assert!(!cache
            .acquire_lock("purchase:CHK-x", Duration::seconds(3))
            .await
            .unwrap());
        cache.release_lock("purchase:CHK-x").await.unwrap();
        assert!(cache
            .acquire_lock("purchase:CHK-x", Duration::seconds(3))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn conditional_mark_admits_one_winner() {
        let clock = TestClock::new(Utc::now());
        let store = MemoryStore::new(clock.clone());
        let sale = Sale::new(
            "S-aa",
            clock.now(),
            clock.now() + Duration::hours(1),
            10,
            clock.now(),
        )
        .unwrap();
        store.seed_sale(
            sale,
            vec![Item::new("i1", "S-aa", "Lamp", "https://img", clock.now())],
        );

        let mut tx = SaleStore::begin(&store).await.unwrap();
        assert!(tx.mark_item_sold("i1", "u1").await.unwrap());
        assert!(!tx.mark_item_sold("i1", "u2").await.unwrap());
        tx.commit().await.unwrap();

        let item = store.item_snapshot("i1").unwrap();
        assert!(item.sold);
        assert_eq!(item.sold_to_user_id.as_deref(), Some("u1"));
    }
}
