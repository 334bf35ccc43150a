//! Redis implementation of the coordination store.
//!
//! One `RedisCache` wraps a multiplexed [`ConnectionManager`] and implements
//! the `flashsale_core::Cache` capability:
//!
//! - derived per-sale and per-(user, sale) counters
//! - the checkout-code registry and per-user checked-item sets
//! - atomic multi-key admission via server-evaluated Lua scripts
//! - the sold-items probabilistic filter ([`RedisBloomFilter`])
//! - `SET NX EX` exclusion keys with bounded TTL
//!
//! # Key layout
//!
//! - `sale:{S}:items_sold`: integer counter
//! - `user:{U}:sale:{S}:count`: integer counter, 24h TTL
//! - `user:{U}:sale:{S}:checkout_count`: integer counter
//! - `user:{U}:sale:{S}:checkout`: active checkout code
//! - `user:{U}:sale:{S}:checked_items`: set of item ids
//! - `checkout:{code}`: existence marker, TTL = sale remaining
//! - `bloom:sold_items`: filter bitset
//! - `lock:{key}`: exclusion sentinel, short TTL

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bloom;
pub mod scripts;

use chrono::Duration;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use flashsale_core::{Cache, Result, SaleError};

pub use bloom::{optimal_parameters, RedisBloomFilter};

/// Expected sold-item cardinality the filter is sized for.
const FILTER_EXPECTED_ITEMS: u64 = 100_000;
/// Target false-positive rate of the filter.
const FILTER_FP_RATE: f64 = 0.01;
/// Bitset key of the sold-items filter.
const FILTER_KEY: &str = "bloom:sold_items";

/// Redis-backed coordination store.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    filter: RedisBloomFilter,
    purchase_script: Script,
    user_limit_script: Script,
    sale_limit_script: Script,
    increment_script: Script,
}

impl RedisCache {
    /// Connect to Redis and size the sold-items filter.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Cache`] if the client or connection manager
    /// cannot be created.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| SaleError::Cache(format!("failed to create redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to connect to redis: {e}")))?;

        Ok(Self::from_connection(conn))
    }

    /// Build a cache over an existing connection manager.
    #[must_use]
    pub fn from_connection(conn: ConnectionManager) -> Self {
        let (m, k) = optimal_parameters(FILTER_EXPECTED_ITEMS, FILTER_FP_RATE);
        let filter = RedisBloomFilter::new(conn.clone(), FILTER_KEY, m, k);

        Self {
            conn,
            filter,
            purchase_script: Script::new(scripts::PURCHASE_SCRIPT),
            user_limit_script: Script::new(scripts::USER_LIMIT_SCRIPT),
            sale_limit_script: Script::new(scripts::SALE_LIMIT_SCRIPT),
            increment_script: Script::new(scripts::INCREMENT_SCRIPT),
        }
    }

    /// Access the sold-items filter directly (rebuild jobs, diagnostics).
    #[must_use]
    pub const fn filter(&self) -> &RedisBloomFilter {
        &self.filter
    }

    /// Liveness probe for health reporting.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Cache`] if the server does not answer `PING`.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("redis ping failed: {e}")))?;
        Ok(())
    }

    fn sale_key(sale_id: &str) -> String {
        format!("sale:{sale_id}:items_sold")
    }

    fn user_count_key(sale_id: &str, user_id: &str) -> String {
        format!("user:{user_id}:sale:{sale_id}:count")
    }

    fn user_checkout_count_key(sale_id: &str, user_id: &str) -> String {
        format!("user:{user_id}:sale:{sale_id}:checkout_count")
    }

    fn user_checkout_key(sale_id: &str, user_id: &str) -> String {
        format!("user:{user_id}:sale:{sale_id}:checkout")
    }

    fn checked_items_key(sale_id: &str, user_id: &str) -> String {
        format!("user:{user_id}:sale:{sale_id}:checked_items")
    }

    fn checkout_key(code: &str) -> String {
        format!("checkout:{code}")
    }

    fn lock_key(key: &str) -> String {
        format!("lock:{key}")
    }

    fn ttl_seconds(ttl: Duration) -> u64 {
        #[allow(clippy::cast_sign_loss)]
        {
            ttl.num_seconds().max(1) as u64
        }
    }

    async fn read_counter(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn
            .get(key)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to read counter {key}: {e}")))?;
        Ok(value.unwrap_or(0))
    }
}

impl Cache for RedisCache {
    async fn add_sold_item(&self, item_id: &str) -> Result<()> {
        self.filter.add(item_id).await
    }

    async fn item_probably_sold(&self, item_id: &str) -> Result<bool> {
        self.filter.contains(item_id).await
    }

    async fn user_item_count(&self, sale_id: &str, user_id: &str) -> Result<i64> {
        self.read_counter(&Self::user_count_key(sale_id, user_id)).await
    }

    async fn user_checkout_count(&self, sale_id: &str, user_id: &str) -> Result<i64> {
        self.read_counter(&Self::user_checkout_count_key(sale_id, user_id))
            .await
    }

    async fn increment_user_checkout_count(&self, sale_id: &str, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .incr(Self::user_checkout_count_key(sale_id, user_id), 1)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to increment checkout counter: {e}")))?;
        Ok(())
    }

    async fn available_checkout_slots(
        &self,
        sale_id: &str,
        user_id: &str,
        max_items: i64,
    ) -> Result<i64> {
        let purchased = self.user_item_count(sale_id, user_id).await?;
        let in_checkout = self.user_checkout_count(sale_id, user_id).await?;
        Ok(max_items - purchased - in_checkout)
    }

    async fn sale_items_sold(&self, sale_id: &str) -> Result<i64> {
        self.read_counter(&Self::sale_key(sale_id)).await
    }

    async fn set_sale_items_sold(&self, sale_id: &str, count: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(Self::sale_key(sale_id), count)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to set sale counter: {e}")))?;
        Ok(())
    }

    async fn user_checkout_code(&self, sale_id: &str, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let code: Option<String> = conn
            .get(Self::user_checkout_key(sale_id, user_id))
            .await
            .map_err(|e| SaleError::Cache(format!("failed to read checkout code: {e}")))?;
        Ok(code.filter(|c| !c.is_empty()))
    }

    async fn set_user_checkout_code(
        &self,
        sale_id: &str,
        user_id: &str,
        code: &str,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                Self::user_checkout_key(sale_id, user_id),
                code,
                Self::ttl_seconds(ttl),
            )
            .await
            .map_err(|e| SaleError::Cache(format!("failed to bind checkout code: {e}")))?;
        Ok(())
    }

    async fn remove_user_checkout_state(&self, sale_id: &str, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .cmd("DEL")
            .arg(Self::user_checkout_key(sale_id, user_id))
            .ignore()
            .cmd("DEL")
            .arg(Self::user_checkout_count_key(sale_id, user_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to drop user checkout state: {e}")))?;
        Ok(())
    }

    async fn set_checkout_code(&self, code: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::checkout_key(code), 1, Self::ttl_seconds(ttl))
            .await
            .map_err(|e| SaleError::Cache(format!("failed to register checkout code: {e}")))?;
        Ok(())
    }

    async fn checkout_code_exists(&self, code: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(Self::checkout_key(code))
            .await
            .map_err(|e| SaleError::Cache(format!("failed to probe checkout code: {e}")))
    }

    async fn remove_checkout_code(&self, code: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(Self::checkout_key(code))
            .await
            .map_err(|e| SaleError::Cache(format!("failed to remove checkout code: {e}")))?;
        Ok(())
    }

    async fn has_checked_out_item(
        &self,
        sale_id: &str,
        user_id: &str,
        item_id: &str,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(Self::checked_items_key(sale_id, user_id), item_id)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to probe checked-item set: {e}")))
    }

    async fn add_checked_out_item(
        &self,
        sale_id: &str,
        user_id: &str,
        item_id: &str,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::checked_items_key(sale_id, user_id);
        let _: () = redis::pipe()
            .cmd("SADD")
            .arg(&key)
            .arg(item_id)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(Self::ttl_seconds(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to record checked-out item: {e}")))?;
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
        let mut conn = self.conn.clone();
        let admitted: i64 = self
            .purchase_script
            .key(Self::sale_key(sale_id))
            .key(Self::user_count_key(sale_id, user_id))
            .arg(item_count)
            .arg(max_sale_items)
            .arg(max_user_items)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("purchase admission script failed: {e}")))?;

        Ok(admitted == 1)
    }

    async fn user_limit_check(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
        max_items: i64,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let admitted: i64 = self
            .user_limit_script
            .key(Self::user_count_key(sale_id, user_id))
            .arg(item_count)
            .arg(max_items)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("user limit script failed: {e}")))?;

        Ok(admitted == 1)
    }

    async fn sale_limit_check(
        &self,
        sale_id: &str,
        item_count: i64,
        max_items: i64,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let admitted: i64 = self
            .sale_limit_script
            .key(Self::sale_key(sale_id))
            .arg(item_count)
            .arg(max_items)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("sale limit script failed: {e}")))?;

        Ok(admitted == 1)
    }

    async fn increment_counters(
        &self,
        sale_id: &str,
        user_id: &str,
        item_count: i64,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .increment_script
            .key(Self::sale_key(sale_id))
            .key(Self::user_count_key(sale_id, user_id))
            .arg(item_count)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("counter increment script failed: {e}")))?;
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(key))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to acquire lock {key}: {e}")))?;

        Ok(acquired.is_some())
    }

    async fn release_lock(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(Self::lock_key(key))
            .await
            .map_err(|e| SaleError::Cache(format!("failed to release lock {key}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require a running Redis instance:
    //   docker run -d -p 6379:6379 redis:7-alpine
    // They are #[ignore]d so `cargo test` stays hermetic.

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn purchase_script_moves_both_counters_or_neither() {
        let cache = RedisCache::connect(REDIS_URL).await.unwrap();
        let sale_id = unique("sale");
        let user_id = unique("user");

        assert!(cache
            .purchase_check(&sale_id, &user_id, 3, 10, 10)
            .await
            .unwrap());
        assert_eq!(cache.sale_items_sold(&sale_id).await.unwrap(), 3);
        assert_eq!(cache.user_item_count(&sale_id, &user_id).await.unwrap(), 3);

        // Denied: user cap would be exceeded, sale counter must not move.
        assert!(!cache
            .purchase_check(&sale_id, &user_id, 8, 100, 10)
            .await
            .unwrap());
        assert_eq!(cache.sale_items_sold(&sale_id).await.unwrap(), 3);
        assert_eq!(cache.user_item_count(&sale_id, &user_id).await.unwrap(), 3);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn exclusion_key_is_single_winner_until_released() {
        let cache = RedisCache::connect(REDIS_URL).await.unwrap();
        let key = unique("purchase");

        assert!(cache.acquire_lock(&key, Duration::seconds(3)).await.unwrap());
        assert!(!cache.acquire_lock(&key, Duration::seconds(3)).await.unwrap());
        cache.release_lock(&key).await.unwrap();
        assert!(cache.acquire_lock(&key, Duration::seconds(3)).await.unwrap());
        cache.release_lock(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn filter_has_no_false_negatives() {
        let cache = RedisCache::connect(REDIS_URL).await.unwrap();

        let added: Vec<String> = (0..64).map(|i| unique(&format!("item-{i}"))).collect();
        for item in &added {
            cache.add_sold_item(item).await.unwrap();
        }
        for item in &added {
            assert!(cache.item_probably_sold(item).await.unwrap());
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn checkout_code_registry_round_trip() {
        let cache = RedisCache::connect(REDIS_URL).await.unwrap();
        let sale_id = unique("sale");
        let code = unique("CHK");

        assert_eq!(cache.user_checkout_code(&sale_id, "u1").await.unwrap(), None);
        cache
            .set_user_checkout_code(&sale_id, "u1", &code, Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(
            cache.user_checkout_code(&sale_id, "u1").await.unwrap(),
            Some(code.clone())
        );

        cache
            .set_checkout_code(&code, Duration::minutes(10))
            .await
            .unwrap();
        assert!(cache.checkout_code_exists(&code).await.unwrap());

        cache.remove_user_checkout_state(&sale_id, "u1").await.unwrap();
        cache.remove_checkout_code(&code).await.unwrap();
        assert_eq!(cache.user_checkout_code(&sale_id, "u1").await.unwrap(), None);
        assert!(!cache.checkout_code_exists(&code).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn checked_item_set_membership() {
        let cache = RedisCache::connect(REDIS_URL).await.unwrap();
        let sale_id = unique("sale");

        assert!(!cache
            .has_checked_out_item(&sale_id, "u1", "i1")
            .await
            .unwrap());
        cache
            .add_checked_out_item(&sale_id, "u1", "i1", Duration::minutes(10))
            .await
            .unwrap();
        assert!(cache
            .has_checked_out_item(&sale_id, "u1", "i1")
            .await
            .unwrap());
        assert!(!cache
            .has_checked_out_item(&sale_id, "u2", "i1")
            .await
            .unwrap());
    }
}
