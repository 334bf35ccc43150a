//! Purchase phase: atomically commit every item of a checkout.
//!
//! Protocol (steps must occur in order):
//!
//! 1. probe the `checkout:{code}` marker (absence is non-fatal)
//! 2. load the checkout from the durable store; enforce checkout expiry
//! 3. acquire the per-code exclusion key, released on every exit path
//! 4. run up to N attempts of the transactional commit, with linear backoff;
//!    business outcomes abort the loop immediately
//! 5. (per attempt) best-effort audit logging
//! 6. advisory limit pre-checks against the coordination counters
//! 7-14. serializable transaction: idempotency probe, sale + item loads,
//!    pure domain validation, per-item conditional updates, sale counter and
//!    idempotency record writes, commit
//! 15. best-effort counter reconciliation
//! 16. `AllItemsSold` when nothing was won
//! 17. best-effort cache and checkout-row cleanup
//!
//! The single source of "sold to this user" is the rows-affected outcome of
//! the conditional update in step 12; steps 15 and 17 may diverge transiently
//! without affecting correctness because the durable store always wins.

use chrono::Duration;

use flashsale_core::{
    Cache, Checkout, CheckoutStore, Clock, Limits, PurchasePolicy, PurchaseResult, Result,
    SaleError, SaleStore, SaleTx,
};

use crate::retry::RetryPolicy;

/// The purchase phase of the allocation engine.
pub struct PurchaseEngine<S, C, K, T> {
    sales: S,
    checkouts: C,
    cache: K,
    clock: T,
    policy: PurchasePolicy,
    limits: Limits,
    retry: RetryPolicy,
    lock_ttl: Duration,
}

impl<S, C, K, T> PurchaseEngine<S, C, K, T>
where
    S: SaleStore,
    C: CheckoutStore,
    K: Cache,
    T: Clock,
{
    /// Create a purchase engine with the default retry policy and a 3 second
    /// exclusion-key TTL.
    pub fn new(sales: S, checkouts: C, cache: K, clock: T, limits: Limits) -> Self {
        Self {
            sales,
            checkouts,
            cache,
            clock,
            policy: PurchasePolicy::new(limits),
            limits,
            retry: RetryPolicy::default(),
            lock_ttl: Duration::seconds(3),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Commit all items of the checkout identified by `code`.
    ///
    /// # Errors
    ///
    /// `CheckoutNotFound` for unknown codes, `CheckoutExpired` once the sale
    /// window has closed, `PurchaseInProgress` when another purchase holds the
    /// exclusion key, `CheckoutAlreadyProcessed` for committed codes,
    /// `AllItemsSold` when every item had already been won elsewhere, and the
    /// limit errors from the admission checks.
    pub async fn purchase(&self, code: &str) -> Result<PurchaseResult> {
        if code.is_empty() {
            return Err(SaleError::Validation("checkout code cannot be empty".into()));
        }

        let marker_present = self.cache.checkout_code_exists(code).await?;

        let checkout = match self.checkouts.checkout_by_code(code).await {
            Ok(checkout) => checkout,
            Err(_) => {
                // The checkout rows are cleaned up after a successful commit;
                // the idempotency record outlives them and keeps the answer
                // stable for repeated calls.
                if self.sales.purchase_result(code).await?.is_some() {
                    return Err(SaleError::CheckoutAlreadyProcessed);
                }
                return Err(SaleError::CheckoutNotFound);
            }
        };

        let sale = self.sales.sale(&checkout.sale_id).await?;
        let now = self.clock.now();
        if now >= sale.ended_at {
            return Err(SaleError::CheckoutExpired);
        }

        if !marker_present {
            // The marker can expire or be lost independently of the durable
            // rows; restore it so a second call still short-circuits fast.
            if let Err(error) = self.cache.set_checkout_code(code, sale.remaining(now)).await {
                tracing::warn!(%error, code, "Failed to restore checkout code marker");
            }
        }

        let lock_key = format!("purchase:{code}");
        if !self.cache.acquire_lock(&lock_key, self.lock_ttl).await? {
            return Err(SaleError::PurchaseInProgress);
        }

        let outcome = self.purchase_locked(code, &checkout).await;

        if let Err(error) = self.cache.release_lock(&lock_key).await {
            tracing::error!(%error, %lock_key, "Failed to release purchase exclusion key");
        }

        outcome
    }

    /// Retry loop plus cleanup, run while holding the exclusion key.
    async fn purchase_locked(&self, code: &str, checkout: &Checkout) -> Result<PurchaseResult> {
        let mut outcome = Err(SaleError::TransactionFailed);

        for attempt in 0..self.retry.attempts {
            outcome = self.attempt_purchase(checkout).await;

            match &outcome {
                Ok(_) => break,
                Err(error) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        %error,
                        code,
                        "Purchase attempt failed"
                    );
                    if error.is_business() {
                        break;
                    }
                    if attempt + 1 < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        let result = outcome?;
        self.cleanup_checkout(code, checkout).await;
        Ok(result)
    }

    /// One transactional commit attempt (steps 5-16).
    async fn attempt_purchase(&self, checkout: &Checkout) -> Result<PurchaseResult> {
        for item_id in &checkout.item_ids {
            if let Err(error) = self
                .checkouts
                .log_attempt(&checkout.sale_id, &checkout.user_id, &checkout.code, item_id)
                .await
            {
                tracing::warn!(%error, %item_id, code = %checkout.code, "Failed to log purchase attempt");
            }
        }

        self.advisory_precheck(checkout).await?;

        let mut tx = self.sales.begin().await?;
        let staged = match self.commit_in_tx(&mut tx, checkout).await {
            Ok(staged) => staged,
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!(%rollback_error, code = %checkout.code, "Rollback failed");
                }
                return Err(error);
            }
        };
        tx.commit().await.map_err(|error| {
            tracing::warn!(%error, code = %checkout.code, "Transaction commit failed");
            SaleError::TransactionFailed
        })?;

        let sold = staged.successful.len() as i64;
        if sold > 0 {
            if let Err(error) = self
                .cache
                .increment_counters(&checkout.sale_id, &checkout.user_id, sold)
                .await
            {
                tracing::warn!(%error, code = %checkout.code, sold, "Counter reconciliation failed");
            }
        }

        if staged.successful.is_empty() {
            return Err(SaleError::AllItemsSold);
        }

        tracing::info!(
            code = %checkout.code,
            user_id = %checkout.user_id,
            sale_id = %checkout.sale_id,
            attempted = staged.result.items.len(),
            successful = staged.successful.len(),
            "Purchase completed"
        );

        Ok(staged.result)
    }

    /// Step 6: advisory admission against the derived counters. These shed
    /// load only; the conditional updates below remain the true guard.
    async fn advisory_precheck(&self, checkout: &Checkout) -> Result<()> {
        let item_count = checkout.item_ids.len() as i64;

        let sale_count = match self.cache.sale_items_sold(&checkout.sale_id).await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(%error, sale_id = %checkout.sale_id, "Sale counter read failed");
                0
            }
        };
        if sale_count + item_count > self.limits.max_items_per_sale {
            return Err(SaleError::SaleLimitExceeded);
        }

        let user_count = match self
            .cache
            .user_item_count(&checkout.sale_id, &checkout.user_id)
            .await
        {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(%error, user_id = %checkout.user_id, "User counter read failed");
                0
            }
        };
        if user_count + item_count > self.limits.max_items_per_user {
            return Err(SaleError::UserLimitExceeded);
        }

        Ok(())
    }

    /// Steps 8-13 inside the serializable transaction.
    async fn commit_in_tx(&self, tx: &mut S::Tx, checkout: &Checkout) -> Result<StagedPurchase> {
        if tx.purchase_result(&checkout.code).await?.is_some() {
            return Err(SaleError::CheckoutAlreadyProcessed);
        }

        let mut sale = tx
            .sale(&checkout.sale_id)
            .await
            .map_err(|_| SaleError::SaleNotFound)?;

        let mut items = Vec::with_capacity(checkout.item_ids.len());
        for item_id in &checkout.item_ids {
            match tx.item(item_id).await {
                Ok(item) => items.push(item),
                Err(SaleError::ItemNotFound) => {
                    tracing::warn!(%item_id, code = %checkout.code, "Checkout item vanished, skipping");
                }
                Err(error) => return Err(error),
            }
        }
        if items.is_empty() {
            return Err(SaleError::NoItemsToPurchase);
        }

        // User pre-count is zero here: the conditional updates are the real
        // guard and the coordination counters already rate-limited excess.
        self.policy.validate(&sale, 0, &items, self.clock.now())?;

        let mut successful = Vec::with_capacity(items.len());
        for item in &items {
            let probably_sold = match self.cache.item_probably_sold(&item.id).await {
                Ok(hit) => hit,
                Err(error) => {
                    tracing::warn!(%error, item_id = %item.id, "Sold-items filter check failed");
                    false
                }
            };
            if probably_sold {
                tracing::debug!(item_id = %item.id, "Skipping item flagged by sold-items filter");
                continue;
            }

            match tx.mark_item_sold(&item.id, &checkout.user_id).await {
                Ok(true) => {
                    successful.push(item.id.clone());
                    if let Err(error) = self.cache.add_sold_item(&item.id).await {
                        tracing::warn!(%error, item_id = %item.id, "Failed to record sold item in filter");
                    }
                }
                Ok(false) => {
                    // Lost to a concurrent purchase; hint the filter so later
                    // callers skip the write.
                    if let Err(error) = self.cache.add_sold_item(&item.id).await {
                        tracing::warn!(%error, item_id = %item.id, "Failed to record sold item in filter");
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, item_id = %item.id, "Conditional update failed, skipping item");
                }
            }
        }

        let result = self.policy.result(&items, &successful);

        if !successful.is_empty() {
            sale.items_sold += successful.len() as i32;
            tx.update_sale(&sale).await?;
        }
        tx.save_purchase_result(&checkout.code, &result).await?;

        Ok(StagedPurchase { result, successful })
    }

    /// Step 17: drop the coordination keys and the checkout rows. Failures
    /// are logged only; the committed state is already correct.
    async fn cleanup_checkout(&self, code: &str, checkout: &Checkout) {
        if let Err(error) = self
            .cache
            .remove_user_checkout_state(&checkout.sale_id, &checkout.user_id)
            .await
        {
            tracing::warn!(%error, code, "Failed to drop user checkout state");
        }
        if let Err(error) = self.cache.remove_checkout_code(code).await {
            tracing::warn!(%error, code, "Failed to drop checkout code marker");
        }
        if let Err(error) = self.checkouts.delete_checkout(code).await {
            tracing::warn!(%error, code, "Failed to delete checkout rows");
        }
    }
}

/// Outcome of one in-transaction attempt, pending commit.
struct StagedPurchase {
    result: PurchaseResult,
    successful: Vec<String>,
}
