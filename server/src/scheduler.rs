//! Hourly sale scheduler.
//!
//! On startup and then once per hour, creates a new sale aligned to the top
//! of the current hour if none is active, and bulk-inserts its generated
//! inventory. Stops when the shutdown signal flips.

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::watch;

use flashsale_core::{codes, fixtures, Clock, Result, Sale, SaleError, SaleStore};

/// Interval between scheduler passes.
const TICK: std::time::Duration = std::time::Duration::from_secs(3600);

/// Periodic sale creator.
pub struct SaleScheduler<S, T> {
    sales: S,
    clock: T,
    total_items: i32,
}

impl<S, T> SaleScheduler<S, T>
where
    S: SaleStore,
    T: Clock,
{
    /// Create a scheduler producing sales of `total_items` items.
    pub const fn new(sales: S, clock: T, total_items: i32) -> Self {
        Self {
            sales,
            clock,
            total_items,
        }
    }

    /// Run until `shutdown` flips to `true`. The first pass happens
    /// immediately so a fresh deployment has a sale to serve.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Sale scheduler started");
        let mut ticker = tokio::time::interval(TICK);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.ensure_active_sale().await {
                        tracing::error!(%error, "Failed to create scheduled sale");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Sale scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Create a sale for the current hour unless one is already active.
    pub async fn ensure_active_sale(&self) -> Result<()> {
        match self.sales.active_sale().await {
            Ok(active) => {
                tracing::debug!(sale_id = %active.id, "Active sale already exists");
                return Ok(());
            }
            Err(SaleError::SaleNotFound) => {}
            Err(error) => return Err(error),
        }

        let now = self.clock.now();
        let started_at = top_of_hour(now);
        let ended_at = started_at + chrono::Duration::hours(1);

        let sale = Sale::new(codes::sale_id(), started_at, ended_at, self.total_items, now)?;
        self.sales.create_sale(&sale).await?;

        let items = fixtures::items_for_sale(&sale.id, self.total_items, now);
        self.sales.create_items(&items).await?;

        tracing::info!(
            sale_id = %sale.id,
            started_at = %started_at,
            ended_at = %ended_at,
            total_items = self.total_items,
            "Created new sale"
        );
        Ok(())
    }
}

fn top_of_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashsale_testing::{MemoryStore, TestClock};

    #[tokio::test]
    async fn creates_hour_aligned_sale_when_none_active() {
        let now: DateTime<Utc> = "2026-07-01T10:17:23Z".parse().unwrap();
        let clock = TestClock::new(now);
        let store = MemoryStore::new(clock.clone());

        let scheduler = SaleScheduler::new(store.clone(), clock, 25);
        scheduler.ensure_active_sale().await.unwrap();

        let sale = store.active_sale().await.unwrap();
        assert_eq!(sale.started_at, "2026-07-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(sale.ended_at, "2026-07-01T11:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(sale.total_items, 25);

        let items = store.items_for_sale(&sale.id, false, 1000, 0).await.unwrap();
        assert_eq!(items.len(), 25);
    }

    #[tokio::test]
    async fn does_not_stack_sales_while_one_is_active() {
        let now: DateTime<Utc> = "2026-07-01T10:17:23Z".parse().unwrap();
        let clock = TestClock::new(now);
        let store = MemoryStore::new(clock.clone());

        let scheduler = SaleScheduler::new(store.clone(), clock, 5);
        scheduler.ensure_active_sale().await.unwrap();
        let first = store.active_sale().await.unwrap();

        scheduler.ensure_active_sale().await.unwrap();
        assert_eq!(store.active_sale().await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn creates_fresh_sale_after_previous_window_ends() {
        let now: DateTime<Utc> = "2026-07-01T10:17:23Z".parse().unwrap();
        let clock = TestClock::new(now);
        let store = MemoryStore::new(clock.clone());

        let scheduler = SaleScheduler::new(store.clone(), clock.clone(), 5);
        scheduler.ensure_active_sale().await.unwrap();
        let first = store.active_sale().await.unwrap();

        clock.advance(chrono::Duration::hours(1));
        scheduler.ensure_active_sale().await.unwrap();
        let second = store.active_sale().await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.started_at, first.ended_at);
    }
}
