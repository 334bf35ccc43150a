//! Purchase validation policy and committed results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SaleError};
use crate::item::Item;
use crate::limits::Limits;
use crate::sale::Sale;

/// Pure domain validation applied inside the purchase transaction, after the
/// advisory coordination-store checks and before the per-item conditional
/// updates.
#[derive(Debug, Clone, Copy)]
pub struct PurchasePolicy {
    limits: Limits,
}

impl PurchasePolicy {
    /// Create a policy with the given caps.
    #[must_use]
    pub const fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate that a set of items may be committed against a sale.
    ///
    /// `user_item_count` is the pre-counted number of items the user already
    /// owns in this sale. The purchase engine passes `0` here: the per-item
    /// conditional update is the true guard, and the coordination-store
    /// counters have already rate-limited excess requests.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule: [`SaleError::SaleNotActive`],
    /// [`SaleError::NoItemsToPurchase`], [`SaleError::SaleLimitExceeded`],
    /// [`SaleError::UserLimitExceeded`] or [`SaleError::ItemNotInSale`].
    pub fn validate(
        &self,
        sale: &Sale,
        user_item_count: i64,
        items: &[Item],
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !sale.is_active(now) {
            return Err(SaleError::SaleNotActive);
        }
        if items.is_empty() {
            return Err(SaleError::NoItemsToPurchase);
        }

        let count = items.len() as i64;
        if i64::from(sale.items_sold) + count > self.limits.max_items_per_sale {
            return Err(SaleError::SaleLimitExceeded);
        }
        if user_item_count + count > self.limits.max_items_per_user {
            return Err(SaleError::UserLimitExceeded);
        }
        if let Some(stray) = items.iter().find(|item| !item.belongs_to_sale(&sale.id)) {
            tracing::warn!(item_id = %stray.id, sale_id = %sale.id, "Item from another sale in checkout");
            return Err(SaleError::ItemNotInSale);
        }

        Ok(())
    }

    /// Assemble the frozen result from the attempted items and the subset of
    /// ids whose conditional update won.
    #[must_use]
    pub fn result(&self, attempted: &[Item], successful: &[String]) -> PurchaseResult {
        let items = attempted
            .iter()
            .map(|item| PurchaseItemResult {
                id: item.id.clone(),
                name: item.name.clone(),
                sold: successful.iter().any(|id| *id == item.id),
            })
            .collect();

        PurchaseResult {
            success: !successful.is_empty(),
            items,
            total_purchased: successful.len() as i64,
            failed_count: (attempted.len() - successful.len()) as i64,
        }
    }
}

/// The committed outcome of a purchase, keyed by checkout code in the
/// idempotency table. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    /// Whether at least one item was committed.
    pub success: bool,
    /// Per-item outcomes, in checkout order.
    #[serde(rename = "purchased_items")]
    pub items: Vec<PurchaseItemResult>,
    /// Number of items committed.
    pub total_purchased: i64,
    /// Number of attempted items that were not committed.
    pub failed_count: i64,
}

/// Outcome of a single item within a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItemResult {
    /// Item id.
    pub id: String,
    /// Item display name.
    pub name: String,
    /// Whether this purchase won the item.
    pub sold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sale(items_sold: i32) -> Sale {
        let start: DateTime<Utc> = "2026-07-01T10:00:00Z".parse().unwrap();
        Sale {
            id: "S-aa".into(),
            started_at: start,
            ended_at: start + Duration::hours(1),
            total_items: 10_000,
            items_sold,
            created_at: start,
        }
    }

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| {
                Item::new(
                    format!("i{i}"),
                    "S-aa",
                    format!("Item {i}"),
                    "https://img",
                    Utc::now(),
                )
            })
            .collect()
    }

    fn policy() -> PurchasePolicy {
        PurchasePolicy::new(Limits::default())
    }

    fn mid_sale() -> DateTime<Utc> {
        "2026-07-01T10:30:00Z".parse().unwrap()
    }

    #[test]
    fn accepts_valid_purchase() {
        assert!(policy().validate(&sale(0), 0, &items(3), mid_sale()).is_ok());
    }

    #[test]
    fn rejects_outside_window() {
        let after: DateTime<Utc> = "2026-07-01T11:00:00Z".parse().unwrap();
        assert_eq!(
            policy().validate(&sale(0), 0, &items(1), after),
            Err(SaleError::SaleNotActive)
        );
    }

    #[test]
    fn rejects_empty_item_set() {
        assert_eq!(
            policy().validate(&sale(0), 0, &[], mid_sale()),
            Err(SaleError::NoItemsToPurchase)
        );
    }

    #[test]
    fn rejects_sale_cap_overflow() {
        assert_eq!(
            policy().validate(&sale(9_999), 0, &items(2), mid_sale()),
            Err(SaleError::SaleLimitExceeded)
        );
        assert!(policy()
            .validate(&sale(9_999), 0, &items(1), mid_sale())
            .is_ok());
    }

    #[test]
    fn rejects_user_cap_overflow() {
        assert_eq!(
            policy().validate(&sale(0), 9, &items(2), mid_sale()),
            Err(SaleError::UserLimitExceeded)
        );
    }

    #[test]
    fn rejects_foreign_items() {
        let mut batch = items(2);
        batch[1].sale_id = "S-bb".into();
        assert_eq!(
            policy().validate(&sale(0), 0, &batch, mid_sale()),
            Err(SaleError::ItemNotInSale)
        );
    }

    #[test]
    fn result_partitions_winners_and_losers() {
        let attempted = items(3);
        let successful = vec!["i0".to_string(), "i2".to_string()];
        let result = policy().result(&attempted, &successful);

        assert!(result.success);
        assert_eq!(result.total_purchased, 2);
        assert_eq!(result.failed_count, 1);
        assert!(result.items[0].sold);
        assert!(!result.items[1].sold);
        assert!(result.items[2].sold);
    }

    #[test]
    fn result_with_no_winners_is_failure() {
        let result = policy().result(&items(2), &[]);
        assert!(!result.success);
        assert_eq!(result.total_purchased, 0);
        assert_eq!(result.failed_count, 2);
    }

    #[test]
    fn result_serializes_with_wire_field_names() {
        let result = policy().result(&items(1), &["i0".to_string()]);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("purchased_items").is_some());
        assert_eq!(json["total_purchased"], 1);
    }
}
