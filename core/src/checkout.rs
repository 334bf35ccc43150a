//! Checkout aggregate: a user's pre-purchase item selection.
//!
//! A checkout binds a user, a sale and an ordered set of item ids under a
//! server-issued code. It does **not** reserve stock; the items are only
//! committed by the purchase engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SaleError};

/// A pending checkout, identified by its code.
///
/// Within a sale, a user's active checkout has exactly one code; repeated
/// checkout calls append items to it. An item appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    /// Server-issued code (`CHK-{sale_id}-{16 hex}`).
    pub code: String,
    /// Owning sale.
    pub sale_id: String,
    /// Owning user.
    pub user_id: String,
    /// Item ids in insertion order, no duplicates.
    pub item_ids: Vec<String>,
    /// Creation time of the checkout.
    pub created_at: DateTime<Utc>,
}

impl Checkout {
    /// Create a checkout with an initial, non-empty item set.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Validation`] if any identifier is empty or the
    /// item set is empty.
    pub fn new(
        code: impl Into<String>,
        sale_id: impl Into<String>,
        user_id: impl Into<String>,
        item_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let code = code.into();
        let sale_id = sale_id.into();
        let user_id = user_id.into();

        if code.is_empty() {
            return Err(SaleError::Validation("checkout code cannot be empty".into()));
        }
        if sale_id.is_empty() {
            return Err(SaleError::Validation("sale id cannot be empty".into()));
        }
        if user_id.is_empty() {
            return Err(SaleError::Validation("user id cannot be empty".into()));
        }
        if item_ids.is_empty() {
            return Err(SaleError::Validation("item ids cannot be empty".into()));
        }

        Ok(Self {
            code,
            sale_id,
            user_id,
            item_ids,
            created_at: now,
        })
    }

    /// Append an item, rejecting duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::ItemAlreadyInCheckout`] if the item is present.
    pub fn add_item(&mut self, item_id: impl Into<String>) -> Result<()> {
        let item_id = item_id.into();
        if self.item_ids.iter().any(|id| *id == item_id) {
            return Err(SaleError::ItemAlreadyInCheckout);
        }
        self.item_ids.push(item_id);
        Ok(())
    }

    /// Number of items currently in the checkout.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout() -> Checkout {
        Checkout::new(
            "CHK-S-aa-0011223344556677",
            "S-aa",
            "u1",
            vec!["i1".into()],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn appends_preserve_order_and_uniqueness() {
        let mut c = checkout();
        c.add_item("i2").unwrap();
        c.add_item("i3").unwrap();

        assert_eq!(c.item_ids, vec!["i1", "i2", "i3"]);
        assert_eq!(c.add_item("i2"), Err(SaleError::ItemAlreadyInCheckout));
        assert_eq!(c.item_count(), 3);
    }

    #[test]
    fn rejects_empty_fields() {
        let now = Utc::now();
        assert!(Checkout::new("", "S-aa", "u1", vec!["i1".into()], now).is_err());
        assert!(Checkout::new("CHK-x", "", "u1", vec!["i1".into()], now).is_err());
        assert!(Checkout::new("CHK-x", "S-aa", "", vec!["i1".into()], now).is_err());
        assert!(Checkout::new("CHK-x", "S-aa", "u1", vec![], now).is_err());
    }
}
