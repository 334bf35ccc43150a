//! Item entity: one unit of sale inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A distinct item offered in a sale.
///
/// The `sold = false -> true` transition is monotone and happens exactly once,
/// through the durable store's conditional update. `sold` implies both
/// `sold_to_user_id` and `sold_at` are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Opaque identifier.
    pub id: String,
    /// Owning sale.
    pub sale_id: String,
    /// Display name.
    pub name: String,
    /// Display image.
    pub image_url: String,
    /// Whether the item has been committed as sold.
    pub sold: bool,
    /// Buyer, once sold.
    pub sold_to_user_id: Option<String>,
    /// Commit time, once sold.
    pub sold_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create an unsold item.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        sale_id: impl Into<String>,
        name: impl Into<String>,
        image_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sale_id: sale_id.into(),
            name: name.into(),
            image_url: image_url.into(),
            sold: false,
            sold_to_user_id: None,
            sold_at: None,
            created_at: now,
        }
    }

    /// Whether the item belongs to the given sale.
    #[must_use]
    pub fn belongs_to_sale(&self, sale_id: &str) -> bool {
        self.sale_id == sale_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_unsold() {
        let now = Utc::now();
        let item = Item::new("item_1", "S-aa", "Vintage Lamp", "https://img/1", now);

        assert!(!item.sold);
        assert!(item.sold_to_user_id.is_none());
        assert!(item.sold_at.is_none());
        assert!(item.belongs_to_sale("S-aa"));
        assert!(!item.belongs_to_sale("S-bb"));
    }
}
