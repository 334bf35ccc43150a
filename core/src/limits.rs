//! Per-user and per-sale allocation caps.

use serde::{Deserialize, Serialize};

/// Hard caps enforced by both the advisory (coordination store) and the
/// authoritative (durable store) admission paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum items a single user may purchase within one sale.
    pub max_items_per_user: i64,
    /// Maximum items sold across one sale (its inventory size).
    pub max_items_per_sale: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_items_per_user: 10,
            max_items_per_sale: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_caps() {
        let limits = Limits::default();
        assert_eq!(limits.max_items_per_user, 10);
        assert_eq!(limits.max_items_per_sale, 10_000);
    }
}
