//! Sale entity: a time-boxed window with a fixed inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SaleError};

/// A time-boxed flash sale.
///
/// Invariants:
/// - `started_at < ended_at`
/// - `0 <= items_sold <= total_items`
/// - `total_items` is immutable after creation
/// - at most one sale is active at any wall-clock instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Opaque identifier (`S-{10 hex}`).
    pub id: String,
    /// Inclusive start of the sale window.
    pub started_at: DateTime<Utc>,
    /// Exclusive end of the sale window.
    pub ended_at: DateTime<Utc>,
    /// Fixed inventory size.
    pub total_items: i32,
    /// Number of items committed as sold. Authoritative copy lives in the
    /// durable store; the coordination counter is derived.
    pub items_sold: i32,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Create a sale, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Validation`] if the id is empty, the window is
    /// inverted or empty, or the inventory is not positive.
    pub fn new(
        id: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        total_items: i32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SaleError::Validation("sale id cannot be empty".into()));
        }
        if started_at >= ended_at {
            return Err(SaleError::Validation(
                "start time must be before end time".into(),
            ));
        }
        if total_items <= 0 {
            return Err(SaleError::Validation(
                "total items must be greater than zero".into(),
            ));
        }

        Ok(Self {
            id,
            started_at,
            ended_at,
            total_items,
            items_sold: 0,
            created_at: now,
        })
    }

    /// Whether `now` falls inside the sale window (`started_at <= now < ended_at`).
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.started_at && now < self.ended_at
    }

    /// Whether any inventory remains.
    #[must_use]
    pub const fn has_available_items(&self) -> bool {
        self.items_sold < self.total_items
    }

    /// Remaining time until the window closes. Zero once the sale has ended.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.ended_at - now).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = "2026-07-01T10:00:00Z".parse().unwrap();
        let end = "2026-07-01T11:00:00Z".parse().unwrap();
        (start, end)
    }

    #[test]
    fn active_window_is_half_open() {
        let (start, end) = window();
        let sale = Sale::new("S-0011223344", start, end, 100, start).unwrap();

        assert!(sale.is_active(start));
        assert!(sale.is_active(end - Duration::seconds(1)));
        assert!(!sale.is_active(end));
        assert!(!sale.is_active(start - Duration::seconds(1)));
    }

    #[test]
    fn rejects_inverted_window() {
        let (start, end) = window();
        let err = Sale::new("S-0011223344", end, start, 100, start).unwrap_err();
        assert!(matches!(err, SaleError::Validation(_)));
    }

    #[test]
    fn rejects_empty_inventory() {
        let (start, end) = window();
        assert!(Sale::new("S-0011223344", start, end, 0, start).is_err());
    }

    #[test]
    fn remaining_clamps_at_zero() {
        let (start, end) = window();
        let sale = Sale::new("S-0011223344", start, end, 100, start).unwrap();

        assert_eq!(sale.remaining(start), Duration::hours(1));
        assert_eq!(sale.remaining(end + Duration::minutes(5)), Duration::zero());
    }
}
