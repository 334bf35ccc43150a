//! Error taxonomy for the flash sale engine.
//!
//! Domain errors are surfaced unchanged to the HTTP boundary, which maps each
//! kind to a status code. Infrastructure errors ([`SaleError::Database`],
//! [`SaleError::Cache`], [`SaleError::TransactionFailed`]) are retried inside
//! the purchase loop; business errors abort it immediately.

use thiserror::Error;

/// Result type alias for domain operations.
pub type Result<T> = std::result::Result<T, SaleError>;

/// Comprehensive error taxonomy for checkout and purchase flows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SaleError {
    // ── Sale ────────────────────────────────────────────────────────

    /// No sale matches the request (or no sale is currently active).
    #[error("sale not found")]
    SaleNotFound,

    /// The sale exists but the current instant is outside its window.
    #[error("sale is not active")]
    SaleNotActive,

    /// Every item in the sale has been sold.
    #[error("sale is out of stock")]
    SaleOutOfStock,

    /// Committing the purchase would exceed the sale inventory cap.
    #[error("purchase would exceed sale limit")]
    SaleLimitExceeded,

    /// The checkout resolved to zero purchasable items.
    #[error("no items to purchase")]
    NoItemsToPurchase,

    // ── Item ────────────────────────────────────────────────────────

    /// The requested item does not exist.
    #[error("item not found")]
    ItemNotFound,

    /// The item has already been sold.
    #[error("item already sold")]
    ItemAlreadySold,

    /// The item belongs to a different sale than the active one.
    #[error("item not in current sale")]
    ItemNotInSale,

    /// Every item in the checkout had been sold by the time of commit.
    #[error("all items from checkout already sold")]
    AllItemsSold,

    // ── Checkout ────────────────────────────────────────────────────

    /// No checkout exists for the given code.
    #[error("checkout not found")]
    CheckoutNotFound,

    /// The checkout's sale window has ended; the code can no longer commit.
    #[error("checkout expired")]
    CheckoutExpired,

    /// The item is already part of this checkout.
    #[error("item already in checkout")]
    ItemAlreadyInCheckout,

    /// The user already checked this item out in the current sale.
    #[error("user already checked out this item")]
    UserAlreadyCheckedOutItem,

    /// The user has reached the per-sale item cap.
    #[error("user has reached maximum items limit")]
    UserLimitExceeded,

    /// The checkout code was already committed; its result is frozen.
    #[error("checkout code has already been processed")]
    CheckoutAlreadyProcessed,

    /// Another purchase currently holds the exclusion key for this code.
    #[error("another purchase is in progress for this checkout")]
    PurchaseInProgress,

    // ── Infrastructure ──────────────────────────────────────────────

    /// The serializable transaction could not be committed.
    #[error("transaction failed")]
    TransactionFailed,

    /// Durable store failure.
    #[error("database error: {0}")]
    Database(String),

    /// Coordination store failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Invalid input to a domain constructor.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl SaleError {
    /// Returns `true` for business-logic outcomes that must never be retried.
    ///
    /// The purchase engine retries transient infrastructure failures up to its
    /// attempt budget; everything else represents a final answer.
    #[must_use]
    pub const fn is_business(&self) -> bool {
        !matches!(
            self,
            Self::TransactionFailed | Self::Database(_) | Self::Cache(_)
        )
    }
}
