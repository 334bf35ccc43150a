//! Two-phase allocation engine for time-boxed flash sales.
//!
//! The engine is split along the two request phases:
//!
//! - [`CheckoutFlow`]: associates a user with items under a server-issued
//!   checkout code without reserving stock. Coordination-store counters are
//!   advisory admission only; the durable store answers the authoritative
//!   "is this item sold" question.
//! - [`PurchaseEngine`]: commits all items of a checkout atomically under a
//!   per-code exclusion key, a serializable transaction and per-item
//!   conditional updates, records the outcome idempotently, then reconciles
//!   the derived counters and cleans caches best-effort.
//!
//! Both are generic over the capability traits in `flashsale-core`, so the
//! Postgres/Redis implementations and the in-memory test doubles are
//! interchangeable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkout;
pub mod purchase;
pub mod retry;

pub use checkout::{CheckoutConfirmation, CheckoutFlow};
pub use purchase::PurchaseEngine;
pub use retry::RetryPolicy;
