//! Core domain model for the flash sale allocation engine.
//!
//! This crate defines everything the engine reasons about, independent of any
//! concrete storage technology:
//!
//! - **Entities**: [`Sale`], [`Item`], [`Checkout`] and the committed
//!   [`PurchaseResult`].
//! - **Error taxonomy**: [`SaleError`], surfaced unchanged to the HTTP
//!   boundary and classified for retry decisions.
//! - **Capability traits**: [`SaleStore`] / [`SaleTx`] (durable store of
//!   record), [`CheckoutStore`] (checkout persistence) and [`Cache`]
//!   (coordination store). The engine is generic over these; the concrete
//!   Postgres/Redis implementations and the in-memory test doubles are
//!   interchangeable variants.
//! - **Policy**: [`PurchasePolicy`] (pure domain validation) and [`Limits`]
//!   (per-user and per-sale caps).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkout;
pub mod clock;
pub mod codes;
pub mod error;
pub mod fixtures;
pub mod item;
pub mod limits;
pub mod ports;
pub mod purchase;
pub mod sale;

pub use checkout::Checkout;
pub use clock::{Clock, SystemClock};
pub use error::{Result, SaleError};
pub use item::Item;
pub use limits::Limits;
pub use ports::{Cache, CheckoutStore, SaleStore, SaleTx};
pub use purchase::{PurchaseItemResult, PurchasePolicy, PurchaseResult};
pub use sale::Sale;
