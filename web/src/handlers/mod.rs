//! Request handlers, one module per endpoint group.

pub mod admin;
pub mod checkout;
pub mod health;
pub mod purchase;
pub mod sales;
