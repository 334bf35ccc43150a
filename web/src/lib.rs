//! HTTP surface for the flash sale engine.
//!
//! A thin collaborator over `flashsale-engine`: parses parameters, invokes
//! the checkout flow or purchase engine, and maps domain errors onto HTTP
//! statuses. The router carries permissive CORS, a 90 second request timeout
//! and a panic-recovery boundary that converts faults into neutral 500s.
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET  | `/sales/active` | the currently active sale |
//! | GET  | `/sales/{id}` | sale by id |
//! | GET  | `/sales/{id}/items` | sale inventory (`limit`, `offset`, `available`) |
//! | POST | `/admin/sales` | create a sale and its items |
//! | POST | `/checkout?user_id&item_id` | add an item to the user's checkout |
//! | POST | `/purchase?code` | commit a checkout |
//! | GET  | `/health` | service and dependency status |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
