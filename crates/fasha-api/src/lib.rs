//! Fasha API crate - axum HTTP surface for the shopping assistant.
//!
//! Exposes the dialogue engine (`/chat`), session inspection and reset,
//! the order ledger, and a public health check. Protected routes require
//! an `X-API-Key` header.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
