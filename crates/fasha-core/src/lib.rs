//! Shared foundation for the Fasha shopping assistant.
//!
//! Configuration, the top-level error type, and the domain types that
//! cross crate boundaries (catalog entries, ledger entries, tiers).

pub mod config;
pub mod error;
pub mod money;
pub mod types;

pub use config::FashaConfig;
pub use error::{FashaError, Result};
pub use money::{format_rupiah, group_thousands};
pub use types::*;
