//! Fasha Storage crate - the append-only order ledger.
//!
//! Provides a WAL-mode SQLite database with migrations, the `OrderLedger`
//! seam the dialogue core appends completed orders through, and an
//! in-memory ledger used in tests and offline runs.

pub mod db;
pub mod ledger;
pub mod migrations;

pub use db::Database;
pub use ledger::{MemoryLedger, OrderLedger, SqliteLedger};
