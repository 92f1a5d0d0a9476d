//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use fasha_catalog::CatalogService;
use fasha_chat::DialogueEngine;
use fasha_storage::OrderLedger;

/// Shared application state, passed to handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DialogueEngine>,
    /// Read side of the ledger for `/orders`.
    pub ledger: Arc<dyn OrderLedger>,
    pub catalog: Arc<dyn CatalogService>,
    /// Accepted `X-API-Key` values.
    pub api_keys: Arc<Vec<String>>,
    /// Chat requests allowed per second across all clients.
    pub rate_limit_per_sec: u64,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        engine: Arc<DialogueEngine>,
        ledger: Arc<dyn OrderLedger>,
        catalog: Arc<dyn CatalogService>,
        api_keys: Vec<String>,
    ) -> Self {
        Self {
            engine,
            ledger,
            catalog,
            api_keys: Arc::new(api_keys),
            rate_limit_per_sec: 50,
            start_time: Instant::now(),
        }
    }

    pub fn with_rate_limit(mut self, per_sec: u64) -> Self {
        self.rate_limit_per_sec = per_sec;
        self
    }

    pub fn accepts_key(&self, key: &str) -> bool {
        !key.is_empty() && self.api_keys.iter().any(|k| k == key)
    }
}
