//! Append-only order ledger.
//!
//! The dialogue core appends exactly one row per completed order through
//! [`OrderLedger`]. Rows are never updated or deleted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::Row;
use tracing::{debug, info};
use uuid::Uuid;

use fasha_core::error::FashaError;
use fasha_core::types::{LedgerEntry, LedgerStatus, NewLedgerEntry};

use crate::db::Database;

/// Durable store of completed orders.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Append one completed order with status `PENDING`.
    ///
    /// On error nothing has been written.
    async fn append_order(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, FashaError>;

    /// Most recent rows first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<LedgerEntry>, FashaError>;

    /// Total number of rows.
    async fn count(&self) -> Result<u64, FashaError>;
}

// ---------------------------------------------------------------------------
// SqliteLedger
// ---------------------------------------------------------------------------

/// Ledger backed by the `orders` table.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    db: Arc<Database>,
}

impl SqliteLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, FashaError>
    where
        F: FnOnce(&Database) -> Result<T, FashaError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| FashaError::Storage(format!("Ledger task failed: {}", e)))?
    }
}

#[async_trait]
impl OrderLedger for SqliteLedger {
    async fn append_order(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, FashaError> {
        let amount = i64::try_from(entry.total_amount).map_err(|_| {
            FashaError::Storage(format!("Order total {} exceeds ledger range", entry.total_amount))
        })?;
        let row = LedgerEntry::from_new(entry);
        let stored = row.clone();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO orders (id, created_at, customer_name, item_line, total_amount,
                                         total_display, shipping_address, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        stored.id.to_string(),
                        stored.created_at.timestamp_millis(),
                        stored.customer_name,
                        stored.item_line,
                        amount,
                        stored.total_display,
                        stored.shipping_address,
                        stored.status.as_str(),
                    ],
                )
                .map_err(|e| FashaError::Storage(format!("Failed to append order: {}", e)))?;
                Ok(())
            })
        })
        .await?;

        info!(order_id = %row.id, total = %row.total_display, "Order appended to ledger");
        Ok(row)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<LedgerEntry>, FashaError> {
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, created_at, customer_name, item_line, total_amount,
                                total_display, shipping_address
                         FROM orders
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT ?1",
                    )
                    .map_err(|e| FashaError::Storage(e.to_string()))?;

                let rows = stmt
                    .query_map(rusqlite::params![limit as i64], |row| Ok(row_to_entry(row)))
                    .map_err(|e| FashaError::Storage(e.to_string()))?;

                let mut entries = Vec::new();
                for row in rows {
                    let entry = row.map_err(|e| FashaError::Storage(e.to_string()))??;
                    entries.push(entry);
                }
                debug!(count = entries.len(), "Listed recent orders");
                Ok(entries)
            })
        })
        .await
    }

    async fn count(&self) -> Result<u64, FashaError> {
        self.blocking(|db| {
            db.with_conn(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
                    .map_err(|e| FashaError::Storage(e.to_string()))?;
                Ok(count as u64)
            })
        })
        .await
    }
}

fn row_to_entry(row: &Row<'_>) -> Result<LedgerEntry, FashaError> {
    let get_err = |e: rusqlite::Error| FashaError::Storage(e.to_string());

    let id: String = row.get(0).map_err(get_err)?;
    let millis: i64 = row.get(1).map_err(get_err)?;
    let total_amount: i64 = row.get(4).map_err(get_err)?;

    let id = Uuid::parse_str(&id)
        .map_err(|e| FashaError::Storage(format!("Invalid order id: {}", e)))?;
    let created_at = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| FashaError::Storage(format!("Invalid timestamp: {}", millis)))?;

    Ok(LedgerEntry {
        id,
        created_at,
        customer_name: row.get(2).map_err(get_err)?,
        item_line: row.get(3).map_err(get_err)?,
        total_amount: total_amount.max(0) as u64,
        total_display: row.get(5).map_err(get_err)?,
        shipping_address: row.get(6).map_err(get_err)?,
        status: LedgerStatus::Pending,
    })
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// In-process ledger for tests and offline runs.
///
/// Appends can be switched off with [`MemoryLedger::set_writable`] to
/// simulate an unavailable store.
#[derive(Debug)]
pub struct MemoryLedger {
    rows: Mutex<Vec<LedgerEntry>>,
    writable: AtomicBool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            writable: AtomicBool::new(true),
        }
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Snapshot of every row in append order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OrderLedger for MemoryLedger {
    async fn append_order(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, FashaError> {
        if !self.writable.load(Ordering::SeqCst) {
            return Err(FashaError::Storage("Ledger is not writable".to_string()));
        }
        let row = LedgerEntry::from_new(entry);
        self.rows
            .lock()
            .map_err(|e| FashaError::Storage(format!("Ledger lock poisoned: {}", e)))?
            .push(row.clone());
        Ok(row)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<LedgerEntry>, FashaError> {
        let rows = self
            .rows
            .lock()
            .map_err(|e| FashaError::Storage(format!("Ledger lock poisoned: {}", e)))?;
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<u64, FashaError> {
        let rows = self
            .rows
            .lock()
            .map_err(|e| FashaError::Storage(format!("Ledger lock poisoned: {}", e)))?;
        Ok(rows.len() as u64)
    }
}
