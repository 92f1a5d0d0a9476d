//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use fasha_core::error::FashaError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), FashaError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| FashaError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| FashaError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: order_ledger");
    }

    Ok(())
}

/// Version 1: the order ledger.
///
/// Rows are append-only. `status` is constrained to `PENDING`; payment
/// verification happens outside this system.
fn apply_v1(conn: &Connection) -> Result<(), FashaError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS orders (
            id               TEXT PRIMARY KEY NOT NULL,
            created_at       INTEGER NOT NULL,
            customer_name    TEXT NOT NULL,
            item_line        TEXT NOT NULL,
            total_amount     INTEGER NOT NULL CHECK (total_amount >= 0),
            total_display    TEXT NOT NULL,
            shipping_address TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'PENDING'
                             CHECK (status IN ('PENDING'))
        );

        CREATE INDEX IF NOT EXISTS idx_orders_created_at
            ON orders (created_at DESC);

        CREATE TRIGGER IF NOT EXISTS orders_no_update
            BEFORE UPDATE ON orders
            BEGIN
                SELECT RAISE(ABORT, 'orders are append-only');
            END;

        CREATE TRIGGER IF NOT EXISTS orders_no_delete
            BEFORE DELETE ON orders
            BEGIN
                SELECT RAISE(ABORT, 'orders are append-only');
            END;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'order_ledger');
        ",
    )
    .map_err(|e| FashaError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
