use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (catalog, staff, settings, commit ledger)");
        // AUTOINCREMENT: ids of deleted rows are never reused.
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE categories (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                sort        INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE subcategories (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                sort        INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_subcategories_category
                ON subcategories(category_id, sort, id);

            CREATE TABLE products (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                subcategory_id  INTEGER NOT NULL REFERENCES subcategories(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                price           TEXT NOT NULL DEFAULT '',
                description     TEXT NOT NULL DEFAULT '',
                media_kind      TEXT,
                media_ref       TEXT,
                is_active       INTEGER NOT NULL DEFAULT 1,
                sort            INTEGER NOT NULL DEFAULT 0,
                CHECK ((media_kind IS NULL) = (media_ref IS NULL))
            );

            CREATE INDEX idx_products_subcategory
                ON products(subcategory_id, sort, id);

            CREATE TABLE purchase_methods (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id  INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL,
                payload     TEXT NOT NULL,
                label       TEXT NOT NULL,
                sort        INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_purchase_methods_product
                ON purchase_methods(product_id, sort, id);

            CREATE TABLE staff (
                user_id     INTEGER PRIMARY KEY,
                role        TEXT NOT NULL CHECK (role IN ('moderator', 'admin', 'owner'))
            );

            CREATE TABLE settings (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL
            );

            CREATE TABLE form_commits (
                session_id      TEXT PRIMARY KEY,
                committed_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
