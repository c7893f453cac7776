//! Schema setup for the item index.
//!
//! `items` holds one row per catalog identifier. `items_fts` is an FTS5
//! external-content index over `items.full_text`; the three triggers keep it
//! in step with every insert, update and delete, so nothing outside SQLite
//! ever writes the search vector.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables, triggers and indexes. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // `pk` is an explicit rowid alias so FTS rowids survive VACUUM.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            pk INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            collection TEXT NOT NULL,
            title TEXT NOT NULL,
            image_url TEXT,
            date TEXT NOT NULL,
            year INTEGER NOT NULL,
            full_text TEXT NOT NULL,
            harvested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='items_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE items_fts USING fts5(
                full_text,
                content='items',
                content_rowid='pk',
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS items_ai AFTER INSERT ON items BEGIN
            INSERT INTO items_fts(rowid, full_text) VALUES (new.pk, new.full_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS items_ad AFTER DELETE ON items BEGIN
            INSERT INTO items_fts(items_fts, rowid, full_text)
            VALUES ('delete', old.pk, old.full_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS items_au AFTER UPDATE ON items BEGIN
            INSERT INTO items_fts(items_fts, rowid, full_text)
            VALUES ('delete', old.pk, old.full_text);
            INSERT INTO items_fts(rowid, full_text) VALUES (new.pk, new.full_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_year ON items(year)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_collection ON items(collection)")
        .execute(pool)
        .await?;

    Ok(())
}
