//! Database access for artfetch-svc
//!
//! All queue/session/cache state lives in one SQLite database in the root
//! folder. The modules here are the only code that touches these tables;
//! the pipeline components go through them so the uniqueness and lifecycle
//! invariants hold.

pub mod cache;
pub mod queue;
pub mod sessions;
pub mod settings;
pub mod textures;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and create tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = artfetch_common::db::open_pool(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all artfetch tables if they don't exist.
///
/// Exposed for tests, which run against in-memory pools.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    artfetch_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            media_types TEXT NOT NULL DEFAULT '[]',
            art_types TEXT NOT NULL DEFAULT '[]',
            stats TEXT NOT NULL DEFAULT '{}',
            started TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            completed TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS art_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            guid TEXT NOT NULL,
            media_type TEXT NOT NULL,
            library_id INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            year TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            priority INTEGER NOT NULL DEFAULT 5,
            scope TEXT NOT NULL DEFAULT '',
            scan_session_id INTEGER,
            date_added TEXT NOT NULL,
            date_processed TEXT,
            FOREIGN KEY(scan_session_id) REFERENCES scan_sessions(id) ON DELETE SET NULL,
            UNIQUE(media_type, library_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS art_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue_id INTEGER NOT NULL,
            art_type TEXT NOT NULL,
            baseline_url TEXT NOT NULL DEFAULT '',
            current_url TEXT NOT NULL DEFAULT '',
            selected_url TEXT,
            auto_applied INTEGER NOT NULL DEFAULT 0,
            review_mode TEXT NOT NULL DEFAULT 'missing',
            requires_manual INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            scan_session_id INTEGER,
            date_processed TEXT,
            FOREIGN KEY(queue_id) REFERENCES art_queue(id) ON DELETE CASCADE,
            UNIQUE(queue_id, art_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artwork_cache (
            media_type TEXT NOT NULL,
            media_id TEXT NOT NULL,
            source TEXT NOT NULL,
            art_type TEXT NOT NULL,
            data TEXT NOT NULL,
            release_date TEXT,
            cached_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (media_type, media_id, source, art_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS texture_cache (
            url TEXT PRIMARY KEY,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            cached_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS precache_queue (
            url TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            queued_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_status ON art_queue(status, priority)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_media ON art_queue(media_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_queue ON art_items(queue_id, status)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}
