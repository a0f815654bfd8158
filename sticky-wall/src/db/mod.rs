//! Database access for the wall service

pub mod notes;
pub mod rate_limits;

use sticky_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool, creating the file and
/// schema on first run.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the wall tables if they don't exist.
///
/// Notes are indexed by status and owner for the moderation queue and
/// audit lookups; rate-limit records by (hash, timestamp) for the
/// "most recent within window" query.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            visible_id TEXT PRIMARY KEY,
            image_url TEXT NOT NULL,
            color TEXT NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            rotation REAL NOT NULL DEFAULT 0.0,
            status TEXT NOT NULL DEFAULT 'pending',
            flag_count INTEGER NOT NULL DEFAULT 0,
            owner_identity TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_status ON notes(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner_identity)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_limit_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier_hash TEXT NOT NULL,
            note_id TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rate_limit_hash_time \
         ON rate_limit_records(identifier_hash, created_at_ms)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (notes, rate_limit_records)");

    Ok(())
}
