//! Rate-limit record persistence
//!
//! Records are immutable proofs of prior submissions. Eligibility only
//! ever needs the most recent record per identifier hash; everything
//! older than twice the window is garbage.

use sqlx::{Row, SqlitePool};
use sticky_common::Result;
use uuid::Uuid;

/// Record an accepted submission against an identifier hash
pub async fn insert_record(
    pool: &SqlitePool,
    identifier_hash: &str,
    note_id: Uuid,
    created_at_ms: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO rate_limit_records (identifier_hash, note_id, created_at_ms) VALUES (?, ?, ?)",
    )
    .bind(identifier_hash)
    .bind(note_id.to_string())
    .bind(created_at_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Timestamp of the most recent submission for an identifier hash
pub async fn most_recent_ms(pool: &SqlitePool, identifier_hash: &str) -> Result<Option<i64>> {
    let row = sqlx::query(
        "SELECT MAX(created_at_ms) AS last_ms FROM rate_limit_records WHERE identifier_hash = ?",
    )
    .bind(identifier_hash)
    .fetch_one(pool)
    .await?;

    // MAX over zero rows yields a NULL aggregate
    let last_ms: Option<i64> = row.get("last_ms");
    Ok(last_ms)
}

/// Delete records older than the cutoff; storage hygiene only, no
/// externally observable effect on eligibility.
pub async fn purge_older_than(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM rate_limit_records WHERE created_at_ms < ?")
        .bind(cutoff_ms)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
