//! Note persistence and queries
//!
//! All moderation-status writes go through `update_status` / `flag_note`
//! so the state machine is never bypassed by ad-hoc SQL elsewhere.

use chrono::DateTime;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use sticky_common::{Error, ModerationStatus, Note, NoteColor, Position, Result};
use uuid::Uuid;

/// Aggregate per-status counts
#[derive(Debug, Clone, Serialize)]
pub struct WallStats {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub flagged: i64,
    pub total: i64,
}

/// Persist a new note. A duplicate visible id is a conflict, never a
/// silent overwrite.
pub async fn create_note(pool: &SqlitePool, note: &Note) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO notes (
            visible_id, image_url, color, x, y, rotation,
            status, flag_count, owner_identity, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(note.visible_id.to_string())
    .bind(&note.image_url)
    .bind(note.color.as_str())
    .bind(note.position.x)
    .bind(note.position.y)
    .bind(note.rotation)
    .bind(note.status.as_str())
    .bind(note.flag_count)
    .bind(&note.owner_identity)
    .bind(note.created_at.timestamp_millis())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            let duplicate = e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false);
            if duplicate {
                Err(Error::Conflict(format!(
                    "note {} already exists",
                    note.visible_id
                )))
            } else {
                Err(e.into())
            }
        }
    }
}

/// Point lookup by visible id
pub async fn get_note(pool: &SqlitePool, visible_id: Uuid) -> Result<Option<Note>> {
    let row = sqlx::query(
        r#"
        SELECT visible_id, image_url, color, x, y, rotation,
               status, flag_count, owner_identity, created_at_ms
        FROM notes
        WHERE visible_id = ?
        "#,
    )
    .bind(visible_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(note_from_row).transpose()
}

/// All publicly visible notes (approved + pending), oldest first
pub async fn list_public_notes(pool: &SqlitePool) -> Result<Vec<Note>> {
    let rows = sqlx::query(
        r#"
        SELECT visible_id, image_url, color, x, y, rotation,
               status, flag_count, owner_identity, created_at_ms
        FROM notes
        WHERE status IN ('approved', 'pending')
        ORDER BY created_at_ms ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(note_from_row).collect()
}

/// Every note regardless of status, newest first (moderation overview)
pub async fn list_all_notes(pool: &SqlitePool) -> Result<Vec<Note>> {
    let rows = sqlx::query(
        r#"
        SELECT visible_id, image_url, color, x, y, rotation,
               status, flag_count, owner_identity, created_at_ms
        FROM notes
        ORDER BY created_at_ms DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(note_from_row).collect()
}

/// Notes in one moderation status.
///
/// Pending and flagged queues come newest-first so fresh submissions get
/// reviewed promptly; the approved/rejected archive comes oldest-first
/// for FIFO fairness.
pub async fn list_by_status(pool: &SqlitePool, status: ModerationStatus) -> Result<Vec<Note>> {
    let newest_first = matches!(
        status,
        ModerationStatus::Pending | ModerationStatus::Flagged
    );
    let sql = if newest_first {
        r#"
        SELECT visible_id, image_url, color, x, y, rotation,
               status, flag_count, owner_identity, created_at_ms
        FROM notes WHERE status = ?
        ORDER BY created_at_ms DESC
        "#
    } else {
        r#"
        SELECT visible_id, image_url, color, x, y, rotation,
               status, flag_count, owner_identity, created_at_ms
        FROM notes WHERE status = ?
        ORDER BY created_at_ms ASC
        "#
    };

    let rows = sqlx::query(sql)
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(note_from_row).collect()
}

/// Publicly visible notes inside a viewport region, with a fixed padding
/// margin added on all sides so notes straddling the edge still render.
pub async fn query_region(
    pool: &SqlitePool,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
    padding: f64,
) -> Result<Vec<Note>> {
    let rows = sqlx::query(
        r#"
        SELECT visible_id, image_url, color, x, y, rotation,
               status, flag_count, owner_identity, created_at_ms
        FROM notes
        WHERE status IN ('approved', 'pending')
          AND x >= ? AND x <= ?
          AND y >= ? AND y <= ?
        ORDER BY created_at_ms ASC
        "#,
    )
    .bind(min_x - padding)
    .bind(max_x + padding)
    .bind(min_y - padding)
    .bind(max_y + padding)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(note_from_row).collect()
}

/// Manual moderation status write, any status to any status (human
/// review is the final authority). Returns the updated note, or None
/// when the id does not exist.
///
/// Write and read-back are one statement, so a concurrent delete cannot
/// slip between them and turn a successful update into a None.
pub async fn update_status(
    pool: &SqlitePool,
    visible_id: Uuid,
    status: ModerationStatus,
) -> Result<Option<Note>> {
    let row = sqlx::query(
        r#"
        UPDATE notes
        SET status = ?
        WHERE visible_id = ?
        RETURNING visible_id, image_url, color, x, y, rotation,
                  status, flag_count, owner_identity, created_at_ms
        "#,
    )
    .bind(status.as_str())
    .bind(visible_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(note_from_row).transpose()
}

/// Atomically increment a note's flag count, escalating `approved` to
/// `flagged` when the new count reaches the threshold.
///
/// The increment and the conditional transition are one UPDATE so two
/// concurrent flags cannot both observe the pre-increment count. Returns
/// the new (flag_count, status), or None when the id does not exist.
pub async fn flag_note(
    pool: &SqlitePool,
    visible_id: Uuid,
    flag_threshold: i64,
) -> Result<Option<(i64, ModerationStatus)>> {
    let row = sqlx::query(
        r#"
        UPDATE notes
        SET flag_count = flag_count + 1,
            status = CASE
                WHEN status = 'approved' AND flag_count + 1 >= ? THEN 'flagged'
                ELSE status
            END
        WHERE visible_id = ?
        RETURNING flag_count, status
        "#,
    )
    .bind(flag_threshold)
    .bind(visible_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let flag_count: i64 = row.get("flag_count");
            let status = parse_status(row.get("status"))?;
            Ok(Some((flag_count, status)))
        }
        None => Ok(None),
    }
}

/// Remove a note, returning its image reference so the caller can
/// release the stored blob. Deleting a missing id is a NotFound failure,
/// not a silent no-op.
pub async fn delete_note(pool: &SqlitePool, visible_id: Uuid) -> Result<String> {
    let row = sqlx::query("DELETE FROM notes WHERE visible_id = ? RETURNING image_url")
        .bind(visible_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(row.get("image_url")),
        None => Err(Error::NotFound(format!("note {}", visible_id))),
    }
}

/// Per-status counts over whatever the store currently holds
pub async fn stats(pool: &SqlitePool) -> Result<WallStats> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM notes GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut stats = WallStats {
        pending: 0,
        approved: 0,
        rejected: 0,
        flagged: 0,
        total: 0,
    };
    for row in rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        match ModerationStatus::parse(&status) {
            Some(ModerationStatus::Pending) => stats.pending = n,
            Some(ModerationStatus::Approved) => stats.approved = n,
            Some(ModerationStatus::Rejected) => stats.rejected = n,
            Some(ModerationStatus::Flagged) => stats.flagged = n,
            None => {
                tracing::warn!(status = %status, "unknown status in notes table");
            }
        }
        stats.total += n;
    }
    Ok(stats)
}

fn parse_status(raw: String) -> Result<ModerationStatus> {
    ModerationStatus::parse(&raw)
        .ok_or_else(|| Error::Internal(format!("unknown moderation status '{}' in database", raw)))
}

fn note_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Note> {
    let visible_id: String = row.get("visible_id");
    let color: String = row.get("color");
    let created_at_ms: i64 = row.get("created_at_ms");

    Ok(Note {
        visible_id: Uuid::parse_str(&visible_id)
            .map_err(|e| Error::Internal(format!("invalid uuid in database: {}", e)))?,
        image_url: row.get("image_url"),
        color: NoteColor::parse(&color)
            .ok_or_else(|| Error::Internal(format!("unknown color '{}' in database", color)))?,
        position: Position::new(row.get("x"), row.get("y")),
        rotation: row.get("rotation"),
        status: parse_status(row.get("status"))?,
        flag_count: row.get("flag_count"),
        owner_identity: row.get("owner_identity"),
        created_at: DateTime::from_timestamp_millis(created_at_ms)
            .ok_or_else(|| Error::Internal(format!("invalid timestamp {}", created_at_ms)))?,
    })
}
