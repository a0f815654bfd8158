//! Moderation endpoints
//!
//! Gated by a shared-secret bearer credential compared against the
//! configured admin key. In local-dev mode the gate is skipped entirely
//! so the admin tooling works without secrets on a developer machine.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sticky_common::config::WallConfig;
use sticky_common::{ModerationStatus, Note, NoteColor};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::db::notes::WallStats;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Manual moderation action. Approve/reject are unconstrained
/// transitions; human review is the final authority and may reverse
/// any previous decision. Delete is irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
    Delete,
}

/// Moderation queue entry: the full note plus audit fields the public
/// surface hides.
#[derive(Debug, Serialize)]
pub struct ModerationNote {
    pub visible_id: Uuid,
    pub image_url: String,
    pub color: NoteColor,
    pub x: f64,
    pub y: f64,
    pub status: ModerationStatus,
    pub flag_count: i64,
    pub owner_identity: String,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&Note> for ModerationNote {
    fn from(note: &Note) -> Self {
        Self {
            visible_id: note.visible_id,
            image_url: note.image_url.clone(),
            color: note.color,
            x: note.position.x,
            y: note.position.y,
            status: note.status,
            flag_count: note.flag_count,
            owner_identity: note.owner_identity.clone(),
            created_at: note.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModerationListParams {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModerationListResponse {
    pub notes: Vec<ModerationNote>,
}

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub action: ModerationAction,
}

#[derive(Debug, Serialize)]
pub struct ModerateResponse {
    pub visible_id: Uuid,
    pub action: ModerationAction,
    /// Status after the action; absent when the note was deleted
    pub status: Option<ModerationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct BatchModerateRequest {
    pub ids: Vec<Uuid>,
    pub action: ModerationAction,
}

#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    pub visible_id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchModerateResponse {
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

/// Validate the admin bearer credential; skipped in local-dev mode.
fn require_admin(config: &WallConfig, headers: &HeaderMap) -> ApiResult<()> {
    if config.local_dev {
        return Ok(());
    }

    let Some(admin_key) = &config.admin_key else {
        return Err(ApiError::Unauthorized(
            "admin access is not configured".to_string(),
        ));
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == admin_key => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("invalid admin credential".to_string())),
        None => Err(ApiError::Unauthorized(
            "missing admin credential".to_string(),
        )),
    }
}

/// GET /api/admin/notes?status=
pub async fn list_for_moderation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ModerationListParams>,
) -> ApiResult<Json<ModerationListResponse>> {
    require_admin(&state.config, &headers)?;

    let notes = match params.status.as_deref() {
        Some(raw) => {
            let status = ModerationStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status '{}'", raw)))?;
            db::notes::list_by_status(&state.db, status).await?
        }
        None => db::notes::list_all_notes(&state.db).await?,
    };

    Ok(Json(ModerationListResponse {
        notes: notes.iter().map(ModerationNote::from).collect(),
    }))
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<WallStats>> {
    require_admin(&state.config, &headers)?;
    Ok(Json(db::notes::stats(&state.db).await?))
}

/// POST /api/admin/notes/:id/moderate
pub async fn moderate_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(visible_id): Path<Uuid>,
    Json(request): Json<ModerateRequest>,
) -> ApiResult<Json<ModerateResponse>> {
    require_admin(&state.config, &headers)?;

    let status = apply_action(&state, visible_id, request.action).await?;
    Ok(Json(ModerateResponse {
        visible_id,
        action: request.action,
        status,
    }))
}

/// POST /api/admin/moderate, batch variant with per-id outcomes
pub async fn batch_moderate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BatchModerateRequest>,
) -> ApiResult<Json<BatchModerateResponse>> {
    require_admin(&state.config, &headers)?;

    let mut results = Vec::with_capacity(request.ids.len());
    for visible_id in request.ids {
        match apply_action(&state, visible_id, request.action).await {
            Ok(_) => results.push(BatchItemResult {
                visible_id,
                ok: true,
                error: None,
            }),
            Err(e) => results.push(BatchItemResult {
                visible_id,
                ok: false,
                error: Some(e.to_string()),
            }),
        }
    }

    Ok(Json(BatchModerateResponse { results }))
}

/// POST /api/admin/rate-limits/purge
///
/// Storage hygiene: drops rate-limit records older than twice the
/// window; eligibility only ever needs the most recent record.
pub async fn purge_rate_limits(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PurgeResponse>> {
    require_admin(&state.config, &headers)?;

    let window_ms = state.config.rate_limit.window_secs as i64 * 1000;
    let cutoff_ms = Utc::now().timestamp_millis() - 2 * window_ms;
    let purged = db::rate_limits::purge_older_than(&state.db, cutoff_ms).await?;
    info!(purged, "purged expired rate-limit records");

    Ok(Json(PurgeResponse { purged }))
}

/// Apply one manual action. Returns the resulting status, or None for a
/// deletion.
async fn apply_action(
    state: &AppState,
    visible_id: Uuid,
    action: ModerationAction,
) -> ApiResult<Option<ModerationStatus>> {
    match action {
        ModerationAction::Approve | ModerationAction::Reject => {
            let status = if action == ModerationAction::Approve {
                ModerationStatus::Approved
            } else {
                ModerationStatus::Rejected
            };
            match db::notes::update_status(&state.db, visible_id, status).await? {
                Some(note) => {
                    info!(note = %visible_id, status = note.status.as_str(), "note moderated");
                    Ok(Some(note.status))
                }
                None => Err(ApiError::NotFound(format!("note {}", visible_id))),
            }
        }
        ModerationAction::Delete => {
            let image_url = db::notes::delete_note(&state.db, visible_id).await?;
            // Blob release is best-effort: the note record is the source
            // of truth for visibility, an orphaned blob is a recoverable
            // leak.
            if let Err(e) = state.image_store.delete(&image_url).await {
                warn!(note = %visible_id, error = %e, "failed to release image blob");
            }
            info!(note = %visible_id, "note deleted");
            Ok(None)
        }
    }
}
