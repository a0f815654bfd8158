//! Public wall endpoints: submit, list, region query, flag

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sticky_common::{ModerationStatus, Note, NoteColor};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::pipeline::{self, SubmissionRequest};
use crate::services::rate_limit::{extract_client_ip, ClientIdentity};
use crate::AppState;

/// Header carrying the client's opaque session token
pub const SESSION_HEADER: &str = "x-wall-session";

/// Note fields exposed to the public wall; the owner identity never
/// leaves the server.
#[derive(Debug, Serialize)]
pub struct PublicNote {
    pub visible_id: Uuid,
    pub image_url: String,
    pub color: NoteColor,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub status: ModerationStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Note> for PublicNote {
    fn from(note: &Note) -> Self {
        Self {
            visible_id: note.visible_id,
            image_url: note.image_url.clone(),
            color: note.color,
            x: note.position.x,
            y: note.position.y,
            rotation: note.rotation,
            status: note.status,
            created_at: note.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub note: PublicNote,
    pub message: String,
    /// Echoed (or freshly minted) session token for the client to keep
    pub session: String,
}

#[derive(Debug, Serialize)]
pub struct NotesResponse {
    pub notes: Vec<PublicNote>,
}

#[derive(Debug, Deserialize)]
pub struct RegionParams {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

#[derive(Debug, Serialize)]
pub struct FlagResponse {
    pub visible_id: Uuid,
    pub flag_count: i64,
    pub status: ModerationStatus,
}

/// Resolve the submitter's identity from headers, minting a session
/// token when the client has none.
fn resolve_identity(headers: &HeaderMap) -> ClientIdentity {
    let session_token = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    ClientIdentity {
        session_token,
        remote_ip: extract_client_ip(headers),
    }
}

/// POST /api/notes
pub async fn submit_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let identity = resolve_identity(&headers);
    let outcome = pipeline::submit(&state, &identity, request).await?;

    Ok(Json(SubmitResponse {
        note: PublicNote::from(&outcome.note),
        message: outcome.message,
        session: identity.session_token,
    }))
}

/// GET /api/notes
pub async fn list_notes(State(state): State<AppState>) -> ApiResult<Json<NotesResponse>> {
    let notes = db::notes::list_public_notes(&state.db).await?;
    Ok(Json(NotesResponse {
        notes: notes.iter().map(PublicNote::from).collect(),
    }))
}

/// GET /api/notes/region?min_x=&max_x=&min_y=&max_y=
pub async fn query_region(
    State(state): State<AppState>,
    Query(params): Query<RegionParams>,
) -> ApiResult<Json<NotesResponse>> {
    if params.min_x > params.max_x || params.min_y > params.max_y {
        return Err(ApiError::Validation(
            "region bounds must satisfy min <= max".to_string(),
        ));
    }

    let notes = db::notes::query_region(
        &state.db,
        params.min_x,
        params.max_x,
        params.min_y,
        params.max_y,
        state.config.placement.region_padding,
    )
    .await?;

    Ok(Json(NotesResponse {
        notes: notes.iter().map(PublicNote::from).collect(),
    }))
}

/// POST /api/notes/:id/flag
pub async fn flag_note(
    State(state): State<AppState>,
    Path(visible_id): Path<Uuid>,
) -> ApiResult<Json<FlagResponse>> {
    match db::notes::flag_note(&state.db, visible_id, state.config.flag_threshold).await? {
        Some((flag_count, status)) => {
            tracing::info!(
                note = %visible_id,
                flag_count,
                status = status.as_str(),
                "note flagged"
            );
            Ok(Json(FlagResponse {
                visible_id,
                flag_count,
                status,
            }))
        }
        None => Err(ApiError::NotFound(format!("note {}", visible_id))),
    }
}
