//! The submission pipeline
//!
//! Single orchestrated workflow every new note goes through:
//! rate-limit check, payload validation, position resolution and overlap
//! check, image persistence, moderation classification, store write,
//! rate-limit recording. Step order matters: the cheapest and most
//! common rejections come first, nothing is persisted before validation
//! passes, and the rate-limit allowance is only consumed once the note
//! actually exists.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sticky_common::{Error, ModerationStatus, Note, NoteColor, Position, Result};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::geometry;
use crate::services::rate_limit::{ClientIdentity, Eligibility};
use crate::AppState;

/// Image content types accepted on the wall
const ACCEPTED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Cosmetic rotation jitter bounds, degrees
const MAX_ROTATION_DEG: f64 = 4.0;

/// A new note submission
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    /// Image payload: data URI or bare base64
    pub image: String,
    /// Palette color name
    pub color: String,
    /// Explicit placement; both coordinates or neither
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Result of an accepted submission
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub note: Note,
    /// Human-readable status message for the submitter
    pub message: String,
}

/// Run one submission through the pipeline.
pub async fn submit(
    state: &AppState,
    identity: &ClientIdentity,
    request: SubmissionRequest,
) -> Result<SubmissionOutcome> {
    let now_ms = Utc::now().timestamp_millis();

    // Step 1: rate-limit check, before any other work
    if let Eligibility::Limited { remaining_ms } = state.rate_gate.check(identity, now_ms).await {
        return Err(Error::RateLimited { remaining_ms });
    }

    // Step 2: payload validation, before any write
    let (bytes, content_type) = decode_image_payload(&request.image, state.config.max_image_bytes)?;
    let color = NoteColor::parse(&request.color).ok_or_else(|| {
        Error::InvalidInput(format!(
            "unknown color '{}'; expected one of {}",
            request.color,
            NoteColor::ALL
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;

    // Step 3: identity was resolved (or minted) by the HTTP layer,
    // independent of which rate-limit strategy is active.

    // Step 4: position resolution against the currently visible notes
    let existing: Vec<Position> = db::notes::list_public_notes(&state.db)
        .await?
        .iter()
        .map(|n| n.position)
        .collect();
    let position = resolve_position(state, &existing, request.x, request.y)?;

    // Step 5: image persistence; fatal on failure, no note without a blob
    let visible_id = Uuid::new_v4();
    let image_url = state
        .image_store
        .save(&bytes, content_type, &visible_id.to_string())
        .await?;

    // Step 6: classification; low confidence or failure lands in review
    let data_uri = format!("data:{};base64,{}", content_type, BASE64.encode(&bytes));
    let decision = state.classifier.classify(&data_uri).await;
    let status = if decision.confidence >= state.config.moderation.confidence_threshold {
        if decision.approved {
            ModerationStatus::Approved
        } else {
            ModerationStatus::Rejected
        }
    } else {
        ModerationStatus::Pending
    };
    info!(
        note = %visible_id,
        approved = decision.approved,
        confidence = decision.confidence,
        input_tokens = decision.input_tokens,
        output_tokens = decision.output_tokens,
        status = status.as_str(),
        "classified submission"
    );

    // Step 7: store write
    let rotation = rand::thread_rng().gen_range(-MAX_ROTATION_DEG..=MAX_ROTATION_DEG);
    let note = Note::new(
        visible_id,
        image_url,
        color,
        position,
        rotation,
        status,
        identity.session_token.clone(),
    );
    db::notes::create_note(&state.db, &note).await?;

    // Step 8: only an actually-created note consumes the allowance
    state.rate_gate.record(identity, note.visible_id, now_ms).await;

    // Step 9: respond
    let message = match status {
        ModerationStatus::Approved => "Your note is approved and live on the wall.".to_string(),
        ModerationStatus::Rejected => {
            if decision.reason.is_empty() {
                "Your note was rejected by moderation.".to_string()
            } else {
                format!("Your note was rejected: {}", decision.reason)
            }
        }
        _ => "Your note is pending review and will appear shortly.".to_string(),
    };

    Ok(SubmissionOutcome { note, message })
}

/// Validate explicit coordinates against the overlap policy, or pick a
/// spot and re-validate it (the picker does not guarantee the policy).
fn resolve_position(
    state: &AppState,
    existing: &[Position],
    x: Option<f64>,
    y: Option<f64>,
) -> Result<Position> {
    let placement = &state.config.placement;
    let candidate = match (x, y) {
        (Some(x), Some(y)) => {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::InvalidInput("coordinates must be finite".to_string()));
            }
            Position::new(x, y)
        }
        (None, None) => geometry::find_available_position(existing, placement),
        _ => {
            return Err(Error::InvalidInput(
                "x and y must be supplied together".to_string(),
            ))
        }
    };

    let worst = geometry::max_overlap(
        candidate,
        existing,
        placement.note_width,
        placement.note_height,
    );
    if worst > placement.max_overlap_fraction {
        return Err(Error::Overlap { fraction: worst });
    }
    Ok(candidate)
}

/// Decode and sniff the image payload.
///
/// Accepts a `data:<type>;base64,<data>` URI or bare base64, enforces
/// the size ceiling, and requires the decoded bytes to carry a known
/// image signature.
fn decode_image_payload(raw: &str, max_bytes: usize) -> Result<(Vec<u8>, &'static str)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidInput("image payload is required".to_string()));
    }

    let encoded = if let Some(rest) = raw.strip_prefix("data:") {
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidInput("malformed data URI".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(Error::InvalidInput(
                "data URI must be base64-encoded".to_string(),
            ));
        }
        data
    } else {
        raw
    };

    // Cheap ceiling before decoding: base64 inflates by 4/3
    if encoded.len() > max_bytes / 3 * 4 + 4 {
        return Err(Error::InvalidInput(format!(
            "image exceeds the {} byte limit",
            max_bytes
        )));
    }

    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| Error::InvalidInput("image payload is not valid base64".to_string()))?;

    if bytes.len() > max_bytes {
        return Err(Error::InvalidInput(format!(
            "image exceeds the {} byte limit",
            max_bytes
        )));
    }

    let kind = infer::get(&bytes)
        .ok_or_else(|| Error::InvalidInput("payload is not recognizable image data".to_string()))?;
    let content_type = ACCEPTED_IMAGE_TYPES
        .into_iter()
        .find(|t| *t == kind.mime_type())
        .ok_or_else(|| {
            Error::InvalidInput(format!("unsupported image type {}", kind.mime_type()))
        })?;

    Ok((bytes, content_type))
}
