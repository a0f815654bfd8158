//! End-to-end submission pipeline tests with stubbed vision backends.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use std::sync::Arc;
use sticky_common::config::WallConfig;
use sticky_common::{Error, ModerationStatus, Note, NoteColor, Position};
use sticky_wall::db;
use sticky_wall::services::classifier::{ClassifierError, GenerateOutput};
use sticky_wall::services::pipeline::{self, SubmissionRequest};
use sticky_wall::services::rate_limit::ClientIdentity;
use sticky_wall::services::{DataUriImageStore, Eligibility, ImageStore, VisionBackend};
use sticky_wall::AppState;
use uuid::Uuid;

/// Backend that always answers with a canned reply
struct CannedBackend {
    reply: String,
}

#[async_trait]
impl VisionBackend for CannedBackend {
    async fn generate(&self, _image: &str, _prompt: &str) -> Result<GenerateOutput, ClassifierError> {
        Ok(GenerateOutput {
            text: self.reply.clone(),
            input_tokens: 100,
            output_tokens: 20,
        })
    }
}

/// Image store that always fails to persist
struct FailingStore;

#[async_trait]
impl ImageStore for FailingStore {
    async fn save(
        &self,
        _bytes: &[u8],
        _content_type: &str,
        _key: &str,
    ) -> sticky_common::Result<String> {
        Err(Error::Upload("disk full".to_string()))
    }

    async fn delete(&self, _image_url: &str) -> sticky_common::Result<()> {
        Ok(())
    }
}

/// Backend that always fails
struct FailingBackend;

#[async_trait]
impl VisionBackend for FailingBackend {
    async fn generate(&self, _image: &str, _prompt: &str) -> Result<GenerateOutput, ClassifierError> {
        Err(ClassifierError::Network("connection refused".to_string()))
    }
}

async fn test_state(backend: Option<Arc<dyn VisionBackend>>) -> AppState {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    db::init_tables(&pool).await.unwrap();
    AppState::new(pool, WallConfig::default(), Arc::new(DataUriImageStore), backend)
}

fn png_data_uri() -> String {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0; 24]);
    format!("data:image/png;base64,{}", BASE64.encode(bytes))
}

fn identity(token: &str) -> ClientIdentity {
    ClientIdentity {
        session_token: token.to_string(),
        remote_ip: None,
    }
}

fn request(x: Option<f64>, y: Option<f64>) -> SubmissionRequest {
    SubmissionRequest {
        image: png_data_uri(),
        color: "yellow".to_string(),
        x,
        y,
    }
}

#[tokio::test]
async fn test_confident_approval_goes_live() {
    let backend = Arc::new(CannedBackend {
        reply: r#"{"decision": "APPROVED", "reason": "harmless doodle", "confidence": 0.95}"#
            .to_string(),
    });
    let state = test_state(Some(backend)).await;

    let outcome = pipeline::submit(&state, &identity("tok"), request(None, None))
        .await
        .unwrap();

    assert_eq!(outcome.note.status, ModerationStatus::Approved);
    assert!(outcome.message.contains("live on the wall"));
    assert!(outcome.note.image_url.starts_with("data:image/png;base64,"));
    assert!(outcome.note.rotation.abs() <= 4.0);

    let public = db::notes::list_public_notes(&state.db).await.unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].visible_id, outcome.note.visible_id);
}

#[tokio::test]
async fn test_confident_rejection_carries_reason() {
    let backend = Arc::new(CannedBackend {
        reply: r#"{"decision": "REJECTED", "reason": "contains a phone number", "confidence": 0.9}"#
            .to_string(),
    });
    let state = test_state(Some(backend)).await;

    let outcome = pipeline::submit(&state, &identity("tok"), request(None, None))
        .await
        .unwrap();

    assert_eq!(outcome.note.status, ModerationStatus::Rejected);
    assert!(outcome.message.contains("contains a phone number"));
}

#[tokio::test]
async fn test_low_confidence_lands_in_review() {
    let backend = Arc::new(CannedBackend {
        reply: r#"{"decision": "APPROVED", "reason": "unclear", "confidence": 0.4}"#.to_string(),
    });
    let state = test_state(Some(backend)).await;

    let outcome = pipeline::submit(&state, &identity("tok"), request(None, None))
        .await
        .unwrap();

    assert_eq!(outcome.note.status, ModerationStatus::Pending);
    assert!(outcome.message.contains("pending review"));
}

#[tokio::test]
async fn test_backend_failure_still_creates_pending_note() {
    let state = test_state(Some(Arc::new(FailingBackend))).await;

    let outcome = pipeline::submit(&state, &identity("tok"), request(None, None))
        .await
        .unwrap();

    // Moderation outage never blocks submissions, it routes them to review
    assert_eq!(outcome.note.status, ModerationStatus::Pending);
    let stored = db::notes::get_note(&state.db, outcome.note.visible_id)
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn test_no_backend_configured_lands_in_review() {
    let state = test_state(None).await;
    let outcome = pipeline::submit(&state, &identity("tok"), request(None, None))
        .await
        .unwrap();
    assert_eq!(outcome.note.status, ModerationStatus::Pending);
}

#[tokio::test]
async fn test_second_submission_same_identity_limited() {
    let state = test_state(None).await;
    let who = identity("tok-limited");

    pipeline::submit(&state, &who, request(None, None)).await.unwrap();

    match pipeline::submit(&state, &who, request(None, None)).await {
        Err(Error::RateLimited { remaining_ms }) => assert!(remaining_ms > 0),
        other => panic!("expected rate limit, got {:?}", other.map(|_| ())),
    }

    // Only the first note exists
    assert_eq!(db::notes::list_public_notes(&state.db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_window_elapse_allows_resubmission() {
    let state = test_state(None).await;
    let who = identity("tok-elapsed");

    // Plant a record from just over a window ago
    let window_ms = state.config.rate_limit.window_secs as i64 * 1000;
    let key = state.rate_gate.identity_key(&who);
    db::rate_limits::insert_record(
        &state.db,
        &key,
        Uuid::new_v4(),
        Utc::now().timestamp_millis() - window_ms - 60_000,
    )
    .await
    .unwrap();

    assert!(pipeline::submit(&state, &who, request(None, None)).await.is_ok());
}

#[tokio::test]
async fn test_overlapping_explicit_position_rejected() {
    let state = test_state(None).await;

    let blocker = Note::new(
        Uuid::new_v4(),
        "data:image/png;base64,".to_string(),
        NoteColor::Blue,
        Position::new(0.0, 0.0),
        0.0,
        ModerationStatus::Approved,
        "someone-else".to_string(),
    );
    db::notes::create_note(&state.db, &blocker).await.unwrap();

    let who = identity("tok-overlap");
    match pipeline::submit(&state, &who, request(Some(0.0), Some(0.0))).await {
        Err(Error::Overlap { fraction }) => assert!((fraction - 1.0).abs() < 1e-9),
        other => panic!("expected overlap rejection, got {:?}", other.map(|_| ())),
    }

    // Nothing was created and the allowance was not consumed: a clean
    // retry at a free spot succeeds immediately.
    assert_eq!(db::notes::list_public_notes(&state.db).await.unwrap().len(), 1);
    let retry = pipeline::submit(&state, &who, request(Some(1000.0), Some(0.0))).await;
    assert!(retry.is_ok());
}

#[tokio::test]
async fn test_boundary_overlap_allowed() {
    let state = test_state(None).await;

    let blocker = Note::new(
        Uuid::new_v4(),
        "data:image/png;base64,".to_string(),
        NoteColor::Blue,
        Position::new(0.0, 0.0),
        0.0,
        ModerationStatus::Approved,
        "someone-else".to_string(),
    );
    db::notes::create_note(&state.db, &blocker).await.unwrap();

    // 200x200 notes offset (150, 0): 50*200 / 40000 = exactly the 0.25
    // default threshold, which is allowed.
    let outcome = pipeline::submit(
        &state,
        &identity("tok-boundary"),
        request(Some(150.0), Some(0.0)),
    )
    .await
    .unwrap();
    assert_eq!(outcome.note.position, Position::new(150.0, 0.0));
}

#[tokio::test]
async fn test_auto_placement_avoids_existing_notes() {
    let state = test_state(None).await;

    let blocker = Note::new(
        Uuid::new_v4(),
        "data:image/png;base64,".to_string(),
        NoteColor::Pink,
        Position::new(0.0, 0.0),
        0.0,
        ModerationStatus::Approved,
        "someone-else".to_string(),
    );
    db::notes::create_note(&state.db, &blocker).await.unwrap();

    let outcome = pipeline::submit(&state, &identity("tok-auto"), request(None, None))
        .await
        .unwrap();

    let placement = &state.config.placement;
    let overlap = sticky_wall::geometry::overlap_fraction(
        outcome.note.position,
        blocker.position,
        placement.note_width,
        placement.note_height,
    );
    assert!(overlap <= placement.max_overlap_fraction);
}

#[tokio::test]
async fn test_mismatched_coordinates_rejected() {
    let state = test_state(None).await;
    match pipeline::submit(&state, &identity("tok"), request(Some(10.0), None)).await {
        Err(Error::InvalidInput(msg)) => assert!(msg.contains("together")),
        other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_non_finite_coordinates_rejected() {
    let state = test_state(None).await;
    let result =
        pipeline::submit(&state, &identity("tok"), request(Some(f64::NAN), Some(0.0))).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_unknown_color_rejected_before_any_write() {
    let state = test_state(None).await;
    let mut req = request(None, None);
    req.color = "mauve".to_string();

    match pipeline::submit(&state, &identity("tok"), req).await {
        Err(Error::InvalidInput(msg)) => assert!(msg.contains("mauve")),
        other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
    }
    assert!(db::notes::list_public_notes(&state.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_garbage_image_payload_rejected() {
    let state = test_state(None).await;
    let mut req = request(None, None);
    req.image = BASE64.encode(b"definitely not an image");

    assert!(matches!(
        pipeline::submit(&state, &identity("tok"), req).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_upload_failure_is_fatal_and_preserves_allowance() {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    db::init_tables(&pool).await.unwrap();
    let state = AppState::new(pool, WallConfig::default(), Arc::new(FailingStore), None);
    let who = identity("tok-upload");

    match pipeline::submit(&state, &who, request(None, None)).await {
        Err(Error::Upload(_)) => {}
        other => panic!("expected upload failure, got {:?}", other.map(|_| ())),
    }

    // No note without a persisted image, and the allowance was not
    // consumed: the identity may retry immediately.
    assert!(db::notes::list_public_notes(&state.db).await.unwrap().is_empty());
    assert_eq!(
        state
            .rate_gate
            .check(&who, Utc::now().timestamp_millis())
            .await,
        Eligibility::Allowed
    );
}

#[tokio::test]
async fn test_rejected_submission_consumes_allowance() {
    let backend = Arc::new(CannedBackend {
        reply: r#"{"decision": "REJECTED", "reason": "spam", "confidence": 0.99}"#.to_string(),
    });
    let state = test_state(Some(backend)).await;
    let who = identity("tok-spam");

    // The note was created (as rejected), so the window applies
    pipeline::submit(&state, &who, request(None, None)).await.unwrap();
    assert!(matches!(
        pipeline::submit(&state, &who, request(None, None)).await,
        Err(Error::RateLimited { .. })
    ));
}
