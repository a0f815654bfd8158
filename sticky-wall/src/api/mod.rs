//! HTTP API handlers for the wall service

pub mod admin;
pub mod health;
pub mod notes;

use crate::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Public wall endpoints
pub fn note_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notes", post(notes::submit_note).get(notes::list_notes))
        .route("/api/notes/region", get(notes::query_region))
        .route("/api/notes/:id/flag", post(notes::flag_note))
}

/// Moderation endpoints, credential-gated outside local-dev mode
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/notes", get(admin::list_for_moderation))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/notes/:id/moderate", post(admin::moderate_note))
        .route("/api/admin/moderate", post(admin::batch_moderate))
        .route("/api/admin/rate-limits/purge", post(admin::purge_rate_limits))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health::health))
}
