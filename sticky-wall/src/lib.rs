//! sticky-wall library interface
//!
//! Exposes the application state and router so integration tests can
//! drive the service in-process.

pub mod api;
pub mod db;
pub mod error;
pub mod geometry;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use sticky_common::config::WallConfig;
use tower_http::cors::CorsLayer;

use crate::services::{ImageStore, ModerationClassifier, RateLimitGate, VisionBackend};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<WallConfig>,
    pub image_store: Arc<dyn ImageStore>,
    pub classifier: Arc<ModerationClassifier>,
    pub rate_gate: Arc<RateLimitGate>,
}

impl AppState {
    /// Wire the state from a pool, config and the injected ports.
    pub fn new(
        db: SqlitePool,
        config: WallConfig,
        image_store: Arc<dyn ImageStore>,
        vision_backend: Option<Arc<dyn VisionBackend>>,
    ) -> Self {
        let rate_gate = Arc::new(RateLimitGate::new(db.clone(), config.rate_limit.clone()));
        let classifier = Arc::new(ModerationClassifier::new(vision_backend));
        Self {
            db,
            config: Arc::new(config),
            image_store,
            classifier,
            rate_gate,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::note_routes())
        .merge(api::admin_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
