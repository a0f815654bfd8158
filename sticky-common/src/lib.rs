//! # StickyWall Common Library
//!
//! Shared code for the StickyWall service including:
//! - Domain models (notes, moderation status, color palette)
//! - Error taxonomy
//! - Configuration loading
//! - Wait-time formatting

pub mod config;
pub mod error;
pub mod models;
pub mod time_remaining;

pub use error::{Error, Result};
pub use models::{ModerationStatus, Note, NoteColor, Position, RateLimitRecord};
