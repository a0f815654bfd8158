//! # Domain Models
//!
//! Core entities of the StickyWall service. Notes are identified by a
//! stable UUID exposed to clients; positions are assigned once at
//! creation and never move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility state of a note.
///
/// `Pending` is the initial value. `Flagged` is only ever reached from
/// `Approved` via the flag-count threshold; manual moderation may move a
/// note between any two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

impl ModerationStatus {
    /// Stable string form used in the database and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Flagged => "flagged",
        }
    }

    /// Parse the stable string form; None for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ModerationStatus::Pending),
            "approved" => Some(ModerationStatus::Approved),
            "rejected" => Some(ModerationStatus::Rejected),
            "flagged" => Some(ModerationStatus::Flagged),
            _ => None,
        }
    }

    /// Whether notes in this state appear on the public wall.
    /// Pending notes render as placeholders so the submitter sees
    /// immediate feedback; rejected and flagged notes are hidden.
    pub fn publicly_visible(&self) -> bool {
        matches!(self, ModerationStatus::Approved | ModerationStatus::Pending)
    }
}

/// Fixed eight-value sticky note palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteColor {
    Yellow,
    Pink,
    Blue,
    Green,
    Orange,
    Purple,
    Red,
    White,
}

impl NoteColor {
    /// All palette values, for validation messages
    pub const ALL: [NoteColor; 8] = [
        NoteColor::Yellow,
        NoteColor::Pink,
        NoteColor::Blue,
        NoteColor::Green,
        NoteColor::Orange,
        NoteColor::Purple,
        NoteColor::Red,
        NoteColor::White,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteColor::Yellow => "yellow",
            NoteColor::Pink => "pink",
            NoteColor::Blue => "blue",
            NoteColor::Green => "green",
            NoteColor::Orange => "orange",
            NoteColor::Purple => "purple",
            NoteColor::Red => "red",
            NoteColor::White => "white",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yellow" => Some(NoteColor::Yellow),
            "pink" => Some(NoteColor::Pink),
            "blue" => Some(NoteColor::Blue),
            "green" => Some(NoteColor::Green),
            "orange" => Some(NoteColor::Orange),
            "purple" => Some(NoteColor::Purple),
            "red" => Some(NoteColor::Red),
            "white" => Some(NoteColor::White),
            _ => None,
        }
    }
}

/// A point on the shared plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single user-submitted note placed on the shared plane.
///
/// `visible_id`, `image_url`, `position`, `rotation` and `created_at`
/// are immutable after creation. `status` changes only through the
/// moderation state machine; `flag_count` only increases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Stable externally-exposed identifier, never reused
    pub visible_id: Uuid,
    /// Opaque reference to the rendered image (URL or data URI in dev mode)
    pub image_url: String,
    pub color: NoteColor,
    pub position: Position,
    /// Cosmetic rotation jitter in degrees
    pub rotation: f64,
    pub status: ModerationStatus,
    pub flag_count: i64,
    /// Opaque session reference, used for audit only, never exposed
    pub owner_identity: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Build a new note in the given initial status.
    ///
    /// The visible id is minted by the caller so the image blob can be
    /// keyed on it before the note exists; callers always pass the
    /// status the pipeline resolved from classification, and
    /// creation-time state is never written twice.
    pub fn new(
        visible_id: Uuid,
        image_url: String,
        color: NoteColor,
        position: Position,
        rotation: f64,
        status: ModerationStatus,
        owner_identity: String,
    ) -> Self {
        Self {
            visible_id,
            image_url,
            color,
            position,
            rotation,
            status,
            flag_count: 0,
            owner_identity,
            created_at: Utc::now(),
        }
    }
}

/// Ephemeral proof of a prior submission by an identity.
///
/// Only the salted hash of the underlying identity is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub identifier_hash: String,
    pub note_id: Uuid,
    /// Unix milliseconds of the submission that produced this record
    pub created_at_ms: i64,
}
