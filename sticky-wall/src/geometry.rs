//! Rectangle overlap math and position finding
//!
//! Pure functions over the shared plane. All notes share one fixed
//! width/height; positions are rectangle origins (top-left corners).

use rand::Rng;
use sticky_common::config::PlacementConfig;
use sticky_common::Position;

/// Bounded retries before the position finder gives up on the center bias
const PLACEMENT_ATTEMPTS: u32 = 40;

/// Base random spread around the plane center for auto-placement
const BASE_SPREAD: f64 = 600.0;

/// Fraction of the candidate rectangle covered by a single existing note.
///
/// Axis-aligned intersection area divided by the candidate's own area.
/// Deliberately asymmetric: the question is how much of the new note is
/// obscured, not how much of the neighbor. Rectangles that are disjoint
/// or touch only at an edge score 0.
pub fn overlap_fraction(candidate: Position, existing: Position, width: f64, height: f64) -> f64 {
    let dx = width - (candidate.x - existing.x).abs();
    let dy = height - (candidate.y - existing.y).abs();
    if dx <= 0.0 || dy <= 0.0 {
        return 0.0;
    }
    (dx * dy) / (width * height)
}

/// Worst-case overlap fraction against any single existing note.
///
/// This pairwise maximum is the sole placement-acceptance signal; it is
/// not a cumulative-coverage measure.
pub fn max_overlap(candidate: Position, existing: &[Position], width: f64, height: f64) -> f64 {
    existing
        .iter()
        .map(|pos| overlap_fraction(candidate, *pos, width, height))
        .fold(0.0, f64::max)
}

/// Whether a candidate placement satisfies the overlap policy
pub fn placement_allowed(candidate: Position, existing: &[Position], placement: &PlacementConfig) -> bool {
    max_overlap(candidate, existing, placement.note_width, placement.note_height)
        <= placement.max_overlap_fraction
}

/// Pick a position for a note whose submitter did not choose one.
///
/// Candidates are biased toward the center of the plane with the random
/// spread widening on every retry. After the retry budget is exhausted
/// the note is placed just beyond the edge of currently used space.
///
/// The returned position is not guaranteed to satisfy the overlap
/// policy; the submission pipeline re-validates it.
pub fn find_available_position(existing: &[Position], placement: &PlacementConfig) -> Position {
    let mut rng = rand::thread_rng();

    for attempt in 0..PLACEMENT_ATTEMPTS {
        let spread = BASE_SPREAD * (1.0 + f64::from(attempt) * 0.25);
        let candidate = Position::new(
            rng.gen_range(-spread..=spread),
            rng.gen_range(-spread..=spread),
        );
        if placement_allowed(candidate, existing, placement) {
            return candidate;
        }
    }

    // Fallback: beyond the furthest occupied extent, with a little jitter
    // so repeated fallbacks do not stack on one spot.
    let extent = existing
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(0.0, f64::max);
    Position::new(
        extent + placement.note_width * 1.5,
        rng.gen_range(-BASE_SPREAD..=BASE_SPREAD),
    )
}
