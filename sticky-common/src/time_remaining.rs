//! Human-readable wait-time formatting
//!
//! Renders the remaining rate-limit wait as "2h 30m" style strings for
//! user-facing rejection messages.

const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 3_600_000;

/// Format a remaining wait in milliseconds as "Hh Mm" or "Mm".
///
/// Hours and minutes are integer divisions of the millisecond count.
/// Both fields are shown once past the zero-hour boundary; under one
/// hour only the minute field appears. Sub-minute waits floor to "0m".
///
/// # Examples
///
/// ```
/// use sticky_common::time_remaining::format_time_remaining;
///
/// assert_eq!(format_time_remaining(9_000_000), "2h 30m");
/// assert_eq!(format_time_remaining(2_700_000), "45m");
/// assert_eq!(format_time_remaining(30_000), "0m");
/// ```
pub fn format_time_remaining(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
