use chrono::{DateTime, Utc};

/// Days-before-expiry offsets at which a reminder fires, most distant first.
pub const REMINDER_OFFSETS: [u32; 3] = [3, 1, 0];

/// Defensive rank for offsets outside [`REMINDER_OFFSETS`].
pub const FALLBACK_PRIORITY: u8 = 3;

/// Whole calendar days between `now` and `expires_at`. Both instants are
/// truncated to midnight first, so an item expiring at 23:00 tonight still
/// counts as zero days out all day long.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at.date_naive() - now.date_naive()).num_days()
}

/// Offsets that should currently have a reminder, in descending order.
///
/// Two kinds of offsets qualify:
/// - every offset the item has already come within (`days_until <= offset`),
///   so an item first seen one day out still gets its 3-day and 1-day
///   reminders considered,
/// - the nearest upcoming offset (`offset <= days_until`), scheduled ahead of
///   time so the reminder fires without the app being opened again.
///
/// Already-expired items get nothing.
pub fn due_offsets(days_until: i64) -> Vec<u32> {
    if days_until < 0 {
        return Vec::new();
    }

    let mut due: Vec<u32> = REMINDER_OFFSETS
        .iter()
        .copied()
        .filter(|&offset| days_until <= i64::from(offset))
        .collect();

    let upcoming = REMINDER_OFFSETS
        .iter()
        .copied()
        .filter(|&offset| i64::from(offset) <= days_until)
        .max();
    if let Some(offset) = upcoming {
        if !due.contains(&offset) {
            due.push(offset);
        }
    }

    due.sort_unstable_by(|a, b| b.cmp(a));
    due
}

/// Urgency rank for an offset; lower wins when notification slots are scarce.
pub fn priority(offset: u32) -> u8 {
    match offset {
        0 => 0,
        1 => 1,
        3 => 2,
        _ => FALLBACK_PRIORITY,
    }
}
