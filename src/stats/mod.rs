//! Pure activity statistics derived from bit masks and index entries.

mod types;

pub use types::{ActivityStats, DailyAggregate};

use chrono::NaiveDate;

use crate::models::{ActivityMask, IndexEntry, Session};

pub fn activity_percentage(active: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    active as f64 / total as f64 * 100.0
}

pub fn real_work_time(active_intervals: usize, interval_minutes: u32) -> u64 {
    active_intervals as u64 * u64::from(interval_minutes)
}

fn from_counts(total: usize, active: usize) -> ActivityStats {
    ActivityStats {
        total_intervals: total,
        active_intervals: active,
        inactive_intervals: total - active,
        activity_percentage: activity_percentage(active, total),
        session_duration: None,
        real_work_time: None,
    }
}

/// Counts for a single mask string. Any character other than `'1'` counts as
/// inactive.
pub fn mask_stats(mask: &str) -> ActivityStats {
    let total = mask.len();
    let active = mask.bytes().filter(|b| *b == b'1').count();
    from_counts(total, active)
}

/// Sums counts across several day masks before computing the percentage.
pub fn combined_stats<'a, I>(masks: I) -> ActivityStats
where
    I: IntoIterator<Item = &'a ActivityMask>,
{
    let (total, active) = masks
        .into_iter()
        .fold((0usize, 0usize), |(total, active), mask| {
            (total + mask.len(), active + mask.active_count())
        });
    from_counts(total, active)
}

/// Session-level stats, with duration and real work time filled in. Work
/// time uses the interval length the session was sampled at.
pub fn session_stats(session: &Session) -> ActivityStats {
    let mut stats = combined_stats(session.daily_masks.values());
    stats.session_duration = Some(session.total_minutes);
    stats.real_work_time = Some(real_work_time(stats.active_intervals, session.interval_minutes));
    stats
}

/// Recomputes one day's aggregate from every index entry dated that day.
pub fn aggregate_day<'a, I>(date: NaiveDate, entries: I) -> DailyAggregate
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let mut aggregate = DailyAggregate::empty(date);
    let mut total_minutes: u64 = 0;

    for entry in entries.into_iter().filter(|entry| entry.date == date) {
        aggregate.sessions_count += 1;
        aggregate.total_active_minutes += entry.active_minutes;
        total_minutes += entry.total_minutes;
    }

    aggregate.average_activity = if total_minutes > 0 {
        aggregate.total_active_minutes as f64 / total_minutes as f64 * 100.0
    } else {
        0.0
    };
    aggregate
}
