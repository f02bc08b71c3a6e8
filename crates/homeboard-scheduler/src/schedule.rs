use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use tracing::warn;

use homeboard_core::Schedule;

/// Storage format for all persisted timestamps: naive UTC, second precision,
/// no offset. Lexicographic order equals chronological order, so SQLite can
/// compare the TEXT columns directly.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current wall-clock time as naive UTC, truncated to whole seconds so values
/// round-trip through the store unchanged.
pub fn now_naive() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FMT).to_string()
}

pub fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FMT).ok()
}

/// Compute the next execution time for `schedule`.
///
/// Pure function: `now` is passed in rather than read from the clock, and the
/// baseline is `last_run` when present, `now` otherwise (a task that has never
/// run is measured from the present). The result is always strictly after the
/// baseline for positive intervals.
///
/// Unrecognised kinds fall back to baseline + 1 day — a stale cadence is
/// recoverable, a panic inside the scheduling loop is not.
pub fn compute_next_run(
    schedule: &Schedule,
    last_run: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> NaiveDateTime {
    let base = last_run.unwrap_or(now);

    match schedule {
        Schedule::Daily { time } => {
            let (hour, minute) = parse_hhmm(time);
            let candidate = at_time(base.date(), hour, minute);
            if candidate <= base {
                // Today's window has passed — advance exactly one calendar day.
                candidate + Duration::days(1)
            } else {
                candidate
            }
        }

        Schedule::Hourly => base + Duration::hours(1),

        Schedule::IntervalSeconds { interval_seconds } => {
            base + Duration::seconds(*interval_seconds as i64)
        }

        Schedule::Monthly { day, time } => {
            let (hour, minute) = parse_hhmm(time);
            let candidate = monthly_candidate(base.year(), base.month(), *day, hour, minute);
            if candidate <= base {
                let (year, month) = if base.month() == 12 {
                    (base.year() + 1, 1)
                } else {
                    (base.year(), base.month() + 1)
                };
                monthly_candidate(year, month, *day, hour, minute)
            } else {
                candidate
            }
        }

        Schedule::Unknown => {
            warn!("unrecognised schedule kind; falling back to one-day cadence");
            base + Duration::days(1)
        }
    }
}

/// Parse an "HH:MM" wall-clock string, clamping to valid ranges.
///
/// Malformed input falls back to midnight — mirrors the fail-safe contract of
/// [`compute_next_run`]: bad config data must not break the scheduling loop.
fn parse_hhmm(raw: &str) -> (u32, u32) {
    let mut parts = raw.trim().splitn(2, ':');
    let hour = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let minute = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    match (hour, minute) {
        (Some(h), Some(m)) => (h.min(23), m.min(59)),
        (Some(h), None) => (h.min(23), 0),
        _ => {
            warn!(time = %raw, "malformed HH:MM value; defaulting to 00:00");
            (0, 0)
        }
    }
}

/// `date` at HH:MM:00. Hour/minute are pre-clamped so this cannot fail, but
/// the fallback keeps the function total.
fn at_time(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| NaiveDateTime::new(date, chrono::NaiveTime::MIN))
}

/// `day` of (`year`, `month`) at HH:MM, with `day` clamped to the last valid
/// day of that month (Monthly day=31 in a 30-day month fires on the 30th).
fn monthly_candidate(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    let clamped = day.clamp(1, days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, clamped)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
        .unwrap_or_default();
    at_time(date, hour, minute)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
