use serde::{Deserialize, Serialize};

/// Defines how often a dashboard task should run.
///
/// Serialised as internally tagged JSON, e.g. `{"kind":"daily","time":"07:00"}`
/// or `{"kind":"interval_seconds","interval_seconds":3600}`. The same shape is
/// used in the config file and in the `task_schedules` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run every day at the given wall-clock time ("HH:MM", UTC).
    Daily { time: String },

    /// Run every hour, measured from the previous run.
    Hourly,

    /// Run repeatedly with a fixed interval in seconds.
    IntervalSeconds { interval_seconds: u64 },

    /// Run once a month on the given day (1-31, clamped to the month's
    /// length) at the given time ("HH:MM", UTC).
    Monthly { day: u32, time: String },

    /// Catch-all for kinds written by a newer version. Rows with an
    /// unrecognised kind still deserialize and fall back to a one-day cadence
    /// instead of erroring out of the scheduling loop.
    #[serde(other)]
    Unknown,
}

impl Schedule {
    /// Short kind label, matching the serialised `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Daily { .. } => "daily",
            Schedule::Hourly => "hourly",
            Schedule::IntervalSeconds { .. } => "interval_seconds",
            Schedule::Monthly { .. } => "monthly",
            Schedule::Unknown => "unknown",
        }
    }
}
