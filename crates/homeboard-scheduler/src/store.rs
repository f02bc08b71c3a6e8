use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use homeboard_core::Schedule;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::schedule::{compute_next_run, format_ts, now_naive, parse_ts};

/// One persisted schedule row, keyed by task name.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRecord {
    pub task_name: String,
    pub schedule: Schedule,
    /// `None` means "run as soon as possible" — the state of a freshly
    /// created row, so a new installation executes immediately.
    pub next_run_at: Option<NaiveDateTime>,
    /// Timestamp of the most recent successful completion.
    pub last_run_at: Option<NaiveDateTime>,
    /// Last failure message; cleared on success.
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Durable schedule state, one row per task name.
///
/// Wraps a single SQLite connection in a `Mutex`; read-modify-write paths run
/// inside a transaction so a crash mid-update cannot leave `next_run_at` and
/// `last_run_at` inconsistent.
pub struct ScheduleStore {
    db: Mutex<Connection>,
}

impl ScheduleStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create or update the row for `name` (upsert).
    ///
    /// A new row is inserted with the given `next_run_at` (commonly `None` so
    /// the first run is immediate). An existing row only has its schedule
    /// refreshed — `next_run_at` is never touched here, so an app restart
    /// cannot clobber an already-pending schedule.
    pub fn ensure_scheduled(
        &self,
        name: &str,
        schedule: &Schedule,
        next_run_at: Option<NaiveDateTime>,
    ) -> Result<()> {
        let schedule_json = serde_json::to_string(schedule)
            .map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;
        let now_str = format_ts(now_naive());

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO task_schedules
             (task_name, schedule, next_run_at, last_run_at, last_error,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?4)
             ON CONFLICT(task_name) DO UPDATE SET
                 schedule   = excluded.schedule,
                 updated_at = excluded.updated_at",
            rusqlite::params![name, schedule_json, next_run_at.map(format_ts), now_str],
        )?;
        debug!(task = %name, kind = schedule.kind(), "schedule row ensured");
        Ok(())
    }

    /// Next planned execution for `name`.
    ///
    /// `None` for a missing row, a null column, or an unparsable timestamp —
    /// all of which mean "due now".
    pub fn get_next_run(&self, name: &str) -> Result<Option<NaiveDateTime>> {
        let db = self.db.lock().unwrap();
        let raw: Option<String> = match db.query_row(
            "SELECT next_run_at FROM task_schedules WHERE task_name = ?1",
            [name],
            |row| row.get(0),
        ) {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match raw {
            Some(s) => {
                let parsed = parse_ts(&s);
                if parsed.is_none() {
                    warn!(task = %name, value = %s, "unparsable next_run_at; treating as due now");
                }
                Ok(parsed)
            }
            None => Ok(None),
        }
    }

    /// Record a successful completion: `last_run_at = now`, `last_error`
    /// cleared, `next_run_at` recomputed from the stored schedule.
    ///
    /// This is the only path that both advances the cadence and marks the run
    /// as successful. Unknown task names are ignored with a warning — the
    /// runnable may fire once after its row was removed.
    pub fn update_after_run(&self, name: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let Some(schedule) = read_schedule(&tx, name)? else {
            warn!(task = %name, "update_after_run for unknown task — ignored");
            return Ok(());
        };

        let now = now_naive();
        let next = compute_next_run(&schedule, Some(now), now);
        tx.execute(
            "UPDATE task_schedules
             SET last_run_at = ?2, last_error = NULL, next_run_at = ?3, updated_at = ?2
             WHERE task_name = ?1",
            rusqlite::params![name, format_ts(now), format_ts(next)],
        )?;
        tx.commit()?;
        debug!(task = %name, next_run = %next, "schedule advanced after run");
        Ok(())
    }

    /// Advance `next_run_at` from `now` without touching `last_run_at` or
    /// `last_error`.
    ///
    /// Used after a failed run so the next attempt happens at the normal
    /// cadence instead of immediately (a stale past `next_run_at` would
    /// otherwise re-fire at delay 0 in a tight loop).
    pub fn advance_next_run(&self, name: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let Some(schedule) = read_schedule(&tx, name)? else {
            warn!(task = %name, "advance_next_run for unknown task — ignored");
            return Ok(());
        };

        let now = now_naive();
        let next = compute_next_run(&schedule, Some(now), now);
        tx.execute(
            "UPDATE task_schedules SET next_run_at = ?2, updated_at = ?3 WHERE task_name = ?1",
            rusqlite::params![name, format_ts(next), format_ts(now)],
        )?;
        tx.commit()?;
        debug!(task = %name, next_run = %next, "schedule advanced after failure");
        Ok(())
    }

    /// Store a failure message for diagnostics. Does not change the cadence.
    pub fn record_error(&self, name: &str, message: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE task_schedules SET last_error = ?2, updated_at = ?3 WHERE task_name = ?1",
            rusqlite::params![name, message, format_ts(now_naive())],
        )?;
        if changed == 0 {
            warn!(task = %name, "record_error for unknown task — ignored");
        }
        Ok(())
    }

    /// The full row for `name`, if present.
    pub fn get(&self, name: &str) -> Result<Option<ScheduleRecord>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{SELECT_RECORD} WHERE task_name = ?1"),
            [name],
            row_to_record,
        ) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All rows, sorted by task name (read-only listing for the status API).
    pub fn list_all(&self) -> Result<Vec<ScheduleRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("{SELECT_RECORD} ORDER BY task_name"))?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

const SELECT_RECORD: &str = "SELECT task_name, schedule, next_run_at, last_run_at,
        last_error, created_at, updated_at
 FROM task_schedules";

/// Read and decode the stored schedule for `name` inside an open transaction.
fn read_schedule(tx: &rusqlite::Transaction<'_>, name: &str) -> Result<Option<Schedule>> {
    let raw: String = match tx.query_row(
        "SELECT schedule FROM task_schedules WHERE task_name = ?1",
        [name],
        |row| row.get(0),
    ) {
        Ok(s) => s,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // Corrupt JSON degrades to the Unknown kind (one-day cadence) rather than
    // wedging the task forever.
    Ok(Some(serde_json::from_str(&raw).unwrap_or(Schedule::Unknown)))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRecord> {
    let schedule_json: String = row.get(1)?;
    let schedule = serde_json::from_str(&schedule_json).unwrap_or(Schedule::Unknown);
    Ok(ScheduleRecord {
        task_name: row.get(0)?,
        schedule,
        next_run_at: row.get::<_, Option<String>>(2)?.as_deref().and_then(parse_ts),
        last_run_at: row.get::<_, Option<String>>(3)?.as_deref().and_then(parse_ts),
        last_error: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?).unwrap_or_default(),
        updated_at: parse_ts(&row.get::<_, String>(6)?).unwrap_or_default(),
    })
}
