use rusqlite::Connection;

use crate::error::Result;

/// Initialise the schedule schema in `conn`.
///
/// Creates the `task_schedules` table (idempotent) and an index on
/// `next_run_at` for the due-time lookups. Domain data written by the fetch
/// backends lives in their own tables; this one only drives cadence.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS task_schedules (
            task_name   TEXT NOT NULL PRIMARY KEY,
            schedule    TEXT NOT NULL,   -- JSON-encoded Schedule enum
            next_run_at TEXT,            -- naive UTC; NULL means run immediately
            last_run_at TEXT,            -- naive UTC of last successful run
            last_error  TEXT,            -- last failure message, NULL on success
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_task_schedules_next_run
            ON task_schedules (next_run_at);
        ",
    )?;
    Ok(())
}
