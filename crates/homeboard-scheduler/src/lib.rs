//! `homeboard-scheduler` — task scheduling and persistence core.
//!
//! # Overview
//!
//! Each dashboard component owns one named recurring task. A
//! [`store::ScheduleStore`] row per task name records its schedule kind and
//! the persisted `next_run_at`/`last_run_at` timestamps, so cadence survives
//! process restarts. The [`runner::TaskRunner`] binds a task name to a
//! [`runner::Runnable`], arms one cancelable timer per name in the
//! [`timers::TimerRegistry`], and after every fire — success or failure —
//! re-reads the store and re-arms, producing the scheduling loop. Completed
//! work is handed to the UI-owning thread through the non-blocking
//! [`results`] channel.
//!
//! # Schedule kinds
//!
//! | Kind              | Behaviour                                        |
//! |-------------------|--------------------------------------------------|
//! | `Daily`           | Fire at HH:MM UTC every day                      |
//! | `Hourly`          | Fire one hour after the previous run             |
//! | `IntervalSeconds` | Fire N seconds after the previous run            |
//! | `Monthly`         | Fire on day D at HH:MM UTC, clamped to month end |
//!
//! All timestamps are naive UTC at second precision.

pub mod db;
pub mod error;
pub mod results;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod timers;

pub use error::{Result, SchedulerError};
pub use results::{result_channel, ResultChannel, ResultSender, TaskResult};
pub use runner::{Runnable, TaskRunner};
pub use schedule::compute_next_run;
pub use store::{ScheduleRecord, ScheduleStore};
pub use timers::{ActiveTimer, TimerRegistry};
