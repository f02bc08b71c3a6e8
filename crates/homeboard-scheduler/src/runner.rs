use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{debug, error, warn};

use homeboard_core::Schedule;

use crate::error::Result;
use crate::results::ResultSender;
use crate::schedule::now_naive;
use crate::store::{ScheduleRecord, ScheduleStore};
use crate::timers::{ActiveTimer, TimerCallback, TimerRegistry};

/// One pluggable unit of recurring work.
///
/// Implementations do their own I/O, persist their domain results, call
/// [`ScheduleStore::update_after_run`] on success, and push
/// `(task_name, payload)` onto the result channel. The runner treats the
/// body as opaque: an `Err` is recorded as `last_error` and the cadence
/// still advances.
///
/// Bodies run on worker threads and may overlap with a manual `run_now`
/// invocation, so persistence must use replace-prior-records semantics.
pub trait Runnable: Send + Sync {
    fn run(
        &self,
        config: &Value,
        extra: Option<&Value>,
        results: &ResultSender,
    ) -> anyhow::Result<()>;
}

impl<F> Runnable for F
where
    F: Fn(&Value, Option<&Value>, &ResultSender) -> anyhow::Result<()> + Send + Sync,
{
    fn run(
        &self,
        config: &Value,
        extra: Option<&Value>,
        results: &ResultSender,
    ) -> anyhow::Result<()> {
        self(config, extra, results)
    }
}

struct RegisteredTask {
    runnable: Arc<dyn Runnable>,
    /// Snapshot of the most recently supplied (config, extra) pair; `None`
    /// until `schedule_registered` runs. The reschedule loop reuses it.
    config: Option<(Value, Option<Value>)>,
}

struct Inner {
    store: Arc<ScheduleStore>,
    timers: TimerRegistry,
    results: ResultSender,
    tasks: Mutex<HashMap<String, RegisteredTask>>,
}

/// Registration façade tying the schedule store, the next-run calculator and
/// the timer registry into one scheduling loop per task name.
///
/// Constructed once at startup with injected dependencies and passed by
/// handle to every registering component — single instance per process, no
/// hidden globals.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<Inner>,
}

impl TaskRunner {
    pub fn new(store: Arc<ScheduleStore>, timers: TimerRegistry, results: ResultSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                timers,
                results,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Associate a runnable with `name`. Idempotent — re-registering replaces
    /// the stored runnable and keeps any existing config snapshot.
    pub fn register(&self, name: &str, runnable: Arc<dyn Runnable>) {
        let mut tasks = self.inner.tasks.lock().unwrap();
        match tasks.get_mut(name) {
            Some(task) => task.runnable = runnable,
            None => {
                tasks.insert(
                    name.to_string(),
                    RegisteredTask {
                        runnable,
                        config: None,
                    },
                );
            }
        }
        debug!(task = %name, "runnable registered");
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.tasks.lock().unwrap().contains_key(name)
    }

    /// Persist the schedule row for `name` (store delegate, see
    /// [`ScheduleStore::ensure_scheduled`]).
    pub fn ensure_scheduled(
        &self,
        name: &str,
        schedule: &Schedule,
        next_run_at: Option<NaiveDateTime>,
    ) -> Result<()> {
        self.inner.store.ensure_scheduled(name, schedule, next_run_at)
    }

    /// Arm the scheduling loop for a registered task.
    ///
    /// The first fire happens at the persisted `next_run_at` (immediately
    /// when the row is new or overdue). After every fire — success or
    /// failure — the loop re-reads the store and re-arms, so the next delay
    /// reflects whatever the run just wrote.
    pub fn schedule_registered(&self, name: &str, config: Value, extra: Option<Value>) {
        {
            let mut tasks = self.inner.tasks.lock().unwrap();
            let Some(task) = tasks.get_mut(name) else {
                warn!(task = %name, "no runnable registered for task");
                return;
            };
            task.config = Some((config, extra));
        }
        Inner::arm(Arc::clone(&self.inner), name.to_string());
    }

    /// Run a registered task once, immediately, in the caller's thread
    /// (manual refresh). Bypasses the timers and leaves any pending
    /// scheduled fire untouched — the two may overlap, which runnables must
    /// tolerate. Unknown names are a logged no-op.
    pub fn run_now(&self, name: &str, config: Value, extra: Option<Value>) {
        let runnable = {
            let tasks = self.inner.tasks.lock().unwrap();
            match tasks.get(name) {
                Some(task) => Arc::clone(&task.runnable),
                None => {
                    warn!(task = %name, "no runnable registered for task");
                    return;
                }
            }
        };
        Inner::invoke(&self.inner, name, &runnable, &config, extra.as_ref());
    }

    /// Snapshot of pending timers (observability / status API).
    pub fn active_timers(&self) -> Vec<ActiveTimer> {
        self.inner.timers.list_active()
    }

    /// All persisted schedule rows (store delegate).
    pub fn schedules(&self) -> Result<Vec<ScheduleRecord>> {
        self.inner.store.list_all()
    }

    /// Cancel every pending timer. In-flight bodies finish on their own.
    pub fn shutdown(&self) {
        self.inner.timers.stop_all();
    }
}

impl Inner {
    /// Arm one timer for `name` at the persisted due time.
    fn arm(inner: Arc<Inner>, name: String) {
        let delay = Self::delay_until_due(&inner, &name);
        let cb_inner = Arc::clone(&inner);
        let cb_name = name.clone();
        let callback: TimerCallback = Arc::new(move || {
            Inner::run_cycle(&cb_inner, &cb_name);
        });
        inner.timers.schedule(&name, callback, delay, false);
    }

    /// `max(0, next_run − now)`; a missing row, null column, or store error
    /// all mean "due now".
    fn delay_until_due(inner: &Inner, name: &str) -> Duration {
        let secs = match inner.store.get_next_run(name) {
            Ok(Some(next)) => (next - now_naive()).num_seconds().max(0) as u64,
            Ok(None) => 0,
            Err(e) => {
                warn!(task = %name, error = %e, "next_run lookup failed; running immediately");
                0
            }
        };
        Duration::from_secs(secs)
    }

    /// One cycle of the scheduling loop: invoke, then re-arm from the store.
    fn run_cycle(inner: &Arc<Inner>, name: &str) {
        let (runnable, snapshot) = {
            let tasks = inner.tasks.lock().unwrap();
            match tasks.get(name) {
                Some(task) => (Arc::clone(&task.runnable), task.config.clone()),
                None => {
                    warn!(task = %name, "timer fired for unregistered task");
                    return;
                }
            }
        };
        let Some((config, extra)) = snapshot else {
            warn!(task = %name, "timer fired before any config was supplied");
            return;
        };

        // A panicking body must not unwind past this point: the loop only
        // stays alive if the trailing re-arm runs. Treat a panic like a
        // returned error.
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            Self::invoke(inner, name, &runnable, &config, extra.as_ref());
        }));
        if let Err(payload) = outcome {
            let message = format!("task body panicked: {}", panic_message(&*payload));
            Self::record_failure(inner, name, &message);
        }

        // Re-arm regardless of outcome — "no more due work" is not a state.
        Self::arm(Arc::clone(inner), name.to_string());
    }

    fn invoke(
        inner: &Arc<Inner>,
        name: &str,
        runnable: &Arc<dyn Runnable>,
        config: &Value,
        extra: Option<&Value>,
    ) {
        match runnable.run(config, extra, &inner.results) {
            Ok(()) => debug!(task = %name, "task completed"),
            Err(e) => Self::record_failure(inner, name, &format!("{e:#}")),
        }
    }

    fn record_failure(inner: &Arc<Inner>, name: &str, message: &str) {
        error!(task = %name, error = %message, "task failed");
        if let Err(db_err) = inner.store.record_error(name, message) {
            error!(task = %name, error = %db_err, "failed to persist last_error");
        }
        // Keep the normal cadence: the next attempt happens after the
        // usual interval, not immediately and not with backoff.
        if let Err(db_err) = inner.store.advance_next_run(name) {
            error!(task = %name, error = %db_err, "failed to advance next_run");
        }
        inner.results.push(name, None);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque payload")
}
