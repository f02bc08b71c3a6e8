use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::schedule::now_naive;

/// Callback fired when a timer is due. Invoked on the blocking pool, so slow
/// task bodies never stall the timer runtime.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Observability snapshot of one pending timer.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTimer {
    pub name: String,
    pub next_fire_at: NaiveDateTime,
}

struct TimerEntry {
    fire_at: NaiveDateTime,
    /// Distinguishes this arm from any later arm under the same name, so a
    /// stale fire cannot claim (or clean up) a replacement timer.
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    timers: Mutex<HashMap<String, TimerEntry>>,
    generations: AtomicU64,
}

/// In-memory table of named, cancelable, one-shot delayed callbacks.
///
/// At most one pending timer exists per name: scheduling under an existing
/// name cancels the previous timer first (last write wins, no queued
/// duplicate fires). Nothing here is persisted — callers re-register on
/// every startup.
#[derive(Clone)]
pub struct TimerRegistry {
    runtime: Handle,
    inner: Arc<Inner>,
}

impl TimerRegistry {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            inner: Arc::new(Inner {
                timers: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Arm `callback` to fire once after `delay`, replacing any pending timer
    /// under the same name.
    ///
    /// With `recurring = true` the timer re-arms itself with the same delay
    /// after each fire. The task runner always passes `false` and re-arms
    /// explicitly, because the delay of the next cycle depends on state the
    /// callback itself just wrote.
    pub fn schedule(&self, name: &str, callback: TimerCallback, delay: Duration, recurring: bool) {
        debug!(task = %name, delay_secs = delay.as_secs(), recurring, "scheduling timer");
        Self::arm(
            self.runtime.clone(),
            Arc::clone(&self.inner),
            name.to_string(),
            callback,
            delay,
            recurring,
        );
    }

    fn arm(
        runtime: Handle,
        inner: Arc<Inner>,
        name: String,
        callback: TimerCallback,
        delay: Duration,
        recurring: bool,
    ) {
        let generation = inner.generations.fetch_add(1, Ordering::Relaxed);
        let fire_at = now_naive() + chrono::Duration::seconds(delay.as_secs() as i64);

        let task_runtime = runtime.clone();
        let task_inner = Arc::clone(&inner);
        let task_name = name.clone();
        let task_cb = Arc::clone(&callback);

        // Hold the table lock across spawn + insert so a zero-delay fire on
        // another worker cannot observe the map before its entry exists.
        let mut timers = inner.timers.lock().unwrap();

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // Claim the fire: remove our own entry. If the entry is gone or
            // belongs to a newer arm, this timer was cancelled or replaced
            // between sleep and wake.
            {
                let mut timers = task_inner.timers.lock().unwrap();
                let ours = timers
                    .get(&task_name)
                    .is_some_and(|entry| entry.generation == generation);
                if !ours {
                    return;
                }
                timers.remove(&task_name);
            }

            let cb = Arc::clone(&task_cb);
            let panicked = tokio::task::spawn_blocking(move || {
                std::panic::catch_unwind(AssertUnwindSafe(|| cb())).is_err()
            })
            .await
            .unwrap_or(true);
            if panicked {
                error!(task = %task_name, "timer callback panicked; other timers unaffected");
            }

            if recurring {
                TimerRegistry::arm(task_runtime, task_inner, task_name, task_cb, delay, true);
            }
        });

        if let Some(prev) = timers.insert(
            name.clone(),
            TimerEntry {
                fire_at,
                generation,
                handle,
            },
        ) {
            debug!(task = %name, "replacing pending timer");
            prev.handle.abort();
        }
    }

    /// Cancel the pending timer for `name`, if any. Idempotent. Does not
    /// interrupt a callback that is already executing — it only prevents the
    /// pending fire.
    pub fn cancel(&self, name: &str) {
        let mut timers = self.inner.timers.lock().unwrap();
        if let Some(entry) = timers.remove(name) {
            debug!(task = %name, "timer cancelled");
            entry.handle.abort();
        }
    }

    /// Snapshot of all pending timers, sorted by name. Read-only.
    pub fn list_active(&self) -> Vec<ActiveTimer> {
        let timers = self.inner.timers.lock().unwrap();
        let mut out: Vec<ActiveTimer> = timers
            .iter()
            .map(|(name, entry)| ActiveTimer {
                name: name.clone(),
                next_fire_at: entry.fire_at,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Cancel every pending timer. Called once at process shutdown; in-flight
    /// callbacks are left to finish (or die with the process).
    pub fn stop_all(&self) {
        let mut timers = self.inner.timers.lock().unwrap();
        let count = timers.len();
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
        if count > 0 {
            info!(count, "all pending timers cancelled");
        }
    }
}
