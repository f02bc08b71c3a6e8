//! End-to-end scheduling loop: fresh database → immediate first run →
//! persisted cadence → re-armed timer, plus manual refresh overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rusqlite::Connection;
use serde_json::Value;
use tokio::runtime::Handle;

use homeboard_core::Schedule;
use homeboard_scheduler::schedule::now_naive;
use homeboard_scheduler::{result_channel, ResultSender, ScheduleStore, TaskRunner, TimerRegistry};

fn weather_runnable(store: Arc<ScheduleStore>) -> Arc<dyn homeboard_scheduler::Runnable> {
    Arc::new(
        move |_config: &Value, _extra: Option<&Value>, results: &ResultSender| -> anyhow::Result<()> {
            // Stand-in for the real fetch backend: "persist" domain data,
            // advance the schedule, hand the payload to the UI thread.
            store.update_after_run("weather")?;
            results.push("weather", Some(serde_json::json!({"temp_f": 72})));
            Ok(())
        },
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_install_runs_immediately_then_settles_on_interval() {
    let store = Arc::new(
        ScheduleStore::new(Connection::open_in_memory().expect("open sqlite"))
            .expect("init schema"),
    );
    let (tx, mut results) = result_channel(16);
    let runner = TaskRunner::new(
        Arc::clone(&store),
        TimerRegistry::new(Handle::current()),
        tx,
    );

    // Fresh DB: the row is created with next_run_at = NULL, meaning due now.
    runner
        .ensure_scheduled(
            "weather",
            &Schedule::IntervalSeconds {
                interval_seconds: 3600,
            },
            None,
        )
        .expect("ensure_scheduled failed");
    assert_eq!(store.get_next_run("weather").expect("store read"), None);

    runner.register("weather", weather_runnable(Arc::clone(&store)));
    runner.schedule_registered("weather", serde_json::json!({"city": "Dallas"}), None);

    tokio::time::sleep(Duration::from_millis(300)).await;

    // The first run completed and advanced the persisted cadence.
    let rec = store.get("weather").expect("store read").expect("row missing");
    let last_run = rec.last_run_at.expect("last_run_at not set");
    assert!((now_naive() - last_run).num_seconds().abs() < 10);
    assert_eq!(rec.last_error, None);
    assert_eq!(
        rec.next_run_at,
        Some(last_run + ChronoDuration::seconds(3600))
    );

    // The runner re-armed a single timer roughly one hour out.
    let timers = runner.active_timers();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].name, "weather");
    let until_fire = (timers[0].next_fire_at - now_naive()).num_seconds();
    assert!(
        (3590..=3610).contains(&until_fire),
        "unexpected re-arm delay {until_fire}s"
    );

    // The UI thread sees exactly one completion.
    let drained = results.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].task_name, "weather");
    assert_eq!(drained[0].payload.as_ref().expect("payload missing")["temp_f"], 72);

    runner.shutdown();
    assert!(runner.active_timers().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_refresh_overlaps_scheduled_cycle_without_corruption() {
    let store = Arc::new(
        ScheduleStore::new(Connection::open_in_memory().expect("open sqlite"))
            .expect("init schema"),
    );
    let (tx, mut results) = result_channel(16);
    let runner = TaskRunner::new(
        Arc::clone(&store),
        TimerRegistry::new(Handle::current()),
        tx,
    );

    runner
        .ensure_scheduled(
            "weather",
            &Schedule::IntervalSeconds {
                interval_seconds: 3600,
            },
            None,
        )
        .expect("ensure_scheduled failed");
    runner.register("weather", weather_runnable(Arc::clone(&store)));

    // Scheduled fire (due immediately) racing a manual refresh.
    runner.schedule_registered("weather", Value::Null, None);
    runner.run_now("weather", Value::Null, None);

    tokio::time::sleep(Duration::from_millis(300)).await;

    // Both completions may land; whichever wrote last left a consistent row.
    let rec = store.get("weather").expect("store read").expect("row missing");
    let last_run = rec.last_run_at.expect("last_run_at not set");
    assert_eq!(
        rec.next_run_at,
        Some(last_run + ChronoDuration::seconds(3600))
    );
    assert_eq!(rec.last_error, None);

    let drained = results.drain();
    assert!(
        (1..=2).contains(&drained.len()),
        "expected one or two completions, got {}",
        drained.len()
    );

    runner.shutdown();
}
