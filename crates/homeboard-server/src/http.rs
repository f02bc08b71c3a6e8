use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Scheduled tasks: persisted schedule rows plus the in-memory timers.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let db_schedules = state
        .store
        .list_all()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let active_timers: Vec<Value> = state
        .runner
        .active_timers()
        .into_iter()
        .map(|t| json!({"name": t.name, "next_run_at": t.next_fire_at}))
        .collect();

    Ok(Json(json!({
        "db_schedules": db_schedules,
        "active_timers": active_timers,
    })))
}

/// Manual refresh: run a registered task once, immediately. The normal
/// scheduled cycle is left untouched.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, String)> {
    if !state.runner.is_registered(&name) {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no runnable registered for task: {name}"),
        ));
    }

    let settings = state
        .config
        .tasks
        .get(&name)
        .map(|t| t.settings.clone())
        .unwrap_or(Value::Null);

    info!(task = %name, "manual run requested");
    let runner = state.runner.clone();
    let task = name.clone();
    // Task bodies block on I/O; keep them off the async workers.
    tokio::task::spawn_blocking(move || runner.run_now(&task, settings, None));

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "task": name})),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use homeboard_core::{HomeboardConfig, Schedule};
    use homeboard_scheduler::{
        result_channel, ResultChannel, ResultSender, ScheduleStore, TaskRunner, TimerRegistry,
    };
    use rusqlite::Connection;
    use tokio::runtime::Handle;
    use tower::ServiceExt;

    fn test_state() -> (Arc<AppState>, ResultChannel) {
        let store = Arc::new(
            ScheduleStore::new(Connection::open_in_memory().expect("open sqlite"))
                .expect("init schema"),
        );
        let (tx, rx) = result_channel(16);
        let runner = TaskRunner::new(
            Arc::clone(&store),
            TimerRegistry::new(Handle::current()),
            tx,
        );
        let state = Arc::new(AppState {
            config: HomeboardConfig::default(),
            store,
            runner,
        });
        (state, rx)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse body")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_returns_ok() {
        let (state, _rx) = test_state();
        let response = build_router(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_tasks_returns_schedules_and_timers() {
        let (state, _rx) = test_state();
        state
            .store
            .ensure_scheduled(
                "weather",
                &Schedule::IntervalSeconds {
                    interval_seconds: 3600,
                },
                None,
            )
            .unwrap();
        state
            .store
            .ensure_scheduled("prayer", &Schedule::Daily { time: "04:30".into() }, None)
            .unwrap();

        let response = build_router(state)
            .oneshot(Request::get("/api/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let schedules = body["db_schedules"].as_array().expect("db_schedules");
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[0]["task_name"], "prayer");
        assert_eq!(schedules[0]["schedule"]["kind"], "daily");
        assert!(body["active_timers"].as_array().expect("active_timers").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_unknown_task_is_not_found() {
        let (state, _rx) = test_state();
        let response = build_router(state)
            .oneshot(
                Request::post("/api/tasks/ghost/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_registered_task_is_accepted_and_executes() {
        let (state, mut rx) = test_state();
        state.runner.register(
            "weather",
            Arc::new(
                |_: &Value, _: Option<&Value>, results: &ResultSender| -> anyhow::Result<()> {
                    results.push("weather", Some(json!({"temp_f": 72})));
                    Ok(())
                },
            ),
        );

        let response = build_router(Arc::clone(&state))
            .oneshot(
                Request::post("/api/tasks/weather/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["task"], "weather");

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let drained = rx.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].task_name, "weather");
    }
}
