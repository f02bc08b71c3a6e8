use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use homeboard_core::HomeboardConfig;
use homeboard_scheduler::{ScheduleStore, TaskRunner};

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub config: HomeboardConfig,
    pub store: Arc<ScheduleStore>,
    pub runner: TaskRunner,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(crate::http::health))
        .route("/api/tasks", get(crate::http::list_tasks))
        // alias kept for dashboard clients that query /api/schedules
        .route("/api/schedules", get(crate::http::list_tasks))
        .route("/api/tasks/{name}/run", post(crate::http::run_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
