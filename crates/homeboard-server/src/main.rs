use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use homeboard_core::HomeboardConfig;
use homeboard_scheduler::{result_channel, ScheduleStore, TaskRunner, TimerRegistry};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homeboard=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path via HOMEBOARD_CONFIG > ~/.homeboard/homeboard.toml
    let config_path = std::env::var("HOMEBOARD_CONFIG").ok();
    let config = HomeboardConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        HomeboardConfig::default()
    });

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    let store = Arc::new(ScheduleStore::new(db)?);

    let (result_tx, mut result_rx) =
        result_channel(homeboard_scheduler::results::RESULT_QUEUE_CAPACITY);
    let timers = TimerRegistry::new(tokio::runtime::Handle::current());
    let runner = TaskRunner::new(Arc::clone(&store), timers, result_tx);

    // Persist schedule parameters for every enabled config task. Existing
    // rows keep their pending next_run_at, so restarts never reset cadence.
    for (name, entry) in &config.tasks {
        if !entry.enabled {
            info!(task = %name, "task disabled in config — skipped");
            continue;
        }
        runner.ensure_scheduled(name, &entry.schedule, None)?;
    }
    info!(count = config.tasks.len(), "task schedules ensured");

    // Drain loop: the headless counterpart of the dashboard UI thread's
    // once-per-second poll over the result queue.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            for result in result_rx.drain() {
                info!(
                    task = %result.task_name,
                    has_payload = result.payload.is_some(),
                    "task completed"
                );
            }
        }
    });

    let state = Arc::new(app::AppState {
        config,
        store,
        runner: runner.clone(),
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("Homeboard server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // cancel pending timers; in-flight task bodies die with the process
    runner.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
