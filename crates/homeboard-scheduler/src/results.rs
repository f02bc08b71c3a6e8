use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// Default hand-off capacity. The consumer drains once per second, so this
/// only fills if the UI thread stalls for minutes.
pub const RESULT_QUEUE_CAPACITY: usize = 256;

/// One completed unit of work, handed from a worker thread to the UI-owning
/// thread. `payload` carries whatever the runnable produced; `None` signals
/// "refresh from the store" (including the failure case).
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_name: String,
    pub payload: Option<serde_json::Value>,
}

/// Producer half, cloned into every runnable. Push never blocks.
#[derive(Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<TaskResult>,
}

impl ResultSender {
    /// Hand a completion to the consumer. A full or closed channel drops the
    /// result with a warning — worker threads must never stall on the UI.
    pub fn push(&self, task_name: &str, payload: Option<serde_json::Value>) {
        let result = TaskResult {
            task_name: task_name.to_string(),
            payload,
        };
        if self.tx.try_send(result).is_err() {
            warn!(task = %task_name, "result channel full or closed — result dropped");
        }
    }
}

/// Consumer half, owned by the single UI-owning thread.
pub struct ResultChannel {
    rx: mpsc::Receiver<TaskResult>,
}

impl ResultChannel {
    /// Take everything currently queued without blocking. Safe to call on a
    /// fixed cadence from the UI loop; returns an empty vec when idle.
    pub fn drain(&mut self) -> Vec<TaskResult> {
        let mut out = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            out.push(result);
        }
        out
    }
}

/// Create a bounded hand-off pair with the given capacity.
pub fn result_channel(capacity: usize) -> (ResultSender, ResultChannel) {
    let (tx, rx) = mpsc::channel(capacity);
    (ResultSender { tx }, ResultChannel { rx })
}
