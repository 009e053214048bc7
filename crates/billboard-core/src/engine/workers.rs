use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Tasks that share one shutdown signal.
/// - `request_shutdown()` で全タスクに停止を通知（sender が drop されても止まる）
/// - `shutdown_and_join()` で全タスクの終了を待てる
pub struct TaskGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    /// Receiver for a task that is about to join the group.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn push(&mut self, join: JoinHandle<()>) {
        self.joins.push(join);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn request_shutdown(&self) {
        // send_replace: works even when every receiver is gone
        self.shutdown_tx.send_replace(true);
    }

    /// Shutdown and wait for all tasks. A panicked task is logged, not propagated.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                if err.is_panic() {
                    tracing::error!(error = %err, "engine task panicked");
                }
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}
