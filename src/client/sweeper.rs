//! Background sweep of expired responses.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::coordinator::RequestCoordinator;

/// Handle for the periodic cleanup task.
///
/// The task stops when the handle is shut down or dropped.
pub struct CleanupHandle {
  shutdown_tx: mpsc::Sender<()>,
  task: JoinHandle<()>,
}

impl CleanupHandle {
  /// Stop the task and wait for it to finish.
  pub async fn shutdown(self) {
    let _ = self.shutdown_tx.send(()).await;
    let _ = self.task.await;
  }
}

impl RequestCoordinator {
  /// Run [`cleanup`](RequestCoordinator::cleanup) every `every` on the current runtime.
  pub fn spawn_cleanup(&self, every: Duration) -> CleanupHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let coordinator = self.clone();

    let task = tokio::spawn(async move {
      let mut interval = tokio::time::interval(every);
      // Skip the first tick (immediate)
      interval.tick().await;

      loop {
        tokio::select! {
          _ = interval.tick() => {
            coordinator.cleanup();
          }
          _ = shutdown_rx.recv() => {
            debug!("Cleanup task stopped");
            break;
          }
        }
      }
    });

    CleanupHandle { shutdown_tx, task }
  }
}
