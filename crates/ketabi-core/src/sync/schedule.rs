//! Delayed delivery
//!
//! `schedule` sends a payload on a channel after a delay; `cancel` stops it
//! if it hasn't fired yet.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A pending delivery started by [`schedule`]
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Whether the payload has been sent (or the task was aborted)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Send `payload` on `tx` once `delay` has passed
pub fn schedule<T>(delay: Duration, payload: T, tx: mpsc::UnboundedSender<T>) -> TaskHandle
where
    T: Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        // Receiver gone means nobody cares any more
        let _ = tx.send(payload);
    });
    TaskHandle { handle }
}

/// Stop a scheduled delivery
///
/// A payload that was already sent stays in the channel; receivers that
/// care must tell stale deliveries apart themselves.
pub fn cancel(task: TaskHandle) {
    task.handle.abort();
}
