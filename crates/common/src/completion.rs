//! Completion contexts
//!
//! A completion context is where caller callbacks run. The print worker only
//! posts tasks; it never executes a callback on its own thread.

use async_channel::{Receiver, Sender, unbounded};
use tracing::warn;

/// A unit of work posted to a completion context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes posted tasks on the caller's side
pub trait CompletionContext: Send + Sync {
    fn post(&self, task: Task);
}

/// Posting half of a caller-driven completion loop
///
/// The caller owns the matching [`CompletionLoop`] and drains it from its own
/// thread, the way a UI main loop would.
#[derive(Clone)]
pub struct CompletionQueue {
    tx: Sender<Task>,
}

impl CompletionContext for CompletionQueue {
    fn post(&self, task: Task) {
        if self.tx.try_send(task).is_err() {
            warn!("Completion loop closed, dropping callback");
        }
    }
}

/// Draining half of a caller-driven completion loop
pub struct CompletionLoop {
    rx: Receiver<Task>,
}

impl CompletionLoop {
    /// Run every task already posted; returns how many ran
    pub fn dispatch_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Wait for the next task and run it
    pub async fn dispatch_next(&self) -> crate::Result<()> {
        let task = self
            .rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))?;
        task();
        Ok(())
    }

    /// Wait for the next task and run it (blocking)
    pub fn dispatch_next_blocking(&self) -> crate::Result<()> {
        let task = self
            .rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))?;
        task();
        Ok(())
    }
}

/// Create a caller-driven completion loop
pub fn completion_queue() -> (CompletionQueue, CompletionLoop) {
    let (tx, rx) = unbounded();
    (CompletionQueue { tx }, CompletionLoop { rx })
}

/// Runs callbacks on a Tokio runtime's blocking pool
#[derive(Clone)]
pub struct TokioCompletion {
    handle: tokio::runtime::Handle,
}

impl TokioCompletion {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling task
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl CompletionContext for TokioCompletion {
    fn post(&self, task: Task) {
        // Callbacks are plain sync code and may block
        drop(self.handle.spawn_blocking(task));
    }
}
