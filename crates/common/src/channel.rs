//! Async channel bridge between callers and the print worker thread
//!
//! Every print job, device listing and the shutdown request travel through
//! one bounded FIFO queue, so the worker executes them strictly in
//! submission order.

use crate::completion::CompletionContext;
use async_channel::{Receiver, Sender, TrySendError, bounded};
use protocol::{DeviceInfo, Outcome, PrintError, PrintRequest};
use std::fmt;
use std::sync::Arc;

/// Capacity of the print queue
pub const QUEUE_CAPACITY: usize = 256;

/// Caller callback: `(success, message)`
pub type PrintCallback = Box<dyn FnOnce(bool, String) + Send + 'static>;

/// Where a print outcome goes
///
/// Consumed by [`Reply::deliver`], so an outcome can only be delivered once.
pub enum Reply {
    /// Post the callback onto the caller's completion context
    Callback {
        context: Arc<dyn CompletionContext>,
        callback: PrintCallback,
    },
    /// Send the outcome to an awaiting task
    Channel(tokio::sync::oneshot::Sender<Outcome>),
}

impl Reply {
    /// Hand the outcome back to the caller
    ///
    /// Never runs the callback on the calling thread.
    pub fn deliver(self, outcome: Outcome) {
        match self {
            Reply::Callback { context, callback } => {
                context.post(Box::new(move || callback(outcome.success, outcome.message)));
            }
            Reply::Channel(tx) => {
                if tx.send(outcome).is_err() {
                    tracing::debug!("Print outcome dropped: caller stopped waiting");
                }
            }
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Callback { .. } => f.write_str("Reply::Callback"),
            Reply::Channel(_) => f.write_str("Reply::Channel"),
        }
    }
}

/// Commands from callers to the print worker
#[derive(Debug)]
pub enum PrintCommand {
    /// Run one print job
    Print {
        /// Job to print
        request: PrintRequest,
        /// Where to deliver the outcome
        reply: Reply,
    },

    /// Enumerate attached USB devices
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Result<Vec<DeviceInfo>, PrintError>>,
    },

    /// Stop the worker after the jobs queued ahead of this command
    Shutdown,
}

/// Submitting side of the queue (cloneable, usable from any thread)
#[derive(Clone)]
pub struct PrintBridge {
    cmd_tx: Sender<PrintCommand>,
}

impl PrintBridge {
    /// Send a command, waiting for queue space
    pub async fn send_command(&self, cmd: PrintCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a command without waiting
    ///
    /// On failure the command is handed back inside the error so its reply
    /// can still be delivered.
    pub fn try_send_command(&self, cmd: PrintCommand) -> Result<(), TrySendError<PrintCommand>> {
        self.cmd_tx.try_send(cmd)
    }

    /// Send a command from synchronous code, blocking for queue space
    pub fn send_command_blocking(&self, cmd: PrintCommand) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Number of commands waiting for the worker
    pub fn pending(&self) -> usize {
        self.cmd_tx.len()
    }
}

/// Receiving side of the queue, owned by the worker thread
pub struct PrintWorker {
    pub(crate) cmd_rx: Receiver<PrintCommand>,
}

impl PrintWorker {
    /// Receive the next command (blocking)
    ///
    /// Fails once every [`PrintBridge`] has been dropped and the queue is
    /// drained.
    pub fn recv_command(&self) -> crate::Result<PrintCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<PrintCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the channel bridge between callers and the print worker
///
/// Returns (PrintBridge for callers, PrintWorker for the worker thread)
pub fn create_print_bridge() -> (PrintBridge, PrintWorker) {
    let (cmd_tx, cmd_rx) = bounded(QUEUE_CAPACITY);

    (PrintBridge { cmd_tx }, PrintWorker { cmd_rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::completion_queue;
    use protocol::RequestKind;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_print_bridge();

        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, PrintCommand::ListDevices { .. })
        });

        let (tx, _rx) = tokio::sync::oneshot::channel();
        bridge
            .send_command(PrintCommand::ListDevices { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_try_send_hands_command_back_when_closed() {
        let (bridge, worker) = create_print_bridge();
        drop(worker);

        let err = bridge
            .try_send_command(PrintCommand::Shutdown)
            .unwrap_err();
        assert!(err.is_closed());
        assert!(matches!(err.into_inner(), PrintCommand::Shutdown));
    }

    #[test]
    fn test_reply_callback_is_posted_not_run() {
        let (queue, completion_loop) = completion_queue();
        let (tx, rx) = std::sync::mpsc::channel();

        let reply = Reply::Callback {
            context: Arc::new(queue),
            callback: Box::new(move |success, message| {
                tx.send((success, message)).unwrap();
            }),
        };
        reply.deliver(Outcome::printed(RequestKind::Text));

        // Nothing runs until the completion loop dispatches
        assert!(rx.try_recv().is_err());
        assert_eq!(completion_loop.dispatch_pending(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            (true, "USB printed successfully".to_string())
        );
    }

    #[tokio::test]
    async fn test_reply_channel() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        Reply::Channel(tx).deliver(Outcome::failed(
            RequestKind::Raw,
            PrintError::PermissionDenied,
        ));

        let outcome = rx.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(PrintError::PermissionDenied));
    }
}
