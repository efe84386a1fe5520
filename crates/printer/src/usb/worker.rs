//! Print worker thread
//!
//! Dedicated thread that drains the print queue one command at a time.
//! Discovery, permission waits and blocking bulk transfers all happen here,
//! never on a caller's thread or the Tokio runtime.

use crate::usb::manager::PrinterManager;
use common::{PrintCommand, PrintWorker, UsbHost};
use protocol::{Outcome, PrintError};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, error, info, warn};

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "print-worker";

/// Print worker thread
///
/// Owns the printer manager (and through it the USB host) and the receiving
/// end of the print queue.
pub struct PrintWorkerThread<H: UsbHost> {
    manager: PrinterManager<H>,
    worker: PrintWorker,
}

impl<H: UsbHost> PrintWorkerThread<H> {
    pub fn new(worker: PrintWorker, manager: PrinterManager<H>) -> Self {
        Self { manager, worker }
    }

    /// Process commands in FIFO order until `Shutdown` or until every bridge
    /// has been dropped
    pub fn run(mut self) {
        info!("Print worker started");

        loop {
            match self.worker.recv_command() {
                Ok(PrintCommand::Shutdown) => {
                    info!("Print worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => {
                    debug!("Print queue closed");
                    break;
                }
            }
        }

        info!("Print worker stopped");
    }

    fn handle_command(&mut self, cmd: PrintCommand) {
        match cmd {
            PrintCommand::Print { request, reply } => {
                let kind = request.kind();
                let result = catch_unwind(AssertUnwindSafe(|| self.manager.run(&request)));

                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!("Panic in print job: {}", reason);

                        let outcome = Outcome::failed(kind, PrintError::Internal(reason));
                        if let Err(e) = self.manager.notifier().notify_error(&outcome.message) {
                            warn!("Failed to deliver error notification: {}", e);
                        }
                        outcome
                    }
                };

                if outcome.success {
                    info!("{}", outcome.message);
                } else {
                    warn!("{}", outcome.message);
                }
                reply.deliver(outcome);
            }

            PrintCommand::ListDevices { response } => {
                let result = catch_unwind(AssertUnwindSafe(|| self.manager.list_devices()))
                    .unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        error!("Panic while listing devices: {}", reason);
                        Err(PrintError::Internal(reason))
                    });

                if let Ok(devices) = &result {
                    debug!("Listing {} devices", devices.len());
                }
                let _ = response.send(result);
            }

            PrintCommand::Shutdown => {}
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawn the print worker thread
pub fn spawn_print_worker<H: UsbHost>(
    worker: PrintWorker,
    manager: PrinterManager<H>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || PrintWorkerThread::new(worker, manager).run())
        .expect("Failed to spawn print worker thread")
}
