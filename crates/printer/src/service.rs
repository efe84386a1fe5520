//! Caller-facing print service
//!
//! `PrintService` owns the worker thread and exposes the print API. Every
//! request is queued on the single worker lane and answered exactly once:
//! callbacks are posted to the service's completion context, async callers
//! get the outcome directly.

use crate::config::PrinterConfig;
use crate::notifier;
use crate::usb::{PrinterManager, RusbHost, spawn_print_worker};
use async_channel::TrySendError;
use common::{
    CompletionContext, PrintBridge, PrintCommand, Reply, UsbHost, create_print_bridge,
};
use protocol::{DeviceInfo, Outcome, PrintError, PrintRequest};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to the print worker
pub struct PrintService {
    bridge: PrintBridge,
    context: Arc<dyn CompletionContext>,
    worker: JoinHandle<()>,
}

impl PrintService {
    /// Spawn the worker thread around `manager`
    ///
    /// Callbacks passed to [`print_text`](Self::print_text) and
    /// [`print_bytes`](Self::print_bytes) run on `context`.
    pub fn start<H: UsbHost>(
        manager: PrinterManager<H>,
        context: Arc<dyn CompletionContext>,
    ) -> Self {
        let (bridge, worker) = create_print_bridge();
        let handle = spawn_print_worker(worker, manager);
        info!("Print service started");

        Self {
            bridge,
            context,
            worker: handle,
        }
    }

    /// Start against the system USB host with settings from `config`
    pub fn from_config(config: &PrinterConfig, context: Arc<dyn CompletionContext>) -> Self {
        let manager = PrinterManager::new(RusbHost::new(), notifier::from_settings(&config.notifier))
            .with_filter(config.device_filter())
            .with_permission_gate(config.permission_gate())
            .with_timeouts(config.transfer_timeouts());

        Self::start(manager, context)
    }

    /// Print text, encoded as CP858 and followed by feed and cut
    pub fn print_text<F>(&self, text: impl Into<String>, callback: F)
    where
        F: FnOnce(bool, String) + Send + 'static,
    {
        self.submit(PrintRequest::Text(text.into()), callback);
    }

    /// Print raw ESC/POS bytes
    pub fn print_bytes<F>(&self, data: impl Into<Vec<u8>>, callback: F)
    where
        F: FnOnce(bool, String) + Send + 'static,
    {
        self.submit(PrintRequest::Raw(data.into()), callback);
    }

    /// Queue `request` without waiting
    ///
    /// When the queue is full or the worker has stopped, the failure is still
    /// delivered through `callback` on the completion context.
    pub fn submit<F>(&self, request: PrintRequest, callback: F)
    where
        F: FnOnce(bool, String) + Send + 'static,
    {
        let reply = Reply::Callback {
            context: self.context.clone(),
            callback: Box::new(callback),
        };

        if let Err(e) = self
            .bridge
            .try_send_command(PrintCommand::Print { request, reply })
        {
            let reason = match &e {
                TrySendError::Full(_) => "print queue full",
                TrySendError::Closed(_) => "print worker stopped",
            };
            warn!("Rejecting print job: {}", reason);

            if let PrintCommand::Print { request, reply } = e.into_inner() {
                reply.deliver(Outcome::failed(
                    request.kind(),
                    PrintError::WorkerUnavailable(reason.to_string()),
                ));
            }
        }
    }

    /// Queue `request` and wait for its outcome
    pub async fn print(&self, request: PrintRequest) -> Outcome {
        let kind = request.kind();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let sent = self
            .bridge
            .send_command(PrintCommand::Print {
                request,
                reply: Reply::Channel(tx),
            })
            .await;
        if let Err(e) = sent {
            return Outcome::failed(kind, PrintError::WorkerUnavailable(e.to_string()));
        }

        rx.await.unwrap_or_else(|_| {
            Outcome::failed(
                kind,
                PrintError::WorkerUnavailable("worker dropped the job".to_string()),
            )
        })
    }

    /// Enumerate attached USB devices on the worker lane
    pub async fn list_devices(&self) -> protocol::Result<Vec<DeviceInfo>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.bridge
            .send_command(PrintCommand::ListDevices { response: tx })
            .await
            .map_err(|e| PrintError::WorkerUnavailable(e.to_string()))?;

        rx.await
            .map_err(|_| PrintError::WorkerUnavailable("worker dropped the request".to_string()))?
    }

    /// Jobs waiting for the worker
    pub fn pending(&self) -> usize {
        self.bridge.pending()
    }

    /// Stop the worker after the jobs already queued, then join it
    ///
    /// Blocks the calling thread. Dropping the service without calling this
    /// also lets queued jobs finish, but detaches the thread.
    pub fn shutdown(self) {
        if let Err(e) = self.bridge.send_command_blocking(PrintCommand::Shutdown) {
            debug!("Print worker already gone: {}", e);
        }

        if self.worker.join().is_err() {
            error!("Print worker thread panicked");
        }
        info!("Print service stopped");
    }
}
