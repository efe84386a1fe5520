//! Printer manager
//!
//! Runs the per-job pipeline on the worker thread: fresh enumeration,
//! filtering, selection, permission, interface resolution and the transfer
//! session. Nothing is cached between jobs.

use crate::usb::permission::PermissionGate;
use crate::usb::selector::{DeviceFilter, find_endpoint, find_interface, select_printer};
use crate::usb::transfers::{self, TransferTimeouts};
use common::{Notifier, UsbHost};
use protocol::{DeviceInfo, Outcome, PrintError, PrintRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the USB host and everything a print job needs
pub struct PrinterManager<H: UsbHost> {
    host: H,
    filter: DeviceFilter,
    gate: PermissionGate,
    timeouts: TransferTimeouts,
    notifier: Arc<dyn Notifier>,
}

impl<H: UsbHost> PrinterManager<H> {
    pub fn new(host: H, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            host,
            filter: DeviceFilter::default(),
            gate: PermissionGate::default(),
            timeouts: TransferTimeouts::default(),
            notifier,
        }
    }

    pub fn with_filter(mut self, filter: DeviceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_permission_gate(mut self, gate: PermissionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TransferTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Access to the host, for tests and diagnostics
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Run one job and turn the result into an outcome
    pub fn run(&self, request: &PrintRequest) -> Outcome {
        match self.print(request) {
            Ok(()) => Outcome::printed(request.kind()),
            Err(e) => Outcome::failed(request.kind(), e),
        }
    }

    /// Run one job end to end
    pub fn print(&self, request: &PrintRequest) -> protocol::Result<()> {
        let devices = self.enumerate()?;
        let devices = self.filter.apply(devices);

        let device = select_printer(&devices).ok_or_else(|| {
            debug!("No printer among {} devices", devices.len());
            PrintError::NoDeviceFound
        })?;
        info!("Selected printer {}", device.label());

        if !self.gate.ensure_permission(&self.host, device) {
            return Err(PrintError::PermissionDenied);
        }

        let interface = find_interface(device).ok_or(PrintError::InterfaceNotFound)?;
        let endpoint = find_endpoint(interface).ok_or(PrintError::InterfaceNotFound)?;
        debug!(
            "Using interface {} endpoint {:#04x}",
            interface.number, endpoint.address
        );

        transfers::execute(
            &self.host,
            device,
            interface,
            endpoint,
            request,
            &self.timeouts,
            self.notifier.as_ref(),
        )
    }

    /// Current enumeration, unfiltered
    pub fn list_devices(&self) -> protocol::Result<Vec<DeviceInfo>> {
        self.enumerate()
    }

    fn enumerate(&self) -> protocol::Result<Vec<DeviceInfo>> {
        self.host.list_devices().map_err(|e| {
            warn!("USB enumeration failed: {}", e);
            PrintError::NoUsbSubsystem
        })
    }
}
