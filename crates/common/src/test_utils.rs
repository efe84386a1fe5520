//! Test utilities for usb-receipt-print
//!
//! Provides a scriptable USB host, a recording notifier and descriptor
//! builders for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::UsbHost;
//! use common::test_utils::{MockUsbHost, create_mock_printer};
//!
//! let host = MockUsbHost::with_devices(vec![create_mock_printer(1)]);
//! assert_eq!(host.list_devices().unwrap().len(), 1);
//! ```

use crate::notify::Notifier;
use crate::usb_types::{DeviceConnection, HostError, PermissionSignal, UsbHost};
use protocol::{
    DeviceId, DeviceInfo, Direction, EndpointInfo, InterfaceInfo, TransferKind,
    USB_CLASS_PRINTER,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Descriptor builders
// ============================================================================

/// Bulk OUT endpoint
pub fn bulk_out(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer_type: TransferKind::Bulk,
        direction: Direction::Out,
        max_packet_size: 64,
    }
}

/// Bulk IN endpoint
pub fn bulk_in(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer_type: TransferKind::Bulk,
        direction: Direction::In,
        max_packet_size: 64,
    }
}

/// Interrupt IN endpoint
pub fn interrupt_in(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer_type: TransferKind::Interrupt,
        direction: Direction::In,
        max_packet_size: 8,
    }
}

/// Interface with the given class and endpoints
pub fn create_mock_interface(number: u8, class: u8, endpoints: Vec<EndpointInfo>) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alternate_setting: 0,
        class,
        subclass: 0,
        protocol: 0,
        endpoints,
    }
}

/// Device with the given interfaces
///
/// # Example
/// ```
/// use common::test_utils::{bulk_out, create_mock_device_info, create_mock_interface};
///
/// let device = create_mock_device_info(3, 0x0416, 0x5011, vec![
///     create_mock_interface(0, 0x07, vec![bulk_out(0x01)]),
/// ]);
/// assert_eq!(device.id.0, 3);
/// assert_eq!(device.interfaces.len(), 1);
/// ```
pub fn create_mock_device_info(
    id: u32,
    vendor_id: u16,
    product_id: u16,
    interfaces: Vec<InterfaceInfo>,
) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId(id),
        vendor_id,
        product_id,
        bus_number: 1,
        device_address: (id % 128) as u8,
        manufacturer: Some(format!("Test Manufacturer {}", id)),
        product: Some(format!("Test Product {}", id)),
        serial_number: Some(format!("SN{:06}", id)),
        interfaces,
    }
}

/// Receipt printer: printer-class interface with bulk OUT 0x01 and bulk IN 0x81
pub fn create_mock_printer(id: u32) -> DeviceInfo {
    create_mock_device_info(
        id,
        0x0416,
        0x5011,
        vec![create_mock_interface(
            0,
            USB_CLASS_PRINTER,
            vec![bulk_out(0x01), bulk_in(0x81)],
        )],
    )
}

/// Mass storage device: has a bulk OUT endpoint but is not printer-like
pub fn create_mock_mass_storage_device(id: u32) -> DeviceInfo {
    create_mock_device_info(
        id,
        0x0781,
        0x5581,
        vec![create_mock_interface(0, 0x08, vec![bulk_in(0x81), bulk_out(0x02)])],
    )
}

/// HID device (keyboard/mouse)
pub fn create_mock_hid_device(id: u32) -> DeviceInfo {
    create_mock_device_info(
        id,
        0x046d,
        0xc52b,
        vec![create_mock_interface(0, 0x03, vec![interrupt_in(0x81)])],
    )
}

// ============================================================================
// Mock USB host
// ============================================================================

/// How the mock host answers permission questions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionBehavior {
    /// Permission is already held
    Granted,
    /// Granted synchronously when requested
    GrantOnRequest,
    /// Granted from another thread after the given delay
    GrantAfter(Duration),
    /// Denied synchronously when requested
    DenyOnRequest,
    /// Never answered, never granted
    Never,
}

/// One attempted bulk transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub endpoint: u8,
    pub data: Vec<u8>,
    pub timeout: Duration,
    pub succeeded: bool,
}

/// Internal, inspectable mock state
#[derive(Debug)]
pub struct MockState {
    pub devices: Vec<DeviceInfo>,
    pub unavailable: bool,
    pub permission: PermissionBehavior,
    pub granted: bool,
    pub permission_requests: usize,
    pub open_error: Option<HostError>,
    pub claim_error: Option<HostError>,
    /// Failures keyed by transfer attempt index (0-based, over the host's lifetime)
    pub transfer_errors: HashMap<usize, HostError>,
    /// Panic inside `open` (exercises worker panic isolation)
    pub panic_on_open: bool,
    pub list_calls: usize,
    pub opens: usize,
    pub closes: usize,
    pub claims: Vec<(u8, bool)>,
    pub transfers: Vec<RecordedTransfer>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            unavailable: false,
            permission: PermissionBehavior::Granted,
            granted: true,
            permission_requests: 0,
            open_error: None,
            claim_error: None,
            transfer_errors: HashMap::new(),
            panic_on_open: false,
            list_calls: 0,
            opens: 0,
            closes: 0,
            claims: Vec::new(),
            transfers: Vec::new(),
        }
    }
}

/// Scriptable [`UsbHost`]
///
/// Clones share state, so a test can keep one clone for inspection while the
/// print worker owns another.
#[derive(Debug, Clone, Default)]
pub struct MockUsbHost {
    state: Arc<Mutex<MockState>>,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with the given devices and permission already granted
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        let host = Self::new();
        host.state().devices = devices;
        host
    }

    /// Lock the shared state for scripting or inspection
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script permission handling
    pub fn set_permission(&self, behavior: PermissionBehavior) {
        let mut state = self.state();
        state.permission = behavior;
        state.granted = behavior == PermissionBehavior::Granted;
    }

    /// Make `list_devices` fail as if no USB subsystem existed
    pub fn set_unavailable(&self) {
        self.state().unavailable = true;
    }

    /// Make `open` fail
    pub fn fail_open(&self, error: HostError) {
        self.state().open_error = Some(error);
    }

    /// Make `claim_interface` fail
    pub fn fail_claim(&self, error: HostError) {
        self.state().claim_error = Some(error);
    }

    /// Make the `index`-th transfer attempt fail
    pub fn fail_transfer(&self, index: usize, error: HostError) {
        self.state().transfer_errors.insert(index, error);
    }

    /// Data of the transfers that succeeded, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state()
            .transfers
            .iter()
            .filter(|t| t.succeeded)
            .map(|t| t.data.clone())
            .collect()
    }

    /// Every attempted transfer, in order
    pub fn attempts(&self) -> Vec<RecordedTransfer> {
        self.state().transfers.clone()
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }
}

impl UsbHost for MockUsbHost {
    type Connection = MockConnection;

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, HostError> {
        let mut state = self.state();
        state.list_calls += 1;

        if state.unavailable {
            return Err(HostError::Unavailable("mock host disabled".to_string()));
        }
        Ok(state.devices.clone())
    }

    fn has_permission(&self, _device: &DeviceInfo) -> bool {
        self.state().granted
    }

    fn request_permission(&self, _device: &DeviceInfo, signal: PermissionSignal) {
        let behavior = {
            let mut state = self.state();
            state.permission_requests += 1;
            state.permission
        };

        match behavior {
            PermissionBehavior::Granted | PermissionBehavior::GrantOnRequest => {
                self.state().granted = true;
                signal.resolve(true);
            }
            PermissionBehavior::GrantAfter(delay) => {
                let state = self.state.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    state.lock().unwrap_or_else(PoisonError::into_inner).granted = true;
                    signal.resolve(true);
                });
            }
            PermissionBehavior::DenyOnRequest => signal.resolve(false),
            PermissionBehavior::Never => {}
        }
    }

    fn open(&self, _device: &DeviceInfo) -> Result<Self::Connection, HostError> {
        let mut state = self.state();

        if state.panic_on_open {
            drop(state);
            panic!("mock host panicked in open");
        }
        if let Some(error) = state.open_error.clone() {
            return Err(error);
        }

        state.opens += 1;
        Ok(MockConnection {
            state: self.state.clone(),
        })
    }
}

/// Connection handed out by [`MockUsbHost`]
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceConnection for MockConnection {
    fn claim_interface(
        &mut self,
        interface: &InterfaceInfo,
        force: bool,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if let Some(error) = state.claim_error.clone() {
            return Err(error);
        }
        state.claims.push((interface.number, force));
        Ok(())
    }

    fn bulk_transfer(
        &mut self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, HostError> {
        let mut state = self.state();
        let index = state.transfers.len();
        let error = state.transfer_errors.get(&index).cloned();

        state.transfers.push(RecordedTransfer {
            endpoint: endpoint.address,
            data: data.to_vec(),
            timeout,
            succeeded: error.is_none(),
        });

        match error {
            Some(error) => Err(error),
            None => Ok(data.len()),
        }
    }

    fn close(&mut self) {
        self.state().closes += 1;
    }
}

// ============================================================================
// Recording notifier
// ============================================================================

/// [`Notifier`] that records every message
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier that records and then reports a failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) -> crate::Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());

        if self.fail {
            return Err(crate::Error::Notify("notification service down".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Async helpers
// ============================================================================

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
