//! USB host capability abstractions
//!
//! The print transport never calls a USB library directly. It talks to a
//! [`UsbHost`], which enumerates devices, answers permission questions and
//! opens [`DeviceConnection`]s. The production host is backed by rusb; tests
//! use [`crate::test_utils::MockUsbHost`].

use protocol::{DeviceInfo, EndpointInfo, InterfaceInfo};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a USB host or connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("USB subsystem unavailable: {0}")]
    Unavailable(String),

    #[error("Access denied (insufficient permissions)")]
    Access,

    #[error("Entity not found")]
    NotFound,

    #[error("Resource busy")]
    Busy,

    #[error("Operation timed out")]
    Timeout,

    #[error("Pipe error")]
    Pipe,

    #[error("No such device (it may have been disconnected)")]
    NoDevice,

    #[error("Input/Output Error")]
    Io,

    #[error("{0}")]
    Other(String),
}

/// Host USB subsystem
///
/// One host instance is owned by the print worker thread; calls are never
/// concurrent.
pub trait UsbHost: Send + 'static {
    /// Connection type returned by [`UsbHost::open`]
    type Connection: DeviceConnection;

    /// Enumerate attached devices, in whatever order the OS reports them
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, HostError>;

    /// Whether the process may currently open `device`
    fn has_permission(&self, device: &DeviceInfo) -> bool;

    /// Ask the platform for access to `device`
    ///
    /// Returns immediately. A host that learns the answer calls
    /// [`PermissionSignal::resolve`]; hosts without such an event may leave
    /// the signal untouched.
    fn request_permission(&self, device: &DeviceInfo, signal: PermissionSignal);

    /// Open `device` for I/O
    fn open(&self, device: &DeviceInfo) -> Result<Self::Connection, HostError>;
}

/// An open device
pub trait DeviceConnection {
    /// Claim `interface`, detaching a kernel driver first when `force` is set
    fn claim_interface(&mut self, interface: &InterfaceInfo, force: bool)
    -> Result<(), HostError>;

    /// Blocking bulk OUT transfer; returns the number of bytes written
    fn bulk_transfer(
        &mut self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, HostError>;

    /// Release the claim and close the device
    fn close(&mut self);
}

/// One-shot answer to a permission request
///
/// Cloned into the host's request; the permission gate waits on it.
#[derive(Debug, Clone, Default)]
pub struct PermissionSignal {
    inner: Arc<(Mutex<Option<bool>>, Condvar)>,
}

impl PermissionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the platform's answer and wake any waiter
    pub fn resolve(&self, granted: bool) {
        let (state, cond) = &*self.inner;
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = Some(granted);
        cond.notify_all();
    }

    /// The answer, if one has arrived
    pub fn state(&self) -> Option<bool> {
        let (state, _) = &*self.inner;
        *state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for an answer
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let (state, cond) = &*self.inner;
        let guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cond
            .wait_timeout_while(guard, timeout, |answer| answer.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
