//! Permission gate
//!
//! Makes sure the process may open the selected printer, asking the host for
//! access and waiting a bounded time for the answer.

use common::{PermissionSignal, UsbHost};
use protocol::DeviceInfo;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default wait for a permission grant
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default interval between permission re-checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bounded permission acquisition
#[derive(Debug, Clone, Copy)]
pub struct PermissionGate {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_PERMISSION_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl PermissionGate {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            // A zero interval would spin
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Ensure `host` grants access to `device`
    ///
    /// Returns immediately when access is already held. Otherwise requests it
    /// and waits on the grant signal in poll-interval slices, re-checking
    /// `has_permission` after each slice, until granted, answered, or the
    /// timeout elapses. Returns the final grant state.
    pub fn ensure_permission<H: UsbHost>(&self, host: &H, device: &DeviceInfo) -> bool {
        if host.has_permission(device) {
            return true;
        }

        debug!("Requesting USB permission for {}", device.label());
        let signal = PermissionSignal::new();
        host.request_permission(device, signal.clone());

        let deadline = Instant::now() + self.timeout;
        loop {
            if host.has_permission(device) {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let slice = self.poll_interval.min(deadline - now);
            if let Some(answer) = signal.wait_timeout(slice) {
                debug!("Permission answer received: granted={}", answer);
                break;
            }
        }

        let granted = host.has_permission(device);
        if !granted {
            warn!(
                "USB permission not granted for {} within {:?}",
                device.label(),
                self.timeout
            );
        }
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{MockUsbHost, PermissionBehavior, create_mock_printer};

    fn host_with(behavior: PermissionBehavior) -> MockUsbHost {
        let host = MockUsbHost::with_devices(vec![create_mock_printer(1)]);
        host.set_permission(behavior);
        host
    }

    #[test]
    fn test_already_granted_is_immediate() {
        let host = host_with(PermissionBehavior::Granted);
        let start = Instant::now();

        assert!(PermissionGate::default().ensure_permission(&host, &create_mock_printer(1)));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(host.state().permission_requests, 0);
    }

    #[test]
    fn test_never_granted_waits_full_timeout() {
        let host = host_with(PermissionBehavior::Never);
        let gate = PermissionGate::default();
        let start = Instant::now();

        assert!(!gate.ensure_permission(&host, &create_mock_printer(1)));

        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_PERMISSION_TIMEOUT);
        // Poll interval plus scheduling slack
        assert!(elapsed <= DEFAULT_PERMISSION_TIMEOUT + DEFAULT_POLL_INTERVAL * 2);
        assert_eq!(host.state().permission_requests, 1);
    }

    #[test]
    fn test_grant_on_request() {
        let host = host_with(PermissionBehavior::GrantOnRequest);
        assert!(PermissionGate::default().ensure_permission(&host, &create_mock_printer(1)));
    }

    #[test]
    fn test_delayed_grant_wakes_gate_early() {
        let host = host_with(PermissionBehavior::GrantAfter(Duration::from_millis(100)));
        let start = Instant::now();

        assert!(PermissionGate::default().ensure_permission(&host, &create_mock_printer(1)));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn test_denial_returns_without_waiting_out_timeout() {
        let host = host_with(PermissionBehavior::DenyOnRequest);
        let start = Instant::now();

        assert!(!PermissionGate::default().ensure_permission(&host, &create_mock_printer(1)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_short_timeout() {
        let host = host_with(PermissionBehavior::Never);
        let gate = PermissionGate::new(Duration::from_millis(120), Duration::from_millis(50));
        let start = Instant::now();

        assert!(!gate.ensure_permission(&host, &create_mock_printer(1)));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
