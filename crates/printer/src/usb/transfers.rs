//! Transfer engine
//!
//! Opens the printer, claims its interface and streams the job as a short
//! sequence of bulk OUT transfers. The connection is owned by a [`Session`]
//! guard, so it is closed exactly once on every path past a successful open.

use common::{DeviceConnection, HostError, Notifier, UsbHost};
use protocol::{
    DeviceInfo, EndpointInfo, InterfaceInfo, Outcome, PrintError, PrintRequest, TransferStage,
    cp858, escpos,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call bulk transfer timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTimeouts {
    /// Encoded text payload
    pub payload: Duration,
    /// Raw byte payload
    pub raw: Duration,
    /// Reset, line feed, feed and cut commands
    pub control: Duration,
}

impl Default for TransferTimeouts {
    fn default() -> Self {
        Self {
            payload: Duration::from_millis(1000),
            raw: Duration::from_millis(2000),
            control: Duration::from_millis(500),
        }
    }
}

/// An open, exclusively owned device connection
///
/// Dropping the session closes the connection.
pub struct Session<C: DeviceConnection> {
    connection: C,
    endpoint: EndpointInfo,
}

impl<C: DeviceConnection> Session<C> {
    pub fn new(connection: C, endpoint: EndpointInfo) -> Self {
        Self {
            connection,
            endpoint,
        }
    }

    /// Claim `interface`, detaching any kernel driver
    pub fn claim(&mut self, interface: &InterfaceInfo) -> Result<(), HostError> {
        self.connection.claim_interface(interface, true)?;
        debug!("Claimed interface {}", interface.number);
        Ok(())
    }

    /// One bulk OUT transfer on the session endpoint
    ///
    /// A short write is logged but not treated as a failure.
    pub fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize, HostError> {
        debug!(
            "bulkTransfer ep={:#04x} len={} timeout={:?}",
            self.endpoint.address,
            data.len(),
            timeout
        );

        let written = self.connection.bulk_transfer(&self.endpoint, data, timeout)?;
        if written < data.len() {
            warn!(
                "Short bulk write on ep {:#04x}: {} of {} bytes",
                self.endpoint.address,
                written,
                data.len()
            );
        }
        Ok(written)
    }

    fn write_stage(
        &mut self,
        data: &[u8],
        timeout: Duration,
        stage: TransferStage,
    ) -> protocol::Result<usize> {
        self.write(data, timeout)
            .map_err(|e| PrintError::TransferFailed {
                stage,
                reason: e.to_string(),
            })
    }
}

impl<C: DeviceConnection> Drop for Session<C> {
    fn drop(&mut self) {
        self.connection.close();
        debug!("USB connection closed");
    }
}

/// Run one print job against `device`
///
/// Failures inside the claimed session are reported to `notifier` before the
/// connection is released. Open and claim failures are returned without a
/// notification.
pub fn execute<H: UsbHost>(
    host: &H,
    device: &DeviceInfo,
    interface: &InterfaceInfo,
    endpoint: &EndpointInfo,
    request: &PrintRequest,
    timeouts: &TransferTimeouts,
    notifier: &dyn Notifier,
) -> protocol::Result<()> {
    let connection = host.open(device).map_err(|e| {
        warn!("Failed to open {}: {}", device.label(), e);
        PrintError::OpenFailed(e.to_string())
    })?;
    let mut session = Session::new(connection, endpoint.clone());

    session.claim(interface).map_err(|e| {
        warn!("Failed to claim interface {}: {}", interface.number, e);
        PrintError::ClaimFailed {
            interface: interface.number,
            reason: e.to_string(),
        }
    })?;

    let result = match request {
        PrintRequest::Text(text) => send_text(&mut session, text, timeouts),
        PrintRequest::Raw(data) => send_raw(&mut session, data, timeouts),
    };

    if let Err(e) = &result {
        let message = Outcome::failed(request.kind(), e.clone()).message;
        warn!("{}", message);
        if let Err(notify_err) = notifier.notify_error(&message) {
            warn!("Failed to deliver error notification: {}", notify_err);
        }
    }

    drop(session);
    result
}

/// Text job: encoded payload, then line feed, feed and cut
///
/// A payload failure aborts at once. The three trailing commands are all
/// attempted; the first failure among them is returned afterwards.
fn send_text<C: DeviceConnection>(
    session: &mut Session<C>,
    text: &str,
    timeouts: &TransferTimeouts,
) -> protocol::Result<()> {
    let (bytes, lossy) = cp858::encode(text);
    if lossy {
        debug!("Unmappable characters replaced with '?'");
    }

    session.write_stage(&bytes, timeouts.payload, TransferStage::Payload)?;

    let mut first_error = None;
    for command in [
        &escpos::LINE_FEED[..],
        &escpos::FEED_LINES[..],
        &escpos::FULL_CUT[..],
    ] {
        if let Err(e) = session.write_stage(command, timeouts.control, TransferStage::Finalize) {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!("Printed {} bytes of text", bytes.len());
            Ok(())
        }
    }
}

/// Raw job: best-effort reset, payload, then feed and cut unless the payload
/// already ends with a cut
fn send_raw<C: DeviceConnection>(
    session: &mut Session<C>,
    data: &[u8],
    timeouts: &TransferTimeouts,
) -> protocol::Result<()> {
    if let Err(e) = session.write(&escpos::RESET, timeouts.control) {
        debug!("Printer reset ignored: {}", e);
    }

    session.write_stage(data, timeouts.raw, TransferStage::Payload)?;

    if !escpos::ends_with_cut(data) {
        for command in [&escpos::FEED_LINES[..], &escpos::FULL_CUT[..]] {
            if let Err(e) = session.write(command, timeouts.control) {
                warn!("Trailing feed/cut failed: {}", e);
            }
        }
    }

    info!("Printed {} raw bytes", data.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        MockUsbHost, RecordingNotifier, bulk_out, create_mock_printer,
    };

    fn run(host: &MockUsbHost, request: PrintRequest, notifier: &RecordingNotifier) -> protocol::Result<()> {
        let device = create_mock_printer(1);
        let interface = device.interfaces[0].clone();
        execute(
            host,
            &device,
            &interface,
            &bulk_out(0x01),
            &request,
            &TransferTimeouts::default(),
            notifier,
        )
    }

    fn mock_host() -> MockUsbHost {
        MockUsbHost::with_devices(vec![create_mock_printer(1)])
    }

    #[test]
    fn test_text_sequence_and_timeouts() {
        let host = mock_host();
        let notifier = RecordingNotifier::new();

        run(&host, PrintRequest::Text("HELLO".into()), &notifier).unwrap();

        let attempts = host.attempts();
        let sent: Vec<_> = attempts.iter().map(|t| t.data.clone()).collect();
        assert_eq!(
            sent,
            vec![
                b"HELLO".to_vec(),
                vec![0x0A],
                vec![0x1B, 0x64, 0x02],
                vec![0x1D, 0x56, 0x00],
            ]
        );
        let timeouts: Vec<_> = attempts.iter().map(|t| t.timeout.as_millis()).collect();
        assert_eq!(timeouts, vec![1000, 500, 500, 500]);
        assert!(attempts.iter().all(|t| t.endpoint == 0x01));
        assert_eq!(host.state().claims, vec![(0, true)]);
        assert_eq!(host.closes(), 1);
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_text_encoded_as_cp858() {
        let host = mock_host();
        run(&host, PrintRequest::Text("5 €".into()), &RecordingNotifier::new()).unwrap();
        assert_eq!(host.sent()[0], vec![b'5', b' ', 0xD5]);
    }

    #[test]
    fn test_text_payload_failure_short_circuits() {
        let host = mock_host();
        host.fail_transfer(0, HostError::Timeout);
        let notifier = RecordingNotifier::new();

        let err = run(&host, PrintRequest::Text("HELLO".into()), &notifier).unwrap_err();

        assert_eq!(err.stage(), Some(TransferStage::Payload));
        assert_eq!(host.attempts().len(), 1);
        assert_eq!(host.closes(), 1);
        assert_eq!(
            notifier.messages(),
            vec!["USB printing failed: bulkTransfer data failed: Operation timed out".to_string()]
        );
    }

    #[test]
    fn test_text_finalize_attempts_all_then_fails() {
        let host = mock_host();
        host.fail_transfer(1, HostError::Pipe);
        let notifier = RecordingNotifier::new();

        let err = run(&host, PrintRequest::Text("HELLO".into()), &notifier).unwrap_err();

        assert_eq!(err.stage(), Some(TransferStage::Finalize));
        assert_eq!(host.attempts().len(), 4);
        assert_eq!(host.closes(), 1);
        assert_eq!(notifier.messages().len(), 1);
    }

    #[test]
    fn test_raw_with_cut_sends_two_transfers() {
        let host = mock_host();
        let data = vec![b'A', b'B', 0x1D, 0x56, 0x00];

        run(&host, PrintRequest::Raw(data.clone()), &RecordingNotifier::new()).unwrap();

        assert_eq!(host.sent(), vec![vec![0x1B, 0x40], data]);
        let timeouts: Vec<_> = host.attempts().iter().map(|t| t.timeout.as_millis()).collect();
        assert_eq!(timeouts, vec![500, 2000]);
    }

    #[test]
    fn test_raw_without_cut_appends_feed_and_cut() {
        let host = mock_host();
        run(&host, PrintRequest::Raw(b"receipt".to_vec()), &RecordingNotifier::new()).unwrap();

        assert_eq!(
            host.sent(),
            vec![
                vec![0x1B, 0x40],
                b"receipt".to_vec(),
                vec![0x1B, 0x64, 0x02],
                vec![0x1D, 0x56, 0x00],
            ]
        );
    }

    #[test]
    fn test_raw_reset_and_trailer_failures_ignored() {
        let host = mock_host();
        host.fail_transfer(0, HostError::Timeout);
        host.fail_transfer(2, HostError::Timeout);
        host.fail_transfer(3, HostError::Pipe);
        let notifier = RecordingNotifier::new();

        run(&host, PrintRequest::Raw(b"x".to_vec()), &notifier).unwrap();

        assert_eq!(host.sent(), vec![b"x".to_vec()]);
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_raw_payload_failure() {
        let host = mock_host();
        host.fail_transfer(1, HostError::NoDevice);
        let notifier = RecordingNotifier::new();

        let err = run(&host, PrintRequest::Raw(b"x".to_vec()), &notifier).unwrap_err();

        assert_eq!(err.stage(), Some(TransferStage::Payload));
        assert_eq!(host.attempts().len(), 2);
        assert_eq!(host.closes(), 1);
        assert!(notifier.messages()[0].starts_with("USB bytes failed: "));
    }

    #[test]
    fn test_open_failure_never_closes() {
        let host = mock_host();
        host.fail_open(HostError::Busy);
        let notifier = RecordingNotifier::new();

        let err = run(&host, PrintRequest::Text("x".into()), &notifier).unwrap_err();

        assert!(matches!(err, PrintError::OpenFailed(_)));
        assert_eq!(host.closes(), 0);
        assert!(host.attempts().is_empty());
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_claim_failure_closes_once() {
        let host = mock_host();
        host.fail_claim(HostError::Busy);
        let notifier = RecordingNotifier::new();

        let err = run(&host, PrintRequest::Raw(vec![1]), &notifier).unwrap_err();

        assert_eq!(
            err,
            PrintError::ClaimFailed {
                interface: 0,
                reason: "Resource busy".into()
            }
        );
        assert_eq!(host.opens(), 1);
        assert_eq!(host.closes(), 1);
        assert!(host.attempts().is_empty());
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_notifier_failure_swallowed() {
        let host = mock_host();
        host.fail_transfer(0, HostError::Io);
        let notifier = RecordingNotifier::failing();

        let err = run(&host, PrintRequest::Text("x".into()), &notifier).unwrap_err();
        assert_eq!(err.stage(), Some(TransferStage::Payload));
        assert_eq!(host.closes(), 1);
    }
}
