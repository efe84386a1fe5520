//! Print error taxonomy

use std::fmt;
use thiserror::Error;

/// Stage of the transfer session that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Printer reset sent ahead of a raw payload
    Reset,
    /// The payload itself (encoded text or raw bytes)
    Payload,
    /// Line feed, paper feed and cut sent after the payload
    Finalize,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Reset => "reset",
            TransferStage::Payload => "data",
            TransferStage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Terminal failure of one print operation
///
/// None of these are retried. The display strings double as the
/// user-facing outcome messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintError {
    /// The host USB subsystem could not be reached
    #[error("USB manager not available")]
    NoUsbSubsystem,

    /// No attached device exposes a printer-like interface
    #[error("No USB printer detected")]
    NoDeviceFound,

    /// Access to the device was not granted before the deadline
    #[error("USB permission denied")]
    PermissionDenied,

    /// The selected device has no printer interface or no bulk OUT endpoint
    #[error("Printer interface/endpoints not found")]
    InterfaceNotFound,

    /// Opening the device failed
    #[error("Failed to open USB device: {0}")]
    OpenFailed(String),

    /// Claiming the printer interface failed
    #[error("Failed to claim interface {interface}: {reason}")]
    ClaimFailed { interface: u8, reason: String },

    /// A bulk transfer reported a failure
    #[error("bulkTransfer {stage} failed: {reason}")]
    TransferFailed {
        stage: TransferStage,
        reason: String,
    },

    /// The print queue did not accept the job
    #[error("Print worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The worker caught a panic while running the job
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrintError {
    /// Whether this failure should also be surfaced through the notifier
    ///
    /// Only failures inside the transfer session notify; guard failures
    /// (no device, no permission, no interface, open, claim) do not.
    pub fn notifies(&self) -> bool {
        matches!(
            self,
            PrintError::TransferFailed { .. } | PrintError::Internal(_)
        )
    }

    /// The transfer stage, if this is a transfer failure
    pub fn stage(&self) -> Option<TransferStage> {
        match self {
            PrintError::TransferFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Type alias for print results
pub type Result<T> = std::result::Result<T, PrintError>;
