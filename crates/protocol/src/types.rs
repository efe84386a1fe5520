//! USB descriptor model and print request types
//!
//! The device selector never touches a live USB handle. Hosts describe each
//! attached device with a [`DeviceInfo`] snapshot, and every selection
//! decision is made on that snapshot.

use crate::error::PrintError;
use serde::{Deserialize, Serialize};

/// USB interface class code for printers
pub const USB_CLASS_PRINTER: u8 = 0x07;

/// USB interface class code for vendor-specific interfaces
pub const USB_CLASS_VENDOR_SPEC: u8 = 0xFF;

/// Host-assigned device identifier
///
/// Only meaningful within one enumeration; devices are re-enumerated on every
/// print call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    /// Transfer type
    pub transfer_type: TransferKind,
    /// Direction
    pub direction: Direction,
    /// Maximum packet size
    pub max_packet_size: u16,
}

impl EndpointInfo {
    /// Whether this is a bulk endpoint writing to the device
    pub fn is_bulk_out(&self) -> bool {
        self.transfer_type == TransferKind::Bulk && self.direction == Direction::Out
    }
}

/// Interface descriptor (one alternate setting)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Interface number (bInterfaceNumber)
    pub number: u8,
    /// Alternate setting (bAlternateSetting)
    pub alternate_setting: u8,
    /// Interface class code
    pub class: u8,
    /// Interface subclass code
    pub subclass: u8,
    /// Interface protocol code
    pub protocol: u8,
    /// Endpoints in descriptor order
    pub endpoints: Vec<EndpointInfo>,
}

impl InterfaceInfo {
    /// Class is Printer or Vendor-Specific
    pub fn is_printer_class(&self) -> bool {
        self.class == USB_CLASS_PRINTER || self.class == USB_CLASS_VENDOR_SPEC
    }

    /// First bulk OUT endpoint, in descriptor order
    pub fn bulk_out_endpoint(&self) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|ep| ep.is_bulk_out())
    }
}

/// Device snapshot taken during enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Host-assigned identifier
    pub id: DeviceId,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string (if readable)
    pub manufacturer: Option<String>,
    /// Product string (if readable)
    pub product: Option<String>,
    /// Serial number string (if readable)
    pub serial_number: Option<String>,
    /// Interfaces of the active configuration, in descriptor order
    pub interfaces: Vec<InterfaceInfo>,
}

impl DeviceInfo {
    /// Short human-readable label used in logs
    pub fn label(&self) -> String {
        match &self.product {
            Some(product) => format!(
                "{:04x}:{:04x} ({})",
                self.vendor_id, self.product_id, product
            ),
            None => format!("{:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

/// What a print request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Text,
    Raw,
}

/// A single print job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintRequest {
    /// Free-form text, encoded to CP858 before transfer
    Text(String),
    /// Bytes already in printer language
    Raw(Vec<u8>),
}

impl PrintRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            PrintRequest::Text(_) => RequestKind::Text,
            PrintRequest::Raw(_) => RequestKind::Raw,
        }
    }
}

/// Terminal result of a print request, delivered exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    /// Structured failure; `None` on success
    pub error: Option<PrintError>,
}

impl Outcome {
    /// Successful outcome for the given request kind
    pub fn printed(kind: RequestKind) -> Self {
        let message = match kind {
            RequestKind::Text => "USB printed successfully",
            RequestKind::Raw => "USB bytes printed",
        };

        Self {
            success: true,
            message: message.to_string(),
            error: None,
        }
    }

    /// Failed outcome for the given request kind
    ///
    /// Session failures are prefixed with the request kind, guard failures
    /// carry their own message.
    pub fn failed(kind: RequestKind, error: PrintError) -> Self {
        let message = if error.notifies() {
            match kind {
                RequestKind::Text => format!("USB printing failed: {}", error),
                RequestKind::Raw => format!("USB bytes failed: {}", error),
            }
        } else {
            error.to_string()
        };

        Self {
            success: false,
            message,
            error: Some(error),
        }
    }
}
