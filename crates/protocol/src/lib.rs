//! Protocol library for usb-receipt-print
//!
//! This crate defines the data shared by every part of the print pipeline:
//! the USB descriptor model the device selector works on, print requests and
//! their outcomes, the error taxonomy, and the bit-exact ESC/POS bytes sent
//! to the printer.
//!
//! # Example
//!
//! ```
//! use protocol::{cp858, escpos};
//!
//! let (bytes, had_unmappable) = cp858::encode("5 €");
//! assert_eq!(bytes, vec![b'5', b' ', 0xD5]);
//! assert!(!had_unmappable);
//!
//! let mut job = bytes;
//! job.extend_from_slice(&escpos::FULL_CUT);
//! assert!(escpos::ends_with_cut(&job));
//! ```

pub mod cp858;
pub mod error;
pub mod escpos;
pub mod types;

pub use error::{PrintError, Result, TransferStage};
pub use types::{
    DeviceId, DeviceInfo, Direction, EndpointInfo, InterfaceInfo, Outcome, PrintRequest,
    RequestKind, TransferKind, USB_CLASS_PRINTER, USB_CLASS_VENDOR_SPEC,
};
