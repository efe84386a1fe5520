//! Common utilities for usb-receipt-print
//!
//! This crate provides the plumbing shared by the print transport and its
//! tests: the USB host capability traits, the channel bridge feeding the
//! print worker thread, completion contexts that carry outcomes back to the
//! caller, the notifier seam, error handling and logging setup.

pub mod channel;
pub mod completion;
pub mod error;
pub mod logging;
pub mod notify;
pub mod test_utils;
pub mod usb_types;

pub use channel::{PrintBridge, PrintCommand, PrintWorker, Reply, create_print_bridge};
pub use completion::{
    CompletionContext, CompletionLoop, CompletionQueue, Task, TokioCompletion, completion_queue,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use notify::Notifier;
pub use usb_types::{DeviceConnection, HostError, PermissionSignal, UsbHost};
