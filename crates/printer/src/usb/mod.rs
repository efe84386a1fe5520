//! USB printer transport
//!
//! Everything here runs on the print worker thread:
//! - Device selection and interface/endpoint resolution
//! - Bounded permission acquisition
//! - The bulk transfer session
//! - The rusb-backed host used in production

pub mod host;
pub mod manager;
pub mod permission;
pub mod selector;
pub mod transfers;
pub mod worker;

pub use host::{RusbConnection, RusbHost, map_rusb_error};
pub use manager::PrinterManager;
pub use permission::PermissionGate;
pub use selector::{DeviceFilter, find_endpoint, find_interface, is_printer_like, select_printer};
pub use transfers::{Session, TransferTimeouts};
pub use worker::{PrintWorkerThread, spawn_print_worker};
