//! USB receipt printing
//!
//! Finds an attached ESC/POS receipt printer, acquires it and streams print
//! jobs to its bulk OUT endpoint on a single background worker.
//!
//! ```no_run
//! use common::TokioCompletion;
//! use printer::{PrintService, config::PrinterConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let config = PrinterConfig::load_or_default();
//! let service = PrintService::from_config(&config, Arc::new(TokioCompletion::current()));
//!
//! service.print_text("HELLO", |success, message| {
//!     println!("{}: {}", success, message);
//! });
//! # }
//! ```

pub mod config;
pub mod notifier;
pub mod service;
pub mod usb;

pub use notifier::{CommandNotifier, LogNotifier};
pub use service::PrintService;
