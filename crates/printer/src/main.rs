//! usb-receipt-print
//!
//! Sends text or raw ESC/POS bytes to the first USB receipt printer found.

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use common::{TokioCompletion, setup_logging};
use printer::PrintService;
use printer::config::{self, PrinterConfig};
use printer::usb::is_printer_like;
use protocol::PrintRequest;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-receipt-print")]
#[command(author, version, about = "Print to a USB ESC/POS receipt printer")]
#[command(long_about = "
Finds the first attached USB receipt printer (printer-class or vendor-specific
interface with a bulk OUT endpoint) and sends it a print job.

EXAMPLES:
    # Print a line of text, then feed and cut
    usb-receipt-print --text \"Hello\"

    # Send a prepared ESC/POS file
    usb-receipt-print --file receipt.bin

    # Pipe raw bytes
    cat receipt.bin | usb-receipt-print --stdin

    # Show attached devices
    usb-receipt-print --list-devices

CONFIGURATION:
    Configuration files are searched in the following order:
    1. Path specified with --config
    2. ~/.config/usb-receipt-print/config.toml
    3. /etc/usb-receipt-print/config.toml
    4. Built-in defaults
")]
#[command(group(ArgGroup::new("job").args(["text", "file", "stdin"])))]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Print the device list as JSON
    #[arg(long, requires = "list_devices")]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Text to print (CP858, followed by feed and cut)
    #[arg(short, long, value_name = "TEXT")]
    text: Option<String>,

    /// File with raw ESC/POS bytes
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Read raw ESC/POS bytes from stdin
    #[arg(long)]
    stdin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = PrinterConfig::default();
        let path = PrinterConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        PrinterConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-receipt-print v{}", env!("CARGO_PKG_VERSION"));

    // Read the job before starting the worker so input errors leave USB untouched
    let request = if args.list_devices {
        None
    } else {
        Some(read_request(&args)?)
    };

    let service = PrintService::from_config(&config, Arc::new(TokioCompletion::current()));

    let result = match request {
        None => list_devices_mode(&service, &config, args.json).await,
        Some(request) => print_mode(&service, request).await,
    };

    if let Err(e) = tokio::task::spawn_blocking(move || service.shutdown()).await {
        error!("Error shutting down print worker: {}", e);
    }

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => Err(e),
    }
}

fn read_request(args: &Args) -> Result<PrintRequest> {
    if let Some(text) = &args.text {
        return Ok(PrintRequest::Text(text.clone()));
    }

    if let Some(path) = &args.file {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok(PrintRequest::Raw(data));
    }

    if args.stdin {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read stdin")?;
        return Ok(PrintRequest::Raw(data));
    }

    bail!("Nothing to print: pass --text, --file or --stdin")
}

/// Run one job; `Ok(false)` means the printer reported a failure
async fn print_mode(service: &PrintService, request: PrintRequest) -> Result<bool> {
    let outcome = service.print(request).await;

    if outcome.success {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
    Ok(outcome.success)
}

/// List USB devices and exit
async fn list_devices_mode(
    service: &PrintService,
    config: &PrinterConfig,
    json: bool,
) -> Result<bool> {
    let devices = service
        .list_devices()
        .await
        .context("Failed to list USB devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(true);
    }

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(true);
    }

    let filter = config.device_filter();
    println!("Found {} USB device(s):\n", devices.len());
    for device in &devices {
        let mut tags = Vec::new();
        if is_printer_like(device) {
            tags.push("printer");
        }
        if !filter.allows(device) {
            tags.push("filtered out");
        }

        println!(
            "  [{}] {:04x}:{:04x} - {} {}{}",
            device.id.0,
            device.vendor_id,
            device.product_id,
            device
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product.as_deref().unwrap_or("Unknown Product"),
            if tags.is_empty() {
                String::new()
            } else {
                format!(" ({})", tags.join(", "))
            }
        );
        println!(
            "      Bus {:03} Device {:03}",
            device.bus_number, device.device_address
        );
        if let Some(serial) = &device.serial_number {
            println!("      Serial: {}", serial);
        }
        for interface in &device.interfaces {
            println!(
                "      Interface {} alt {}: class {:#04x}, {} endpoint(s)",
                interface.number,
                interface.alternate_setting,
                interface.class,
                interface.endpoints.len()
            );
        }
        println!();
    }

    Ok(true)
}
