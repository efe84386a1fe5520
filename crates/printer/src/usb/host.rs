//! rusb-backed USB host
//!
//! Enumerates devices through libusb and hands out [`RusbConnection`]s.
//! libusb has no permission dialog: access is whatever the OS (udev rules,
//! group membership) allows, so a permission request is only logged.

use common::{DeviceConnection, HostError, PermissionSignal, UsbHost};
use protocol::{DeviceId, DeviceInfo, Direction, EndpointInfo, InterfaceInfo, TransferKind};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Linux Foundation vendor id used by root hubs
const ROOT_HUB_VENDOR: u16 = 0x1d6b;
const USB_CLASS_HUB: u8 = 0x09;

/// Map rusb errors to host errors
pub fn map_rusb_error(err: rusb::Error) -> HostError {
    match err {
        rusb::Error::Timeout => HostError::Timeout,
        rusb::Error::Pipe => HostError::Pipe,
        rusb::Error::NoDevice => HostError::NoDevice,
        rusb::Error::NotFound => HostError::NotFound,
        rusb::Error::Busy => HostError::Busy,
        rusb::Error::Io => HostError::Io,
        rusb::Error::Access => HostError::Access,
        _ => HostError::Other(err.to_string()),
    }
}

/// Stable id for a device within one enumeration
pub fn device_id(bus: u8, address: u8) -> DeviceId {
    DeviceId(((bus as u32) << 8) | address as u32)
}

/// [`UsbHost`] backed by a libusb context
///
/// Keeps the devices seen by the last `list_devices` call so the worker can
/// open what it selected. Nothing survives beyond the next enumeration.
pub struct RusbHost {
    context: Option<Context>,
    snapshot: RefCell<HashMap<DeviceId, Device<Context>>>,
}

impl RusbHost {
    /// Create the host; a missing libusb backend is reported on first use
    pub fn new() -> Self {
        let context = match Context::new() {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("USB subsystem not available: {}", e);
                None
            }
        };

        Self {
            context,
            snapshot: RefCell::new(HashMap::new()),
        }
    }

    fn lookup(&self, device: &DeviceInfo) -> Result<Device<Context>, HostError> {
        self.snapshot
            .borrow()
            .get(&device.id)
            .cloned()
            .ok_or(HostError::NotFound)
    }

    fn describe(&self, device: &Device<Context>) -> Result<DeviceInfo, rusb::Error> {
        let descriptor = device.device_descriptor()?;
        let bus_number = device.bus_number();
        let device_address = device.address();

        let config = device
            .active_config_descriptor()
            .or_else(|_| device.config_descriptor(0))?;

        let interfaces = config
            .interfaces()
            .flat_map(|interface| interface.descriptors())
            .map(|desc| InterfaceInfo {
                number: desc.interface_number(),
                alternate_setting: desc.setting_number(),
                class: desc.class_code(),
                subclass: desc.sub_class_code(),
                protocol: desc.protocol_code(),
                endpoints: desc
                    .endpoint_descriptors()
                    .map(|ep| EndpointInfo {
                        address: ep.address(),
                        transfer_type: map_transfer_type(ep.transfer_type()),
                        direction: map_direction(ep.direction()),
                        max_packet_size: ep.max_packet_size(),
                    })
                    .collect(),
            })
            .collect();

        // String descriptors need an open handle; skip them when access is denied
        let (manufacturer, product, serial_number) = match device.open() {
            Ok(handle) => (
                read_string(&handle, descriptor.manufacturer_string_index()),
                read_string(&handle, descriptor.product_string_index()),
                read_string(&handle, descriptor.serial_number_string_index()),
            ),
            Err(_) => (None, None, None),
        };

        Ok(DeviceInfo {
            id: device_id(bus_number, device_address),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number,
            device_address,
            manufacturer,
            product,
            serial_number,
            interfaces,
        })
    }
}

impl Default for RusbHost {
    fn default() -> Self {
        Self::new()
    }
}

fn read_string(handle: &DeviceHandle<Context>, index: Option<u8>) -> Option<String> {
    index.and_then(|idx| handle.read_string_descriptor_ascii(idx).ok())
}

fn map_transfer_type(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

fn map_direction(direction: rusb::Direction) -> Direction {
    match direction {
        rusb::Direction::In => Direction::In,
        rusb::Direction::Out => Direction::Out,
    }
}

impl UsbHost for RusbHost {
    type Connection = RusbConnection;

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, HostError> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| HostError::Unavailable("libusb context not initialized".into()))?;
        let devices = context.devices().map_err(map_rusb_error)?;

        let mut snapshot = self.snapshot.borrow_mut();
        snapshot.clear();

        let mut infos = Vec::new();
        for device in devices.iter() {
            // Skip root hubs
            if let Ok(desc) = device.device_descriptor()
                && desc.vendor_id() == ROOT_HUB_VENDOR
                && desc.class_code() == USB_CLASS_HUB
            {
                continue;
            }

            match self.describe(&device) {
                Ok(info) => {
                    snapshot.insert(info.id, device);
                    infos.push(info);
                }
                Err(e) => warn!(
                    "Failed to read descriptors: bus={}, addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        debug!("Enumerated {} devices", infos.len());
        Ok(infos)
    }

    fn has_permission(&self, device: &DeviceInfo) -> bool {
        let Ok(usb_device) = self.lookup(device) else {
            return false;
        };

        // Only an access error means "no permission"; anything else surfaces at open
        !matches!(usb_device.open(), Err(rusb::Error::Access))
    }

    fn request_permission(&self, device: &DeviceInfo, _signal: PermissionSignal) {
        info!(
            "No access to {}: grant it with a udev rule or group membership",
            device.label()
        );
    }

    fn open(&self, device: &DeviceInfo) -> Result<Self::Connection, HostError> {
        let handle = self.lookup(device)?.open().map_err(map_rusb_error)?;
        debug!("Opened {}", device.label());

        Ok(RusbConnection {
            handle: Some(handle),
            claimed: None,
            detached: None,
        })
    }
}

/// Open libusb device handle
pub struct RusbConnection {
    handle: Option<DeviceHandle<Context>>,
    claimed: Option<u8>,
    /// Interface whose kernel driver we detached
    detached: Option<u8>,
}

impl RusbConnection {
    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>, HostError> {
        self.handle.as_mut().ok_or(HostError::NoDevice)
    }
}

impl DeviceConnection for RusbConnection {
    fn claim_interface(&mut self, interface: &InterfaceInfo, force: bool) -> Result<(), HostError> {
        let number = interface.number;
        let handle = self.handle_mut()?;

        let mut detached = None;
        if force {
            match handle.kernel_driver_active(number) {
                Ok(true) => {
                    debug!("Detaching kernel driver from interface {}", number);
                    match handle.detach_kernel_driver(number) {
                        Ok(()) => detached = Some(number),
                        Err(e) => warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            number, e
                        ),
                    }
                }
                Ok(false) => debug!("No kernel driver active on interface {}", number),
                Err(e) => debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    number, e
                ),
            }
        }

        let claimed = handle.claim_interface(number).map_err(map_rusb_error);
        if claimed.is_ok()
            && interface.alternate_setting != 0
            && let Err(e) = handle.set_alternate_setting(number, interface.alternate_setting)
        {
            warn!(
                "Failed to select alternate setting {} on interface {}: {}",
                interface.alternate_setting, number, e
            );
        }

        self.detached = detached;
        claimed?;
        self.claimed = Some(number);
        Ok(())
    }

    fn bulk_transfer(
        &mut self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, HostError> {
        self.handle_mut()?
            .write_bulk(endpoint.address, data, timeout)
            .map_err(map_rusb_error)
    }

    fn close(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        if let Some(number) = self.claimed.take()
            && let Err(e) = handle.release_interface(number)
        {
            warn!("Failed to release interface {}: {}", number, e);
        }

        if let Some(number) = self.detached.take() {
            match handle.attach_kernel_driver(number) {
                Ok(()) => debug!("Reattached kernel driver to interface {}", number),
                Err(e) => debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    number, e
                ),
            }
        }
        // Dropping the handle closes the device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), HostError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), HostError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), HostError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::Access), HostError::Access);
        assert!(matches!(
            map_rusb_error(rusb::Error::Overflow),
            HostError::Other(_)
        ));
    }

    #[test]
    fn test_device_id_from_bus_and_address() {
        assert_eq!(device_id(1, 5), DeviceId(0x0105));
        assert_ne!(device_id(2, 1), device_id(1, 2));
    }

    #[test]
    fn test_descriptor_mapping() {
        assert_eq!(map_transfer_type(rusb::TransferType::Bulk), TransferKind::Bulk);
        assert_eq!(map_direction(rusb::Direction::Out), Direction::Out);
    }

    #[test]
    fn test_rusb_host_enumeration() {
        // May fail without a libusb backend or USB access
        let host = RusbHost::new();
        match host.list_devices() {
            Ok(devices) => {
                for device in &devices {
                    assert_eq!(device.id, device_id(device.bus_number, device.device_address));
                }
            }
            Err(e) => eprintln!("USB enumeration unavailable (expected in CI): {}", e),
        }
    }

    #[test]
    fn test_open_unknown_device_is_not_found() {
        let host = RusbHost::new();
        let device = DeviceInfo {
            id: DeviceId(u32::MAX),
            vendor_id: 0,
            product_id: 0,
            bus_number: 0,
            device_address: 0,
            manufacturer: None,
            product: None,
            serial_number: None,
            interfaces: vec![],
        };

        assert!(matches!(host.open(&device), Err(HostError::NotFound)));
        assert!(!host.has_permission(&device));
    }
}
