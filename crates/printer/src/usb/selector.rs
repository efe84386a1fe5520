//! Printer selection
//!
//! Picks the receipt printer out of a fresh enumeration and resolves the
//! interface and bulk OUT endpoint used for the print session.

use protocol::{DeviceInfo, EndpointInfo, InterfaceInfo};
use tracing::debug;

/// True iff one interface is printer or vendor class AND has a bulk OUT endpoint
pub fn is_printer_like(device: &DeviceInfo) -> bool {
    device
        .interfaces
        .iter()
        .any(|intf| intf.is_printer_class() && intf.bulk_out_endpoint().is_some())
}

/// First printer-like device in enumeration order
pub fn select_printer(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    devices.iter().find(|device| is_printer_like(device))
}

/// First printer or vendor class interface
///
/// Scans independently of [`is_printer_like`]: on a device with several
/// printer/vendor interfaces this may return one without a bulk OUT endpoint,
/// in which case [`find_endpoint`] comes back empty.
pub fn find_interface(device: &DeviceInfo) -> Option<&InterfaceInfo> {
    device.interfaces.iter().find(|intf| intf.is_printer_class())
}

/// First bulk OUT endpoint of `interface`
pub fn find_endpoint(interface: &InterfaceInfo) -> Option<&EndpointInfo> {
    interface.bulk_out_endpoint()
}

/// VID:PID allow-list applied before selection
///
/// Entries look like `0x04b8:0x0202`, `0x04b8:*` or `*:*`. An empty list
/// allows every device.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    filters: Vec<String>,
}

impl DeviceFilter {
    pub fn new(filters: Vec<String>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether `device` passes the filter
    pub fn allows(&self, device: &DeviceInfo) -> bool {
        let allowed = Self::check_filter(device.vendor_id, device.product_id, &self.filters);
        if !allowed {
            debug!(
                "Device ignored by filter: bus={}, addr={}, vid={:#06x}, pid={:#06x}",
                device.bus_number, device.device_address, device.vendor_id, device.product_id
            );
        }
        allowed
    }

    /// Keep only allowed devices, preserving enumeration order
    pub fn apply(&self, devices: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
        if self.is_empty() {
            return devices;
        }
        devices.into_iter().filter(|d| self.allows(d)).collect()
    }

    fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
        if filters.is_empty() {
            return true;
        }

        filters.iter().any(|filter| {
            // Filters are validated by the config loader; malformed ones never match
            match filter.split_once(':') {
                Some((vid_part, pid_part)) => {
                    Self::matches_id(vid_part, vid) && Self::matches_id(pid_part, pid)
                }
                None => false,
            }
        })
    }

    fn matches_id(pattern: &str, id: u16) -> bool {
        if pattern == "*" {
            return true;
        }

        let hex = pattern
            .strip_prefix("0x")
            .or_else(|| pattern.strip_prefix("0X"))
            .unwrap_or(pattern);
        u16::from_str_radix(hex, 16).is_ok_and(|value| value == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        bulk_in, bulk_out, create_mock_device_info, create_mock_hid_device,
        create_mock_interface, create_mock_mass_storage_device, create_mock_printer,
    };
    use protocol::{USB_CLASS_PRINTER, USB_CLASS_VENDOR_SPEC};

    #[test]
    fn test_select_none_without_printer() {
        let devices = vec![create_mock_hid_device(1), create_mock_mass_storage_device(2)];
        assert!(select_printer(&devices).is_none());
        assert!(select_printer(&[]).is_none());
    }

    #[test]
    fn test_select_first_match_wins() {
        let devices = vec![
            create_mock_hid_device(1),
            create_mock_printer(2),
            create_mock_printer(3),
        ];
        assert_eq!(select_printer(&devices).map(|d| d.id.0), Some(2));
    }

    #[test]
    fn test_vendor_specific_interface_counts() {
        let device = create_mock_device_info(
            1,
            0x0fe6,
            0x811e,
            vec![create_mock_interface(0, USB_CLASS_VENDOR_SPEC, vec![bulk_out(0x02)])],
        );
        assert!(is_printer_like(&device));
    }

    #[test]
    fn test_bulk_out_on_other_interface_does_not_qualify() {
        // Printer interface has only IN; the OUT endpoint belongs to mass storage
        let device = create_mock_device_info(
            1,
            0x1234,
            0x5678,
            vec![
                create_mock_interface(0, USB_CLASS_PRINTER, vec![bulk_in(0x81)]),
                create_mock_interface(1, 0x08, vec![bulk_out(0x02)]),
            ],
        );
        assert!(!is_printer_like(&device));
        assert!(!is_printer_like(&create_mock_mass_storage_device(2)));
    }

    #[test]
    fn test_resolver_scans_independently() {
        let device = create_mock_device_info(
            1,
            0x1234,
            0x5678,
            vec![
                create_mock_interface(0, USB_CLASS_VENDOR_SPEC, vec![bulk_in(0x81)]),
                create_mock_interface(1, USB_CLASS_PRINTER, vec![bulk_out(0x02)]),
            ],
        );

        assert!(is_printer_like(&device));
        let intf = find_interface(&device).unwrap();
        assert_eq!(intf.number, 0);
        assert!(find_endpoint(intf).is_none());
    }

    #[test]
    fn test_find_endpoint_first_bulk_out() {
        let intf = create_mock_interface(
            0,
            USB_CLASS_PRINTER,
            vec![bulk_in(0x81), bulk_out(0x01), bulk_out(0x03)],
        );
        assert_eq!(find_endpoint(&intf).map(|ep| ep.address), Some(0x01));
    }

    #[test]
    fn test_filter_matching() {
        let printer = create_mock_printer(1); // 0x0416:0x5011

        assert!(DeviceFilter::default().allows(&printer));
        assert!(DeviceFilter::new(vec!["0x0416:0x5011".into()]).allows(&printer));
        assert!(DeviceFilter::new(vec!["0x0416:*".into()]).allows(&printer));
        assert!(DeviceFilter::new(vec!["*:*".into()]).allows(&printer));
        assert!(DeviceFilter::new(vec!["0X0416:0X5011".into()]).allows(&printer));

        assert!(!DeviceFilter::new(vec!["0x04b8:*".into()]).allows(&printer));
        assert!(!DeviceFilter::new(vec!["0x0416:0x0001".into()]).allows(&printer));
        assert!(!DeviceFilter::new(vec!["garbage".into()]).allows(&printer));
    }

    #[test]
    fn test_filter_apply_keeps_order() {
        let filter = DeviceFilter::new(vec!["0x0416:*".into(), "0x046d:*".into()]);
        let devices = vec![
            create_mock_hid_device(1),
            create_mock_mass_storage_device(2),
            create_mock_printer(3),
        ];

        let ids: Vec<u32> = filter.apply(devices).iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
