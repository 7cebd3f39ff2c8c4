//! Bus enumeration and descriptor helpers shared by the USB backends

use rusb::{Device, DeviceDescriptor, Direction};
use tether_core::{
    CommunicationError, EndpointDirection, EndpointInfo, Matches, Result, UsbDeviceInfo,
    UsbIdentification,
};
use tracing::{debug, trace, warn};

use crate::context::UsbContext;

/// Colon-joined hub port numbers, e.g. `[1, 4, 2]` -> `"1:4:2"`
pub fn format_port_path(ports: &[u8]) -> String {
    ports
        .iter()
        .map(|port| port.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

/// Identity of `device`. String descriptors that cannot be read are left empty.
pub(crate) fn read_identity(device: &Device<rusb::Context>, descriptor: &DeviceDescriptor) -> UsbDeviceInfo {
    let port = device
        .port_numbers()
        .map(|ports| format_port_path(&ports))
        .unwrap_or_default();

    let mut info = UsbDeviceInfo {
        port,
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        ..Default::default()
    };

    match device.open() {
        Ok(handle) => {
            info.name = handle.read_product_string_ascii(descriptor).unwrap_or_default();
            info.manufacturer = handle
                .read_manufacturer_string_ascii(descriptor)
                .unwrap_or_default();
            info.serial_number = handle
                .read_serial_number_string_ascii(descriptor)
                .unwrap_or_default();
        }
        Err(e) => {
            debug!(
                vendor_id = %format!("{:04x}", info.vendor_id),
                product_id = %format!("{:04x}", info.product_id),
                error = %e,
                "Cannot open device to read string descriptors"
            );
        }
    }

    info
}

/// List devices accepted by `vendor_filter` that match any of `criteria`
pub(crate) fn enumerate(
    context: &UsbContext,
    criteria: &[UsbIdentification],
    vendor_filter: impl Fn(u16) -> bool,
) -> Vec<UsbDeviceInfo> {
    if criteria.is_empty() {
        return Vec::new();
    }

    let devices = match context.devices() {
        Ok(devices) => devices,
        Err(e) => {
            warn!(error = %e, "Failed to list USB devices");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(error = %e, "Failed to read device descriptor");
                continue;
            }
        };

        if !vendor_filter(descriptor.vendor_id()) {
            continue;
        }

        let info = read_identity(&device, &descriptor);
        if criteria.iter().any(|c| c.matches(&info)) {
            trace!(device = %info, "USB device matches criteria");
            found.push(info);
        } else {
            trace!(device = %info, "USB device does not match criteria");
        }
    }

    found
}

/// Locate the live device for a previously discovered identity
pub(crate) fn find_device(context: &UsbContext, info: &UsbDeviceInfo) -> Result<Device<rusb::Context>> {
    if info.port.is_empty() {
        return Err(CommunicationError::InvalidArgument(
            "device port path is empty".to_string(),
        ));
    }

    for device in context.devices()?.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        if descriptor.vendor_id() != info.vendor_id || descriptor.product_id() != info.product_id {
            continue;
        }

        let port = device
            .port_numbers()
            .map(|ports| format_port_path(&ports))
            .unwrap_or_default();
        if port == info.port {
            return Ok(device);
        }
    }

    Err(CommunicationError::Resource(format!(
        "device {:04x}:{:04x} not found on port {}",
        info.vendor_id, info.product_id, info.port
    )))
}

/// Endpoints of the active configuration
pub(crate) fn read_endpoints(device: &Device<rusb::Context>) -> Vec<EndpointInfo> {
    let config = match device.active_config_descriptor() {
        Ok(config) => config,
        Err(e) => {
            debug!(error = %e, "Failed to read active configuration descriptor");
            return Vec::new();
        }
    };

    let mut endpoints = Vec::new();
    for interface in config.interfaces() {
        for setting in interface.descriptors() {
            for endpoint in setting.endpoint_descriptors() {
                let direction = match endpoint.direction() {
                    Direction::In => EndpointDirection::In,
                    Direction::Out => EndpointDirection::Out,
                };
                endpoints.push(EndpointInfo::new(direction, u16::from(endpoint.address() & 0x0F)));
            }
        }
    }
    endpoints
}
