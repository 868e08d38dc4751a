//! `hidapi`-backed transport

use hidapi::{DeviceInfo, HidApi, HidDevice};
use std::ffi::CString;
use tracing::{debug, warn};

use super::{DeviceDescriptor, DevicePath, HidHandle, HidTransport, TransportError};

/// Production transport wrapping a single `HidApi` context
pub struct HidApiTransport {
    api: HidApi,
}

impl HidApiTransport {
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { api })
    }

    /// Re-scan the bus so hot-plugged units become visible
    fn refresh(&mut self) {
        if let Err(e) = self.api.refresh_devices() {
            warn!("HID device refresh failed: {}", e);
        }
    }

    /// Every HID endpoint on the system, for the diagnostic listing
    pub fn enumerate_all(&mut self) -> Vec<DeviceDescriptor> {
        self.refresh();
        self.api.device_list().map(descriptor_from_info).collect()
    }
}

fn descriptor_from_info(info: &DeviceInfo) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        path: Some(DevicePath::new(info.path().to_string_lossy().into_owned())),
        manufacturer: info.manufacturer_string().map(str::to_string),
        product: info.product_string().map(str::to_string),
        serial_number: info.serial_number().map(str::to_string),
        interface_number: info.interface_number(),
    }
}

impl HidTransport for HidApiTransport {
    type Handle = HidApiHandle;

    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> Vec<DeviceDescriptor> {
        self.refresh();
        self.api
            .device_list()
            .filter(|info| info.vendor_id() == vendor_id && info.product_id() == product_id)
            .map(descriptor_from_info)
            .collect()
    }

    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<Self::Handle, TransportError> {
        let device = self
            .api
            .open(vendor_id, product_id)
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        debug!("Opened HID {:04x}:{:04x}", vendor_id, product_id);
        Ok(HidApiHandle { device })
    }

    fn open_path(&mut self, path: &DevicePath) -> Result<Self::Handle, TransportError> {
        let c_path = CString::new(path.as_str())
            .map_err(|e| TransportError::Connection(format!("invalid device path: {}", e)))?;
        let device = self
            .api
            .open_path(&c_path)
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        debug!("Opened HID path {}", path);
        Ok(HidApiHandle { device })
    }
}

/// Open `hidapi` device; closed when dropped
pub struct HidApiHandle {
    device: HidDevice,
}

impl HidHandle for HidApiHandle {
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        self.device
            .set_blocking_mode(!nonblocking)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.device
            .read(buf)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
