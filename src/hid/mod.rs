//! HID transport abstraction
//!
//! The bridge only needs a handful of operations from the HID stack: enumerate
//! units by vendor/product id, open one (by ids or by path), switch it to
//! non-blocking mode and read fixed-size reports. Those live behind
//! [`HidTransport`] / [`HidHandle`] so sessions can be driven by `hidapi` in
//! production and by a scripted bus in tests.

pub mod hidapi_backend;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use thiserror::Error;

pub use hidapi_backend::HidApiTransport;

/// Largest report the bridge reads in one call
pub const MAX_REPORT_LEN: usize = 64;

/// Transport-level failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Device absent, busy or refused to open
    #[error("connection failed: {0}")]
    Connection(String),

    /// Fault on an open handle (unplugged mid-session, driver error)
    #[error("I/O error: {0}")]
    Io(String),
}

/// Opaque OS path of a HID endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePath(String);

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One physical HID endpoint
///
/// Several descriptors may share vendor/product ids (identical pedals plugged
/// in side by side); `path` tells them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub path: Option<DevicePath>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub interface_number: i32,
}

impl DeviceDescriptor {
    pub fn new(vendor_id: u16, product_id: u16, path: Option<DevicePath>) -> Self {
        Self {
            vendor_id,
            product_id,
            path,
            manufacturer: None,
            product: None,
            serial_number: None,
            interface_number: -1,
        }
    }

    /// `vvvv:pppp` in lowercase hex
    pub fn id_string(&self) -> String {
        format_ids(self.vendor_id, self.product_id)
    }
}

/// Format a vendor/product pair the way `lsusb` does
pub fn format_ids(vendor_id: u16, product_id: u16) -> String {
    format!("{:04x}:{:04x}", vendor_id, product_id)
}

/// Access to the platform HID stack
pub trait HidTransport {
    type Handle: HidHandle;

    /// List every endpoint matching the ids. An empty list is not an error.
    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> Vec<DeviceDescriptor>;

    /// Open the first endpoint matching the ids
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<Self::Handle, TransportError>;

    /// Open a specific endpoint
    fn open_path(&mut self, path: &DevicePath) -> Result<Self::Handle, TransportError>;
}

/// An open HID endpoint
pub trait HidHandle {
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError>;

    /// Read one report into `buf`. `Ok(0)` means nothing pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Release the endpoint
    fn close(self) -> Result<(), TransportError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_string_is_zero_padded_hex() {
        let desc = DeviceDescriptor::new(0x0810, 0x0001, None);
        assert_eq!(desc.id_string(), "0810:0001");
        assert_eq!(format_ids(0x05ac, 0x022c), "05ac:022c");
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Io("read error".to_string());
        assert_eq!(err.to_string(), "I/O error: read error");
    }
}
