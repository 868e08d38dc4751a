//! Scripted HID bus for tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{DeviceDescriptor, DevicePath, HidHandle, HidTransport, TransportError};

struct MockUnit {
    desc: DeviceDescriptor,
    present: bool,
    reports: VecDeque<Result<Vec<u8>, TransportError>>,
    fail_close: bool,
    opens: usize,
    closes: usize,
}

#[derive(Default)]
struct MockBus {
    units: Vec<MockUnit>,
}

impl MockBus {
    fn unit_mut(&mut self, path: &str) -> &mut MockUnit {
        self.units
            .iter_mut()
            .find(|u| u.desc.path.as_ref().map(|p| p.as_str()) == Some(path))
            .unwrap_or_else(|| panic!("no mock unit at {}", path))
    }
}

/// Cloneable handle onto a shared fake bus
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    bus: Rc<RefCell<MockBus>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&self, vendor_id: u16, product_id: u16, path: &str) {
        self.bus.borrow_mut().units.push(MockUnit {
            desc: DeviceDescriptor::new(vendor_id, product_id, Some(DevicePath::new(path))),
            present: true,
            reports: VecDeque::new(),
            fail_close: false,
            opens: 0,
            closes: 0,
        });
    }

    pub fn push_report(&self, path: &str, bytes: &[u8]) {
        self.bus
            .borrow_mut()
            .unit_mut(path)
            .reports
            .push_back(Ok(bytes.to_vec()));
    }

    pub fn push_fault(&self, path: &str) {
        self.bus
            .borrow_mut()
            .unit_mut(path)
            .reports
            .push_back(Err(TransportError::Io("read error".to_string())));
    }

    pub fn set_present(&self, path: &str, present: bool) {
        self.bus.borrow_mut().unit_mut(path).present = present;
    }

    pub fn set_fail_close(&self, path: &str, fail: bool) {
        self.bus.borrow_mut().unit_mut(path).fail_close = fail;
    }

    pub fn opens(&self, path: &str) -> usize {
        self.bus.borrow_mut().unit_mut(path).opens
    }

    pub fn closes(&self, path: &str) -> usize {
        self.bus.borrow_mut().unit_mut(path).closes
    }

    fn open_unit(&self, pick: impl Fn(&MockUnit) -> bool) -> Result<MockHandle, TransportError> {
        let mut bus = self.bus.borrow_mut();
        let unit = bus
            .units
            .iter_mut()
            .find(|u| u.present && pick(&**u))
            .ok_or_else(|| TransportError::Connection("device not found".to_string()))?;
        unit.opens += 1;
        let path = unit.desc.path.clone().expect("mock units always have a path");
        Ok(MockHandle {
            bus: self.bus.clone(),
            path,
        })
    }
}

impl HidTransport for MockTransport {
    type Handle = MockHandle;

    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> Vec<DeviceDescriptor> {
        self.bus
            .borrow()
            .units
            .iter()
            .filter(|u| u.present && u.desc.vendor_id == vendor_id && u.desc.product_id == product_id)
            .map(|u| u.desc.clone())
            .collect()
    }

    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<Self::Handle, TransportError> {
        self.open_unit(|u| u.desc.vendor_id == vendor_id && u.desc.product_id == product_id)
    }

    fn open_path(&mut self, path: &DevicePath) -> Result<Self::Handle, TransportError> {
        self.open_unit(|u| u.desc.path.as_ref() == Some(path))
    }
}

pub(crate) struct MockHandle {
    bus: Rc<RefCell<MockBus>>,
    path: DevicePath,
}

impl HidHandle for MockHandle {
    fn set_nonblocking(&mut self, _nonblocking: bool) -> Result<(), TransportError> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut bus = self.bus.borrow_mut();
        let unit = bus.unit_mut(self.path.as_str());
        if !unit.present {
            return Err(TransportError::Io("device disconnected".to_string()));
        }
        match unit.reports.pop_front() {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }

    fn close(self) -> Result<(), TransportError> {
        let mut bus = self.bus.borrow_mut();
        let unit = bus.unit_mut(self.path.as_str());
        unit.closes += 1;
        if unit.fail_close {
            Err(TransportError::Io("close failed".to_string()))
        } else {
            Ok(())
        }
    }
}
