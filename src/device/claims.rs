//! Path claims for identical-id units
//!
//! Two pedals of the same model report the same vendor/product ids, so
//! sessions bind to concrete device paths instead. A [`PathClaims`] registry is
//! created by whoever builds the sessions and handed to each of them; a path is
//! held from a successful connect until the session cleans up.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::hid::DevicePath;

/// Shared set of device paths currently bound to a session
#[derive(Debug, Clone, Default)]
pub struct PathClaims {
    claimed: Rc<RefCell<HashSet<DevicePath>>>,
}

impl PathClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path; `false` if another session already holds it
    pub fn try_claim(&self, path: &DevicePath) -> bool {
        self.claimed.borrow_mut().insert(path.clone())
    }

    pub fn release(&self, path: &DevicePath) {
        self.claimed.borrow_mut().remove(path);
    }

    pub fn is_claimed(&self, path: &DevicePath) -> bool {
        self.claimed.borrow().contains(path)
    }

    pub fn len(&self) -> usize {
        self.claimed.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.borrow().is_empty()
    }
}
