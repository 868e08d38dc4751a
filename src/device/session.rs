//! Device session state machine
//!
//! ```text
//!   Disconnected --connect() ok--> Connected
//!   Connected --read() I/O fault--> Disconnected
//!   any --cleanup()--> Disconnected
//! ```
//!
//! Sessions never retry on their own; the dispatch loop calls `connect()`
//! again on a later tick.

use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::{PathClaims, ReportDecoder};
use crate::effects::ActionCode;
use crate::hid::{
    format_ids, DevicePath, HidHandle, HidTransport, TransportError, MAX_REPORT_LEN,
};
use crate::midi::format_hex;

/// How a session picks its endpoint
#[derive(Debug, Clone)]
pub enum Selection {
    /// First endpoint with the configured ids
    Ids,
    /// First endpoint with the configured ids whose path nobody has claimed
    Path(PathClaims),
}

/// Connection state of one session
pub enum ConnectionState<H> {
    Disconnected,
    Connected(H),
}

impl<H> ConnectionState<H> {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Lifecycle of one physical input device
pub struct DeviceSession<H> {
    name: String,
    vendor_id: u16,
    product_id: u16,
    selection: Selection,
    claimed: Option<DevicePath>,
    decoder: ReportDecoder,
    state: ConnectionState<H>,
    failed_attempts: u32,
    ever_connected: bool,
    buf: [u8; MAX_REPORT_LEN],
}

impl<H: HidHandle> DeviceSession<H> {
    pub fn new(
        name: impl Into<String>,
        vendor_id: u16,
        product_id: u16,
        selection: Selection,
        decoder: ReportDecoder,
    ) -> Self {
        Self {
            name: name.into(),
            vendor_id,
            product_id,
            selection,
            claimed: None,
            decoder,
            state: ConnectionState::Disconnected,
            failed_attempts: 0,
            ever_connected: false,
            buf: [0; MAX_REPORT_LEN],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ids(&self) -> (u16, u16) {
        (self.vendor_id, self.product_id)
    }

    pub fn decoder(&self) -> &ReportDecoder {
        &self.decoder
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Path currently held by this session (path selection only)
    pub fn claimed_path(&self) -> Option<&DevicePath> {
        self.claimed.as_ref()
    }

    /// Try to open the device; `true` once connected
    ///
    /// Failures are logged (a warning on the first miss, debug afterwards) and
    /// leave the session disconnected.
    pub fn connect<T>(&mut self, transport: &mut T) -> bool
    where
        T: HidTransport<Handle = H>,
    {
        if self.is_connected() {
            return true;
        }

        match self.open(transport) {
            Ok(handle) => {
                self.state = ConnectionState::Connected(handle);
                self.decoder.reset();
                info!(
                    "✅ {} {}connected ({}{})",
                    self.name,
                    if self.ever_connected { "re" } else { "" },
                    format_ids(self.vendor_id, self.product_id),
                    self.claimed
                        .as_ref()
                        .map(|p| format!(" at {}", p))
                        .unwrap_or_default()
                );
                self.ever_connected = true;
                self.failed_attempts = 0;
                true
            }
            Err(e) => {
                if self.failed_attempts == 0 {
                    warn!("⚠️  Could not connect to {}: {}", self.name, e);
                } else {
                    debug!("{} connect attempt #{} failed: {}", self.name, self.failed_attempts + 1, e);
                }
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                false
            }
        }
    }

    fn open<T>(&mut self, transport: &mut T) -> Result<H, TransportError>
    where
        T: HidTransport<Handle = H>,
    {
        let mut handle = match &self.selection {
            Selection::Ids => transport.open(self.vendor_id, self.product_id)?,
            Selection::Path(claims) => {
                let claims = claims.clone();
                let path = transport
                    .enumerate(self.vendor_id, self.product_id)
                    .into_iter()
                    .filter_map(|desc| desc.path)
                    .find(|path| claims.try_claim(path))
                    .ok_or_else(|| {
                        TransportError::Connection("no unclaimed unit available".to_string())
                    })?;

                match transport.open_path(&path) {
                    Ok(handle) => {
                        self.claimed = Some(path);
                        handle
                    }
                    Err(e) => {
                        claims.release(&path);
                        return Err(e);
                    }
                }
            }
        };

        if let Err(e) = handle.set_nonblocking(true) {
            self.close_handle(handle);
            self.release_claim();
            return Err(TransportError::Connection(format!("cannot set non-blocking mode: {}", e)));
        }

        Ok(handle)
    }

    /// Poll once for a report and decode it
    ///
    /// Returns `None` when disconnected, when nothing is pending and when the
    /// report carries no action. An I/O fault drops the connection.
    pub fn read(&mut self, now: Instant) -> Option<ActionCode> {
        let handle = match &mut self.state {
            ConnectionState::Connected(handle) => handle,
            ConnectionState::Disconnected => return None,
        };

        match handle.read(&mut self.buf) {
            Ok(0) => None,
            Ok(n) => {
                let report = &self.buf[..n];
                trace!("{} report: {}", self.name, format_hex(report));
                let action = self.decoder.decode(report, now);
                if let Some(action) = &action {
                    debug!("{} action: {}", self.name, action);
                }
                action
            }
            Err(e) => {
                warn!("🔌 {} disconnected: {}", self.name, e);
                self.cleanup();
                None
            }
        }
    }

    /// Close the handle (if any) and release the claimed path. Idempotent.
    pub fn cleanup(&mut self) {
        if let ConnectionState::Connected(handle) =
            std::mem::replace(&mut self.state, ConnectionState::Disconnected)
        {
            self.close_handle(handle);
        }
        self.release_claim();
    }

    fn close_handle(&self, handle: H) {
        if let Err(e) = handle.close() {
            debug!("Ignoring close error on {}: {}", self.name, e);
        }
    }

    fn release_claim(&mut self) {
        if let (Some(path), Selection::Path(claims)) = (self.claimed.take(), &self.selection) {
            claims.release(&path);
        }
    }
}

impl<H> Drop for DeviceSession<H> {
    fn drop(&mut self) {
        if let (Some(path), Selection::Path(claims)) = (self.claimed.take(), &self.selection) {
            claims.release(&path);
        }
    }
}
