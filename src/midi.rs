//! MIDI output
//!
//! Provides the Control Change message type, the [`MidiSink`] seam the effect
//! registry writes to, and the midir-backed [`VirtualPort`].

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Client name registered with the OS MIDI stack
const CLIENT_NAME: &str = "FXPedal-GW";

/// MIDI output failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MidiError {
    /// Output port could not be created or found
    #[error("MIDI port unavailable: {0}")]
    Port(String),

    /// A message could not be delivered
    #[error("MIDI send failed: {0}")]
    Send(String),
}

/// Control Change: channel (0-15), cc (0-127), value (0-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChange {
    pub channel: u8,
    pub cc: u8,
    pub value: u8,
}

impl ControlChange {
    /// Parse a Control Change from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 3 || data[0] & 0xF0 != 0xB0 {
            return None;
        }
        Some(Self {
            channel: data[0] & 0x0F,
            cc: data[1] & 0x7F,
            value: data[2] & 0x7F,
        })
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> [u8; 3] {
        [0xB0 | (self.channel & 0x0F), self.cc & 0x7F, self.value & 0x7F]
    }
}

impl fmt::Display for ControlChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CC ch:{} cc:{} v:{}", self.channel + 1, self.cc, self.value)
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Destination for outgoing MIDI bytes
pub trait MidiSink {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError>;

    /// Release the port. Calling it twice is harmless.
    fn close(&mut self) -> Result<(), MidiError>;
}

/// Output port owned by the gateway
pub struct VirtualPort {
    name: String,
    conn: Option<MidiOutputConnection>,
}

impl VirtualPort {
    /// Open the output port
    ///
    /// Creates a virtual port where the platform supports it, otherwise
    /// attaches to an existing port whose name contains `name` (e.g. loopMIDI).
    pub fn open(name: &str) -> Result<Self, MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Port(e.to_string()))?;
        let conn = Self::connect(midi_out, name)?;
        info!("MIDI output ready: '{}'", name);
        Ok(Self {
            name: name.to_string(),
            conn: Some(conn),
        })
    }

    #[cfg(unix)]
    fn connect(midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection, MidiError> {
        use midir::os::unix::VirtualOutput;

        midi_out
            .create_virtual(name)
            .map_err(|e| MidiError::Port(format!("cannot create virtual port '{}': {}", name, e)))
    }

    #[cfg(not(unix))]
    fn connect(midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection, MidiError> {
        let (port, port_name) = find_output_port(&midi_out, name).ok_or_else(|| {
            MidiError::Port(format!(
                "no output port matching '{}' (create one with a loopback driver)",
                name
            ))
        })?;
        debug!("Using existing output port '{}'", port_name);
        midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| MidiError::Port(e.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MidiSink for VirtualPort {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| MidiError::Send("port is closed".to_string()))?;
        conn.send(message)
            .map_err(|e| MidiError::Send(e.to_string()))?;
        debug!("Sent: {}", format_hex(message));
        Ok(())
    }

    fn close(&mut self) -> Result<(), MidiError> {
        if let Some(conn) = self.conn.take() {
            conn.close();
            info!("MIDI output '{}' closed", self.name);
        }
        Ok(())
    }
}

/// Find an output port by substring match (case-insensitive)
pub fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
    let pattern = pattern.to_lowercase();
    midi_out.ports().into_iter().find_map(|port| {
        let name = midi_out.port_name(&port).ok()?;
        name.to_lowercase().contains(&pattern).then_some((port, name))
    })
}

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>, MidiError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Port(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Sink that records everything sent, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
    fail_close: bool,
    closes: usize,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.clone()
    }

    pub fn fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }

    pub fn fail_close(&mut self, fail: bool) {
        self.fail_close = fail;
    }

    pub fn closes(&self) -> usize {
        self.closes
    }
}

#[cfg(test)]
impl MidiSink for RecordingSink {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        if self.fail_sends {
            return Err(MidiError::Send("port gone".to_string()));
        }
        self.sent.push(message.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), MidiError> {
        self.closes += 1;
        if self.fail_close {
            Err(MidiError::Port("close failed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_change_encode() {
        let msg = ControlChange {
            channel: 0,
            cc: 5,
            value: 127,
        };
        assert_eq!(msg.encode(), [0xB0, 5, 127]);
    }

    #[test]
    fn test_control_change_encode_masks_out_of_range() {
        let msg = ControlChange {
            channel: 0x1F,
            cc: 0x85,
            value: 0xFF,
        };
        assert_eq!(msg.encode(), [0xBF, 0x05, 0x7F]);
    }

    #[test]
    fn test_control_change_parse() {
        let msg = ControlChange::parse(&[0xB2, 7, 100]).unwrap();
        assert_eq!(
            msg,
            ControlChange {
                channel: 2,
                cc: 7,
                value: 100,
            }
        );
        assert!(ControlChange::parse(&[0x90, 60, 100]).is_none());
        assert!(ControlChange::parse(&[0xB0, 7]).is_none());
    }

    #[test]
    fn test_display_uses_one_based_channel() {
        let msg = ControlChange {
            channel: 0,
            cc: 9,
            value: 0,
        };
        assert_eq!(msg.to_string(), "CC ch:1 cc:9 v:0");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xB0, 0x05, 0x7F]), "B0 05 7F");
        assert_eq!(format_hex(&[]), "");
    }
}
