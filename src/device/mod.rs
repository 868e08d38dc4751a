//! Physical input devices
//!
//! A [`DeviceSession`] owns one HID endpoint through connect, read and
//! cleanup. Family-specific decoding lives in [`ReportDecoder`], so the
//! dispatch loop treats every session the same way.

pub mod claims;
pub mod session;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::classify::{decode_joystick, JoystickButton, JoystickReading, PatternTable};
use crate::debounce::{EdgeDebouncer, Level};
use crate::effects::ActionCode;

pub use claims::PathClaims;
pub use session::{ConnectionState, DeviceSession, Selection};

/// Per-family report decoding
#[derive(Debug, Clone)]
pub enum ReportDecoder {
    /// Streaming joystick: field decode, then edge detection
    Joystick {
        actions: BTreeMap<JoystickButton, ActionCode>,
        debouncer: EdgeDebouncer<JoystickButton>,
    },
    /// Shutter pedals: one exact pattern per press
    Pattern(PatternTable),
}

impl ReportDecoder {
    pub fn joystick(actions: BTreeMap<JoystickButton, ActionCode>, debounce: Duration) -> Self {
        ReportDecoder::Joystick {
            actions,
            debouncer: EdgeDebouncer::new(debounce),
        }
    }

    pub fn pattern(table: PatternTable) -> Self {
        ReportDecoder::Pattern(table)
    }

    /// Turn one report into an action, if it carries one
    pub fn decode(&mut self, report: &[u8], now: Instant) -> Option<ActionCode> {
        match self {
            ReportDecoder::Joystick { actions, debouncer } => {
                let level = match decode_joystick(report)? {
                    JoystickReading::Idle => Level::Idle,
                    JoystickReading::Pressed(button) => Level::Active(button),
                    JoystickReading::Unrecognized(state) => {
                        trace!("Unrecognized joystick state {:?}", state);
                        return None;
                    }
                };
                let button = debouncer.feed(level, now)?;
                let action = actions.get(&button).cloned();
                if action.is_none() {
                    debug!("Joystick button {} has no action assigned", button.label());
                }
                action
            }
            ReportDecoder::Pattern(table) => table.classify(report).cloned(),
        }
    }

    /// Drop per-connection state
    pub fn reset(&mut self) {
        if let ReportDecoder::Joystick { debouncer, .. } = self {
            debouncer.reset();
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReportDecoder::Joystick { .. } => "joystick",
            ReportDecoder::Pattern(_) => "pattern",
        }
    }
}
