//! Effect toggle registry
//!
//! Holds the on/off state of every configured effect and turns each toggle
//! into a Control Change on the output port. The command table is the single
//! source of truth for which [`ActionCode`]s exist: state is created for
//! exactly those keys and anything else passed to [`EffectRegistry::toggle`]
//! is ignored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

use crate::midi::{ControlChange, MidiError, MidiSink};

/// Key shared by device mappings and the command table (`"1"`, `"a"`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCode(String);

impl ActionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// One effect assignment: CC number plus a display name for logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub cc: u8,
    pub name: String,
}

impl Command {
    pub fn new(cc: u8, name: impl Into<String>) -> Self {
        Self {
            cc,
            name: name.into(),
        }
    }
}

/// ActionCode → effect assignment
pub type CommandTable = BTreeMap<ActionCode, Command>;

/// Result of a successful toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectChange {
    pub action: ActionCode,
    pub name: String,
    pub enabled: bool,
    pub message: ControlChange,
}

/// Per-effect boolean state plus the sink it reports to
pub struct EffectRegistry<M: MidiSink> {
    commands: CommandTable,
    states: HashMap<ActionCode, bool>,
    /// 0-based MIDI channel (low nibble of the status byte)
    channel: u8,
    sink: M,
}

impl<M: MidiSink> EffectRegistry<M> {
    /// Create a registry with every effect off
    ///
    /// `channel` is 1-based (1..=16) as users write it; it is clamped into range.
    pub fn new(commands: CommandTable, channel: u8, sink: M) -> Self {
        let states = commands.keys().map(|code| (code.clone(), false)).collect();
        Self {
            commands,
            states,
            channel: channel.clamp(1, 16) - 1,
            sink,
        }
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Current state of an effect, `None` if the code is not configured
    pub fn is_enabled(&self, action: &ActionCode) -> Option<bool> {
        self.states.get(action).copied()
    }

    pub fn contains(&self, action: &ActionCode) -> bool {
        self.commands.contains_key(action)
    }

    pub fn sink(&self) -> &M {
        &self.sink
    }

    /// Flip an effect and emit its new value (127 on, 0 off)
    ///
    /// Unknown codes are a silent no-op. A failed send is logged; the flip is
    /// kept so the next toggle still sends the opposite value.
    pub fn toggle(&mut self, action: &ActionCode) -> Option<EffectChange> {
        let command = self.commands.get(action)?;
        let state = self.states.get_mut(action)?;
        *state = !*state;
        let enabled = *state;

        let message = ControlChange {
            channel: self.channel,
            cc: command.cc,
            value: if enabled { 127 } else { 0 },
        };

        if let Err(e) = self.sink.send(&message.encode()) {
            warn!("Failed to send {} for '{}': {}", message, command.name, e);
        }

        info!("{}: {}", command.name, if enabled { "ON" } else { "OFF" });

        Some(EffectChange {
            action: action.clone(),
            name: command.name.clone(),
            enabled,
            message,
        })
    }

    /// Close the output port
    pub fn close(&mut self) -> Result<(), MidiError> {
        self.sink.close()
    }
}
