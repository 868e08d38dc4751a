//! Configuration for FX Pedal GW
//!
//! Handles loading, validating and dumping the YAML configuration. When no
//! file is given the gateway runs on [`AppConfig::builtin`].

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

use crate::classify::{JoystickButton, PatternTable};
use crate::device::ReportDecoder;
use crate::effects::{ActionCode, Command, CommandTable};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    pub commands: CommandTable,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// MIDI output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_port_name")]
    pub port_name: String,
    /// 1-based MIDI channel
    #[serde(default = "default_channel")]
    pub channel: u8,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            channel: default_channel(),
        }
    }
}

/// Poll loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PollingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Supported input device families
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Joystick,
    ShutterAb,
    ShutterM3,
    ShutterSingle,
    Custom,
}

impl DeviceFamily {
    pub fn label(self) -> &'static str {
        match self {
            DeviceFamily::Joystick => "Joystick",
            DeviceFamily::ShutterAb => "AB shutter",
            DeviceFamily::ShutterM3 => "M3 shutter",
            DeviceFamily::ShutterSingle => "Shutter",
            DeviceFamily::Custom => "Custom pattern device",
        }
    }
}

/// How a device entry picks its HID endpoint
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    /// Open the first endpoint with matching vendor/product ids
    #[default]
    Ids,
    /// Enumerate and claim an endpoint path not held by another session
    Path,
}

/// One exact-prefix pattern
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PatternConfig {
    pub bytes: Vec<u8>,
    pub action: ActionCode,
}

/// Input device entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub name: String,
    pub family: DeviceFamily,
    #[serde(with = "hex_id")]
    pub vendor_id: u16,
    #[serde(with = "hex_id")]
    pub product_id: u16,
    #[serde(default)]
    pub select: SelectMode,
    #[serde(default = "default_units")]
    pub units: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<BTreeMap<JoystickButton, ActionCode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<PatternConfig>>,
}

impl DeviceConfig {
    fn new(name: &str, family: DeviceFamily, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: name.to_string(),
            family,
            vendor_id,
            product_id,
            select: SelectMode::Ids,
            units: 1,
            buttons: None,
            action: None,
            patterns: None,
        }
    }

    /// Button → action map for a joystick entry (factory mapping unless overridden)
    pub fn joystick_actions(&self) -> BTreeMap<JoystickButton, ActionCode> {
        self.buttons
            .clone()
            .unwrap_or_else(JoystickButton::default_actions)
    }

    /// Pattern table for a pattern-based entry; `None` for joysticks
    pub fn pattern_table(&self) -> Result<Option<PatternTable>> {
        if let Some(patterns) = &self.patterns {
            let entries = patterns
                .iter()
                .map(|p| (p.bytes.clone(), p.action.clone()));
            let table = PatternTable::from_entries(entries)
                .with_context(|| format!("Invalid patterns for device '{}'", self.name))?;
            return Ok(Some(table));
        }

        Ok(match self.family {
            DeviceFamily::Joystick => None,
            DeviceFamily::ShutterAb => Some(PatternTable::shutter_ab()),
            DeviceFamily::ShutterM3 => Some(PatternTable::shutter_m3()),
            DeviceFamily::ShutterSingle => {
                let action = self.action.clone().with_context(|| {
                    format!("Device '{}' (shutter_single) requires 'action'", self.name)
                })?;
                Some(PatternTable::shutter_single(action))
            }
            DeviceFamily::Custom => {
                anyhow::bail!("Device '{}' (custom) requires 'patterns'", self.name)
            }
        })
    }

    /// Fresh decoder for one session of this entry
    pub fn decoder(&self, debounce: Duration) -> Result<ReportDecoder> {
        match self.family {
            DeviceFamily::Joystick => Ok(ReportDecoder::joystick(self.joystick_actions(), debounce)),
            _ => {
                let table = self
                    .pattern_table()?
                    .with_context(|| format!("Device '{}' has no pattern table", self.name))?;
                Ok(ReportDecoder::pattern(table))
            }
        }
    }

    /// Every action this entry can emit
    pub fn referenced_actions(&self) -> Vec<ActionCode> {
        match self.family {
            DeviceFamily::Joystick => self.joystick_actions().into_values().collect(),
            _ => self
                .pattern_table()
                .ok()
                .flatten()
                .map(|table| table.iter().map(|(_, action)| action.clone()).collect())
                .unwrap_or_default(),
        }
    }
}

impl AppConfig {
    /// Layout of the reference pedalboard (joystick, M3 and AB remotes)
    pub fn builtin() -> Self {
        let names = [
            ("1", 1, "Tunner"),
            ("2", 2, "Looper"),
            ("3", 3, "Compressor"),
            ("4", 4, "Overdrive"),
            ("5", 5, "Distortion"),
            ("6", 6, "Chorus"),
            ("7", 7, "Delay"),
            ("8", 8, "Reverb"),
            ("a", 9, "Preset A"),
            ("b", 10, "Preset B"),
            ("c", 11, "Preset C"),
            ("d", 12, "Preset D"),
            ("e", 13, "Preset E"),
            ("f", 14, "Preset F"),
            ("g", 15, "Preset G"),
            ("h", 16, "Preset H"),
        ];
        let commands = names
            .into_iter()
            .map(|(code, cc, name)| (ActionCode::from(code), Command::new(cc, name)))
            .collect();

        let mut m3 = DeviceConfig::new("M3 shutter", DeviceFamily::ShutterM3, 0x05ac, 0x022c);
        m3.select = SelectMode::Path;

        Self {
            midi: MidiConfig::default(),
            polling: PollingConfig::default(),
            commands,
            devices: vec![
                DeviceConfig::new("Joystick", DeviceFamily::Joystick, 0x0810, 0x0001),
                m3,
                DeviceConfig::new("AB shutter", DeviceFamily::ShutterAb, 0x2717, 0x0040),
            ],
        }
    }

    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.port_name.trim().is_empty() {
            anyhow::bail!("MIDI port_name cannot be empty");
        }
        if self.midi.channel == 0 || self.midi.channel > 16 {
            anyhow::bail!("Invalid MIDI channel {} (must be 1-16)", self.midi.channel);
        }
        if self.polling.tick_ms == 0 {
            anyhow::bail!("polling.tick_ms must be greater than 0");
        }

        if self.commands.is_empty() {
            anyhow::bail!("At least one command must be defined");
        }
        let mut seen_cc: HashMap<u8, &ActionCode> = HashMap::new();
        for (code, command) in &self.commands {
            if command.cc > 127 {
                anyhow::bail!(
                    "Command '{}' has invalid CC number {} (must be 0-127)",
                    code,
                    command.cc
                );
            }
            if let Some(other) = seen_cc.insert(command.cc, code) {
                anyhow::bail!(
                    "Commands '{}' and '{}' both use CC {}",
                    other,
                    code,
                    command.cc
                );
            }
        }

        for (idx, device) in self.devices.iter().enumerate() {
            self.validate_device(device)
                .with_context(|| format!("Invalid device #{} '{}'", idx + 1, device.name))?;
        }

        for (device, action) in self.unmapped_actions() {
            warn!(
                "Device '{}' uses action '{}' which has no command; it will be ignored",
                device, action
            );
        }

        Ok(())
    }

    fn validate_device(&self, device: &DeviceConfig) -> Result<()> {
        if device.name.trim().is_empty() {
            anyhow::bail!("Device name cannot be empty");
        }
        if device.units == 0 {
            anyhow::bail!("units must be at least 1");
        }
        if device.units > 1 && device.select != SelectMode::Path {
            anyhow::bail!("units > 1 requires 'select: path'");
        }

        match device.family {
            DeviceFamily::Joystick => {
                if device.patterns.is_some() {
                    anyhow::bail!("'patterns' is not supported for joystick devices");
                }
            }
            _ => {
                if device.buttons.is_some() {
                    anyhow::bail!("'buttons' is only supported for joystick devices");
                }
                if device.family == DeviceFamily::ShutterSingle && device.action.is_none() {
                    anyhow::bail!("shutter_single requires 'action'");
                }
                device.pattern_table()?;
            }
        }

        Ok(())
    }

    /// (device name, action) pairs whose action has no command
    pub fn unmapped_actions(&self) -> Vec<(String, ActionCode)> {
        let mut unmapped = Vec::new();
        for device in &self.devices {
            for action in device.referenced_actions() {
                if !self.commands.contains_key(&action) {
                    unmapped.push((device.name.clone(), action));
                }
            }
        }
        unmapped
    }
}

/// Parse a number given either in decimal or as `0x`-prefixed hex
pub fn parse_number_maybe_hex(value: &str) -> Option<u16> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        value.parse::<u16>().ok()
    }
}

/// Parse `VID:PID` (each part decimal or hex, bare hex accepted as in lsusb)
pub fn parse_vid_pid(value: &str) -> Result<(u16, u16), String> {
    let (vid, pid) = value
        .split_once(':')
        .ok_or_else(|| format!("expected VID:PID, got '{}'", value))?;

    let part = |s: &str| {
        let s = s.trim();
        let id = if s.starts_with("0x") || s.starts_with("0X") {
            parse_number_maybe_hex(s)
        } else {
            u16::from_str_radix(s, 16).ok()
        };
        id.ok_or_else(|| format!("invalid id '{}' in '{}'", s, value))
    };

    Ok((part(vid)?, part(pid)?))
}

/// Vendor/product ids as integers or hex strings
mod hex_id {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:04x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => u16::try_from(n)
                .map_err(|_| serde::de::Error::custom(format!("id {} out of range", n))),
            RawId::Text(s) => parse_number_maybe_hex(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid id '{}'", s))),
        }
    }
}

// Default value functions
fn default_port_name() -> String { "FX Pedal Bridge".to_string() }
fn default_channel() -> u8 { 1 }
fn default_tick_ms() -> u64 { 50 }
fn default_debounce_ms() -> u64 { 50 }
fn default_units() -> u32 { 1 }
