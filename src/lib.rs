//! FX Pedal GW
//!
//! Turns HID foot controllers (a twin-USB joystick and Bluetooth shutter
//! remotes) into MIDI Control Change effect toggles.

pub mod classify;
pub mod config;
pub mod debounce;
pub mod device;
pub mod dispatch;
pub mod effects;
pub mod hid;
pub mod midi;
pub mod sniffer;

pub use config::AppConfig;
pub use dispatch::Dispatcher;
