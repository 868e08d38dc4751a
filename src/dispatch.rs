//! Dispatch loop
//!
//! Every tick, each session is either connected (if it is down) or polled
//! once; recognised actions go straight to the effect registry. All work is
//! sequential on one task, so effect state and session state are never
//! touched concurrently.

use anyhow::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DeviceFamily, SelectMode};
use crate::device::{DeviceSession, PathClaims, ReportDecoder, Selection};
use crate::effects::{ActionCode, EffectChange, EffectRegistry};
use crate::hid::{format_ids, HidTransport};
use crate::midi::MidiSink;

struct Registered<H> {
    family: DeviceFamily,
    session: DeviceSession<H>,
}

/// Owns the transport, every device session and the effect registry
pub struct Dispatcher<T: HidTransport, M: MidiSink> {
    transport: T,
    sessions: Vec<Registered<T::Handle>>,
    effects: EffectRegistry<M>,
    claims: PathClaims,
    tick: Duration,
}

impl<T: HidTransport, M: MidiSink> Dispatcher<T, M> {
    pub fn new(transport: T, effects: EffectRegistry<M>, tick: Duration) -> Self {
        Self {
            transport,
            sessions: Vec::new(),
            effects,
            claims: PathClaims::new(),
            tick,
        }
    }

    /// Build the registry and one session per configured unit
    pub fn from_config(config: &AppConfig, transport: T, sink: M) -> Result<Self> {
        let effects = EffectRegistry::new(config.commands.clone(), config.midi.channel, sink);
        let mut dispatcher = Self::new(transport, effects, config.polling.tick());

        for device in &config.devices {
            for unit in 1..=device.units {
                let name = if device.units > 1 {
                    format!("{} #{}", device.name, unit)
                } else {
                    device.name.clone()
                };
                let selection = match device.select {
                    SelectMode::Ids => Selection::Ids,
                    SelectMode::Path => Selection::Path(dispatcher.claims.clone()),
                };
                let session = DeviceSession::new(
                    name,
                    device.vendor_id,
                    device.product_id,
                    selection,
                    device.decoder(config.polling.debounce())?,
                );
                dispatcher.add_session(device.family, session);
            }
        }

        Ok(dispatcher)
    }

    pub fn add_session(&mut self, family: DeviceFamily, session: DeviceSession<T::Handle>) {
        let (vid, pid) = session.ids();
        debug!(
            "Registered {} session '{}' ({})",
            family.label(),
            session.name(),
            format_ids(vid, pid)
        );
        self.sessions.push(Registered { family, session });
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|r| r.session.is_connected())
            .count()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.sessions
            .iter()
            .any(|r| r.session.name() == name && r.session.is_connected())
    }

    pub fn effects(&self) -> &EffectRegistry<M> {
        &self.effects
    }

    /// Paths shared by every path-selected session built by this dispatcher
    pub fn claims(&self) -> &PathClaims {
        &self.claims
    }

    /// Try every disconnected session once; returns how many are up
    pub fn connect_all(&mut self) -> usize {
        for entry in &mut self.sessions {
            entry.session.connect(&mut self.transport);
        }
        self.connected_count()
    }

    /// One pass over all sessions
    pub fn tick(&mut self, now: Instant) -> Vec<EffectChange> {
        let mut changes = Vec::new();

        for entry in &mut self.sessions {
            let session = &mut entry.session;
            if !session.is_connected() {
                session.connect(&mut self.transport);
                continue;
            }

            if let Some(action) = session.read(now) {
                match self.effects.toggle(&action) {
                    Some(change) => changes.push(change),
                    None => debug!("{} sent '{}' which has no command", session.name(), action),
                }
            }
        }

        changes
    }

    /// Tick until `shutdown` resolves, then release everything
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Polling {} device session(s) every {:?}", self.sessions.len(), self.tick);

        loop {
            tokio::select! {
                now = ticker.tick() => {
                    self.tick(now.into_std());
                }
                _ = &mut shutdown => {
                    info!("Stopping poll loop");
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Close every device and the MIDI port; one failure never skips the rest
    pub fn shutdown(&mut self) {
        for entry in &mut self.sessions {
            entry.session.cleanup();
        }
        if let Err(e) = self.effects.close() {
            warn!("Failed to close MIDI output: {}", e);
        }
        info!("All devices released");
    }

    /// Log what every session controls, grouped by family
    pub fn log_mappings(&self) {
        let mut groups: BTreeMap<DeviceFamily, Vec<&DeviceSession<T::Handle>>> = BTreeMap::new();
        for entry in &self.sessions {
            groups.entry(entry.family).or_default().push(&entry.session);
        }

        for (family, sessions) in groups {
            let connected = sessions.iter().filter(|s| s.is_connected()).count();
            info!(
                "{}: {} of {} device(s) connected",
                family.label(),
                connected,
                sessions.len()
            );

            for session in sessions {
                info!("  {} mappings:", session.name());
                match session.decoder() {
                    ReportDecoder::Joystick { actions, .. } => {
                        for (button, action) in actions {
                            info!("    Button '{}' -> {}", button.label(), self.effect_name(action));
                        }
                    }
                    ReportDecoder::Pattern(table) => {
                        for (pattern, action) in table.iter() {
                            info!("    Pattern {:?} -> {}", pattern, self.effect_name(action));
                        }
                    }
                }
            }
        }
    }

    fn effect_name(&self, action: &ActionCode) -> &str {
        self.effects
            .commands()
            .get(action)
            .map(|c| c.name.as_str())
            .unwrap_or("<unmapped>")
    }
}
