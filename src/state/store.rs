//! ChannelStateStore - In-memory console state keyed by channel address
//!
//! Reads want a consistent view of a whole channel (name, mute and fader
//! together), so when the store is shared between tasks it sits behind a
//! single mutex (`SharedStore`) rather than per-attribute locks.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::types::{ChannelState, StateChange};
use crate::protocol::address::ChannelAddress;
use crate::protocol::decoder::DecodedEvent;

/// Store shared between the decoder path, the driver and readers
pub type SharedStore = Arc<Mutex<ChannelStateStore>>;

/// Last known state of every console channel
#[derive(Debug, Clone)]
pub struct ChannelStateStore {
    channels: BTreeMap<ChannelAddress, ChannelState>,
    current_scene: Option<u16>,
}

impl ChannelStateStore {
    /// Create a store with every channel at its type default
    pub fn new() -> Self {
        let channels = ChannelAddress::iter_all()
            .map(|addr| (addr, ChannelState::default_for(addr.channel_type())))
            .collect();
        Self {
            channels,
            current_scene: None,
        }
    }

    /// Wrap a fresh store for sharing
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Snapshot of one channel
    pub fn get(&self, address: ChannelAddress) -> ChannelState {
        self.channels
            .get(&address)
            .cloned()
            .unwrap_or_else(|| ChannelState::default_for(address.channel_type()))
    }

    /// All channels in address order
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelAddress, &ChannelState)> {
        self.channels.iter()
    }

    /// Last recalled scene, if any since the connection came up
    pub fn current_scene(&self) -> Option<u16> {
        self.current_scene
    }

    /// Apply a decoded console event
    ///
    /// Returns the resulting change, or `None` for events that carry no
    /// channel state.
    pub fn apply(&mut self, event: &DecodedEvent) -> Option<StateChange> {
        match event {
            DecodedEvent::MuteChanged { address, muted } => Some(self.set_mute(*address, *muted)),
            DecodedEvent::FaderChanged { address, db } => Some(self.set_fader(*address, *db)),
            DecodedEvent::NameReceived { address, name } => {
                Some(self.set_name(*address, name.clone()))
            }
            DecodedEvent::Unrecognized { .. } => None,
        }
    }

    pub fn set_mute(&mut self, address: ChannelAddress, muted: bool) -> StateChange {
        self.entry(address).muted = muted;
        StateChange::Mute(address)
    }

    pub fn set_fader(&mut self, address: ChannelAddress, db: f64) -> StateChange {
        self.entry(address).fader_db = db;
        StateChange::Fader(address)
    }

    pub fn set_name(&mut self, address: ChannelAddress, name: String) -> StateChange {
        self.entry(address).name = name;
        StateChange::Name(address)
    }

    pub fn set_current_scene(&mut self, scene: u16) -> StateChange {
        self.current_scene = Some(scene);
        StateChange::Scene(scene)
    }

    /// Restore every channel to its defaults (connection lost)
    pub fn reset(&mut self) -> StateChange {
        for (addr, state) in self.channels.iter_mut() {
            *state = ChannelState::default_for(addr.channel_type());
        }
        self.current_scene = None;
        debug!("Channel state reset to defaults");
        StateChange::Reset
    }

    fn entry(&mut self, address: ChannelAddress) -> &mut ChannelState {
        self.channels
            .entry(address)
            .or_insert_with(|| ChannelState::default_for(address.channel_type()))
    }
}

impl Default for ChannelStateStore {
    fn default() -> Self {
        Self::new()
    }
}
