//! Channel state type definitions

use serde::{Deserialize, Serialize};

use crate::protocol::address::{ChannelAddress, ChannelType};

/// Last known state of one console channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Channel name as reported by the console (empty until polled)
    pub name: String,
    /// Whether the channel is muted
    pub muted: bool,
    /// Fader position in dB
    pub fader_db: f64,
}

impl ChannelState {
    /// Power-on state for a channel of the given type
    pub fn default_for(channel_type: ChannelType) -> Self {
        Self {
            name: String::new(),
            muted: false,
            fader_db: channel_type.default_fader_db(),
        }
    }
}

/// Category of a state change, used to decide which feedbacks to re-evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Mute,
    Fader,
    Name,
    Scene,
    Reset,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKind::Mute => write!(f, "mute"),
            StateKind::Fader => write!(f, "fader"),
            StateKind::Name => write!(f, "name"),
            StateKind::Scene => write!(f, "scene"),
            StateKind::Reset => write!(f, "reset"),
        }
    }
}

/// A single mutation of the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateChange {
    Mute(ChannelAddress),
    Fader(ChannelAddress),
    Name(ChannelAddress),
    /// A scene was recalled
    Scene(u16),
    /// Every channel went back to its defaults
    Reset,
}

impl StateChange {
    pub fn kind(&self) -> StateKind {
        match self {
            StateChange::Mute(_) => StateKind::Mute,
            StateChange::Fader(_) => StateKind::Fader,
            StateChange::Name(_) => StateKind::Name,
            StateChange::Scene(_) => StateKind::Scene,
            StateChange::Reset => StateKind::Reset,
        }
    }

    /// Channel touched by this change, if it concerns a single channel
    pub fn address(&self) -> Option<ChannelAddress> {
        match self {
            StateChange::Mute(a) | StateChange::Fader(a) | StateChange::Name(a) => Some(*a),
            StateChange::Scene(_) | StateChange::Reset => None,
        }
    }
}
