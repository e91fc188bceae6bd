//! iLive Bridge
//!
//! Controls an Allen & Heath iLive mixing console over its TCP MIDI
//! protocol: decodes the console's byte stream into per-channel state,
//! encodes fader, mute and scene commands, and polls channel names.

pub mod cli;
pub mod config;
pub mod drivers;
pub mod error;
pub mod feedback;
pub mod protocol;
pub mod sniffer;
pub mod state;

pub use error::{BridgeError, Result};
