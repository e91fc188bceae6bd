//! Channel state module - last known console state per channel
//!
//! The store mirrors name, mute and fader position for every channel on the
//! console, plus the last recalled scene. It is mutated only by decoded
//! console events, by optimistic updates after a successful send, and by the
//! reset performed when the connection drops.

mod store;
mod types;

pub use store::{ChannelStateStore, SharedStore};
pub use types::{ChannelState, StateChange, StateKind};
