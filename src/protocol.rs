//! iLive TCP MIDI protocol
//!
//! The console speaks a MIDI-shaped byte stream over TCP port 51325:
//!
//! ```text
//! FE                                   keepalive / timing (ignored)
//! 90 CC VV                             mute status      (VV >= 0x40 muted)
//! B0 63 CC 62 17 06 LV                 fader level      (LV 0-127)
//! B0 00 BK C0 PG                       scene recall     (outbound only)
//! F0 00 00 1A 50 10 01 00 00 SS CC .. F7   channel name request/response
//! ```
//!
//! Submodules provide the channel address table, the level codec, the
//! stream decoder and the outbound encoder.

pub mod address;
pub mod decoder;
pub mod encoder;
pub mod level;

pub use address::{ChannelAddress, ChannelType};
pub use decoder::{DecodedEvent, DecoderStats, StreamDecoder};
pub use level::{db_to_level, level_to_db};

/// Well-known TCP port of the console's MIDI interface
pub const DEFAULT_PORT: u16 = 51325;

/// Keepalive / timing byte, carries no payload
pub const KEEPALIVE: u8 = 0xFE;

/// Note On status byte, used for mute state
pub const NOTE_ON: u8 = 0x90;

/// Control Change status byte, used for NRPN fader levels and bank select
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Program Change status byte, used for scene recall
pub const PROGRAM_CHANGE: u8 = 0xC0;

/// SysEx start
pub const SYSEX_START: u8 = 0xF0;

/// SysEx end
pub const SYSEX_END: u8 = 0xF7;

/// Length of a mute status message
pub const NOTE_ON_LEN: usize = 3;

/// Length of an NRPN fader level message
pub const FADER_LEN: usize = 7;

/// NRPN template for a fader message: `B0 63 CC 62 17 06 LV`
pub const NRPN_MSB: u8 = 0x63;
pub const NRPN_LSB: u8 = 0x62;
pub const NRPN_FADER_PARAM: u8 = 0x17;
pub const DATA_ENTRY: u8 = 0x06;

/// Manufacturer / model / command class prefix of name SysEx messages
pub const SYSEX_HEADER: [u8; 9] = [SYSEX_START, 0x00, 0x00, 0x1A, 0x50, 0x10, 0x01, 0x00, 0x00];

/// SysEx sub-code for an outbound name request
pub const SYSEX_NAME_REQUEST: u8 = 0x01;

/// SysEx sub-code for an inbound name response
pub const SYSEX_NAME_RESPONSE: u8 = 0x02;

/// Note On velocity sent to mute a channel
pub const VELOCITY_MUTE: u8 = 0x7F;

/// Note On velocity sent to unmute a channel
pub const VELOCITY_UNMUTE: u8 = 0x3F;

/// Velocities at or above this value mean "muted"
pub const VELOCITY_THRESHOLD: u8 = 0x40;

/// Format bytes as a hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
