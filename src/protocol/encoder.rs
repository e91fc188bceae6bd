//! Outbound message encoder
//!
//! Every builder takes an already validated [`ChannelAddress`], so an
//! out-of-range channel is rejected before any bytes exist.

use super::address::ChannelAddress;
use super::level::{clamp_db, db_to_level};
use super::{
    CONTROL_CHANGE, DATA_ENTRY, NOTE_ON, NRPN_FADER_PARAM, NRPN_LSB, NRPN_MSB, PROGRAM_CHANGE,
    SYSEX_END, SYSEX_HEADER, SYSEX_NAME_REQUEST, VELOCITY_MUTE, VELOCITY_UNMUTE,
};
use crate::error::{BridgeError, Result};

/// Highest recallable scene
pub const MAX_SCENE: u16 = 250;

/// Scenes per program-change bank
const SCENES_PER_BANK: u16 = 128;

/// Fader set: `B0 63 CC 62 17 06 LV`, dB clamped to the fader range
pub fn fader(address: ChannelAddress, db: f64) -> Vec<u8> {
    let level = db_to_level(clamp_db(db));
    vec![
        CONTROL_CHANGE,
        NRPN_MSB,
        address.code(),
        NRPN_LSB,
        NRPN_FADER_PARAM,
        DATA_ENTRY,
        level,
    ]
}

/// Mute or unmute: `90 CC 7F` / `90 CC 3F`
pub fn mute(address: ChannelAddress, muted: bool) -> Vec<u8> {
    let velocity = if muted { VELOCITY_MUTE } else { VELOCITY_UNMUTE };
    vec![NOTE_ON, address.code(), velocity]
}

/// Bank and program for a 1-based scene number
pub fn scene_bank_program(scene: u16) -> Result<(u8, u8)> {
    if scene == 0 || scene > MAX_SCENE {
        return Err(BridgeError::InvalidScene(scene));
    }
    let zero_based = scene - 1;
    Ok(((zero_based / SCENES_PER_BANK) as u8, (zero_based % SCENES_PER_BANK) as u8))
}

/// Scene recall: `B0 00 BK C0 PG`
pub fn scene_recall(scene: u16) -> Result<Vec<u8>> {
    let (bank, program) = scene_bank_program(scene)?;
    Ok(vec![CONTROL_CHANGE, 0x00, bank, PROGRAM_CHANGE, program])
}

/// Name request: `F0 00 00 1A 50 10 01 00 00 01 CC F7`
pub fn name_request(address: ChannelAddress) -> Vec<u8> {
    let mut msg = Vec::with_capacity(SYSEX_HEADER.len() + 3);
    msg.extend_from_slice(&SYSEX_HEADER);
    msg.push(SYSEX_NAME_REQUEST);
    msg.push(address.code());
    msg.push(SYSEX_END);
    msg
}
