//! Channel address table
//!
//! The console addresses every channel with a single 7-bit code. The code
//! space 0x00-0x7F is split into five contiguous bands, one per channel type:
//!
//! ```text
//! 0x00-0x07  FX send     (8)
//! 0x08-0x0F  FX return   (8)
//! 0x10-0x1F  DCA         (16)
//! 0x20-0x5F  input       (64)
//! 0x60-0x7F  mix         (32)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Kind of console channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Input,
    FxSend,
    FxReturn,
    Mix,
    Dca,
}

impl ChannelType {
    /// All channel types, in name-poll order
    pub fn all() -> &'static [ChannelType] {
        &[
            ChannelType::Input,
            ChannelType::FxSend,
            ChannelType::FxReturn,
            ChannelType::Mix,
            ChannelType::Dca,
        ]
    }

    /// Number of channels of this type
    pub fn count(&self) -> u8 {
        match self {
            ChannelType::Input => 64,
            ChannelType::FxSend => 8,
            ChannelType::FxReturn => 8,
            ChannelType::Mix => 32,
            ChannelType::Dca => 16,
        }
    }

    /// First code of this type's band
    pub fn band_offset(&self) -> u8 {
        match self {
            ChannelType::FxSend => 0x00,
            ChannelType::FxReturn => 0x08,
            ChannelType::Dca => 0x10,
            ChannelType::Input => 0x20,
            ChannelType::Mix => 0x60,
        }
    }

    /// Fader position a channel of this type is assumed to sit at before
    /// the console reports one. Busses idle at unity gain.
    pub fn default_fader_db(&self) -> f64 {
        match self {
            ChannelType::Input | ChannelType::FxReturn => crate::protocol::level::MIN_DB,
            ChannelType::FxSend | ChannelType::Mix | ChannelType::Dca => 0.0,
        }
    }

    /// Identifier used in config files, actions and variable names
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Input => "input",
            ChannelType::FxSend => "fx_send",
            ChannelType::FxReturn => "fx_return",
            ChannelType::Mix => "mix",
            ChannelType::Dca => "dca",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            ChannelType::Input => "Input Channel",
            ChannelType::FxSend => "FX Send",
            ChannelType::FxReturn => "FX Return",
            ChannelType::Mix => "Mix",
            ChannelType::Dca => "DCA",
        }
    }

    /// Channel type whose band contains `code`
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00..=0x07 => Some(ChannelType::FxSend),
            0x08..=0x0F => Some(ChannelType::FxReturn),
            0x10..=0x1F => Some(ChannelType::Dca),
            0x20..=0x5F => Some(ChannelType::Input),
            0x60..=0x7F => Some(ChannelType::Mix),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "input" | "ch" => Ok(ChannelType::Input),
            "fx_send" => Ok(ChannelType::FxSend),
            "fx_return" => Ok(ChannelType::FxReturn),
            "mix" => Ok(ChannelType::Mix),
            "dca" => Ok(ChannelType::Dca),
            other => Err(BridgeError::InvalidParams(format!(
                "unknown channel type '{}'",
                other
            ))),
        }
    }
}

/// A validated (type, 1-based index) pair
///
/// Construction checks the index against the type's channel count, so every
/// value of this type maps to exactly one wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "AddressSpec", into = "AddressSpec")]
pub struct ChannelAddress {
    channel_type: ChannelType,
    index: u8,
}

impl ChannelAddress {
    /// Create an address, rejecting indexes outside `1..=count`
    pub fn new(channel_type: ChannelType, index: u16) -> Result<Self> {
        if index == 0 || index > channel_type.count() as u16 {
            return Err(BridgeError::InvalidChannel {
                channel_type,
                index,
            });
        }
        Ok(Self {
            channel_type,
            index: index as u8,
        })
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// 1-based channel number within the type
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Wire code of this address
    pub fn code(&self) -> u8 {
        self.channel_type.band_offset() + (self.index - 1)
    }

    /// Iterate every address of a type in ascending index order
    pub fn iter_type(channel_type: ChannelType) -> impl Iterator<Item = ChannelAddress> {
        (1..=channel_type.count()).map(move |index| ChannelAddress {
            channel_type,
            index,
        })
    }

    /// Iterate every address on the console
    pub fn iter_all() -> impl Iterator<Item = ChannelAddress> {
        ChannelType::all()
            .iter()
            .flat_map(|t| ChannelAddress::iter_type(*t))
    }
}

/// Serialized form of an address, validated on the way in
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AddressSpec {
    pub channel_type: ChannelType,
    pub index: u16,
}

impl TryFrom<AddressSpec> for ChannelAddress {
    type Error = BridgeError;

    fn try_from(spec: AddressSpec) -> Result<Self> {
        ChannelAddress::new(spec.channel_type, spec.index)
    }
}

impl From<ChannelAddress> for AddressSpec {
    fn from(addr: ChannelAddress) -> Self {
        AddressSpec {
            channel_type: addr.channel_type,
            index: addr.index as u16,
        }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.channel_type, self.index)
    }
}

/// Resolve a wire code to its channel address
///
/// Returns `None` only for codes above 0x7F, which 7-bit protocol fields
/// cannot carry.
pub fn resolve(code: u8) -> Option<ChannelAddress> {
    let channel_type = ChannelType::from_code(code)?;
    Some(ChannelAddress {
        channel_type,
        index: code - channel_type.band_offset() + 1,
    })
}

/// Encode a (type, index) pair to its wire code
pub fn encode(channel_type: ChannelType, index: u16) -> Result<u8> {
    ChannelAddress::new(channel_type, index).map(|addr| addr.code())
}
