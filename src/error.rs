//! Error types for the bridge library

use crate::protocol::address::ChannelType;

/// Errors raised by the protocol layer and the console driver.
///
/// Malformed inbound framing is never reported here: the decoder recovers
/// from it locally. These are caller and transport errors only.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Channel index outside `1..=count` for its type.
    #[error("invalid {channel_type} channel {index} (must be 1-{max})", max = .channel_type.count())]
    InvalidChannel { channel_type: ChannelType, index: u16 },

    /// Scene number outside `1..=250`.
    #[error("invalid scene {0} (must be 1-250)")]
    InvalidScene(u16),

    /// Action parameters missing or of the wrong shape.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Action name the driver does not implement.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The outbound queue was dropped (transport shut down).
    #[error("transport closed")]
    TransportClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
