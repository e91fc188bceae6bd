//! Console drivers
//!
//! `IliveDriver` owns the protocol state for one console. It never touches a
//! socket itself: bytes go out through an [`OutboundSink`] and come in through
//! [`IliveDriver::on_bytes_received`], which keeps the driver testable without
//! a network. `ConsoleConnection` is the TCP side of that seam.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::state::StateChange;

/// Connection status of a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Driver is connected and operational
    Connected,
    /// Driver is disconnected
    Disconnected,
    /// Driver is attempting to reconnect
    Reconnecting { attempt: usize },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
        }
    }
}

/// Callback type for connection status changes
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Callback type for channel state changes
///
/// Called after the store has been updated, with the store lock released.
pub type StateCallback = Arc<dyn Fn(StateChange) + Send + Sync>;

/// Destination for encoded console messages
///
/// Implementations must preserve submission order. Sending while the
/// console is unreachable queues the bytes until the next connection.
pub trait OutboundSink: Send + Sync {
    fn send_raw(&self, bytes: Vec<u8>) -> crate::error::Result<()>;
}

/// Driver trait - all console integrations implement this
///
/// Note: All methods take &self (not &mut self) to support Arc<dyn Driver>.
/// Drivers should use interior mutability (RwLock, Mutex, etc.) for mutable state.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Get the driver name (e.g., "ilive")
    fn name(&self) -> &str;

    /// Initialize the driver
    async fn init(&self) -> Result<()>;

    /// Execute an action with parameters
    ///
    /// # Arguments
    /// * `action` - The action name (e.g., "fader", "mute", "scene")
    /// * `params` - JSON parameters, positional
    async fn execute(&self, action: &str, params: Vec<Value>) -> Result<()>;

    /// Sync driver state (called after config reload)
    async fn sync(&self) -> Result<()>;

    /// Shutdown the driver gracefully
    async fn shutdown(&self) -> Result<()>;

    /// Subscribe to channel state changes
    ///
    /// Default implementation: no-op (driver keeps no channel state)
    fn subscribe_state(&self, _callback: StateCallback) {}

    /// Get current connection status
    ///
    /// Default implementation: always connected (for drivers without network connections)
    fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::Connected
    }

    /// Subscribe to connection status changes
    ///
    /// Default implementation: no-op (driver doesn't track connection status)
    fn subscribe_connection_status(&self, _callback: StatusCallback) {}
}

pub mod connection;
pub mod ilive;
pub mod poller;

pub use connection::{ConnectionEvent, ConsoleConnection};
pub use ilive::IliveDriver;
pub use poller::NamePoller;
