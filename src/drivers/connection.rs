//! TCP transport to the console
//!
//! One background task owns the socket. It connects, forwards received bytes
//! as [`ConnectionEvent::Data`], writes queued outbound messages in order, and
//! reconnects after a fixed delay whenever the connection drops. Messages sent
//! while disconnected stay queued and are written once the next connection
//! comes up.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use super::{ConnectionStatus, OutboundSink, StatusCallback};
use crate::config::ConsoleConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::format_hex;

/// Bytes requested per socket read
const READ_CHUNK: usize = 512;

/// Transport events delivered to the owner of the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Data(Vec<u8>),
    Disconnected { reason: String },
}

/// Why a connected session ended
enum SessionEnd {
    Lost(String),
    Reconfigured,
    Shutdown,
}

/// State shared between the handle and the connection task
struct StatusHub {
    current: RwLock<ConnectionStatus>,
    callbacks: RwLock<Vec<StatusCallback>>,
}

impl StatusHub {
    fn emit(&self, status: ConnectionStatus) {
        if *self.current.read() == status {
            return;
        }
        *self.current.write() = status.clone();
        for callback in self.callbacks.read().iter() {
            callback(status.clone());
        }
    }
}

/// Handle to the console connection task
pub struct ConsoleConnection {
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    config_tx: watch::Sender<ConsoleConfig>,
    shutdown_tx: watch::Sender<bool>,
    status: Arc<StatusHub>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleConnection {
    /// Start connecting to the console in the background
    pub fn spawn(config: ConsoleConfig, events_tx: mpsc::Sender<ConnectionEvent>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (config_tx, config_rx) = watch::channel(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = Arc::new(StatusHub {
            current: RwLock::new(ConnectionStatus::Disconnected),
            callbacks: RwLock::new(Vec::new()),
        });

        let task = tokio::spawn(run(
            outbound_rx,
            config_rx,
            shutdown_rx,
            events_tx,
            status.clone(),
        ));

        Self {
            outbound_tx,
            config_tx,
            shutdown_tx,
            status,
            task: Mutex::new(Some(task)),
        }
    }

    /// Point the connection at a new console
    ///
    /// An open connection is dropped and re-established immediately.
    pub fn reconfigure(&self, config: ConsoleConfig) {
        info!("🔌 Console endpoint changed to {}", config.address());
        self.config_tx.send_replace(config);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.current.read().clone()
    }

    /// Subscribe to status changes; the current status is delivered immediately
    pub fn subscribe_status(&self, callback: StatusCallback) {
        callback(self.status());
        self.status.callbacks.write().push(callback);
    }

    /// Close the connection and stop reconnecting
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Console connection task ended abnormally: {}", e);
            }
        }
    }
}

impl OutboundSink for ConsoleConnection {
    fn send_raw(&self, bytes: Vec<u8>) -> Result<()> {
        self.outbound_tx
            .send(bytes)
            .map_err(|_| BridgeError::TransportClosed)
    }
}

/// Connection loop: connect, run a session, wait, repeat
async fn run(
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut config_rx: watch::Receiver<ConsoleConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    status: Arc<StatusHub>,
) {
    let mut attempt = 0usize;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let config = config_rx.borrow_and_update().clone();
        let address = config.address();
        debug!("Connecting to console at {}", address);

        match timeout(config.connect_timeout(), TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                attempt = 0;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY: {}", e);
                }
                info!("✅ Connected to iLive console at {}", address);
                status.emit(ConnectionStatus::Connected);
                if events_tx.send(ConnectionEvent::Connected).await.is_err() {
                    break;
                }

                let end = session(
                    stream,
                    &mut outbound_rx,
                    &mut config_rx,
                    &mut shutdown_rx,
                    &events_tx,
                )
                .await;

                let reason = match &end {
                    SessionEnd::Lost(reason) => reason.clone(),
                    SessionEnd::Reconfigured => "endpoint changed".to_string(),
                    SessionEnd::Shutdown => "shutdown".to_string(),
                };
                status.emit(ConnectionStatus::Disconnected);
                let _ = events_tx
                    .send(ConnectionEvent::Disconnected {
                        reason: reason.clone(),
                    })
                    .await;

                match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Reconfigured => continue,
                    SessionEnd::Lost(_) => warn!("⚠️  Console connection lost: {}", reason),
                }
            }
            Ok(Err(e)) => warn!("Failed to connect to console at {}: {}", address, e),
            Err(_) => warn!(
                "Timed out connecting to console at {} after {:?}",
                address,
                config.connect_timeout()
            ),
        }

        attempt += 1;
        status.emit(ConnectionStatus::Reconnecting { attempt });
        debug!(
            "Reconnecting in {:?} (attempt {})",
            config.reconnect_delay(),
            attempt
        );

        tokio::select! {
            _ = sleep(config.reconnect_delay()) => {}
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                attempt = 0;
            }
            _ = shutdown_rx.changed() => {}
        }
    }

    status.emit(ConnectionStatus::Disconnected);
    debug!("Console connection task stopped");
}

/// Pump one connected socket until it fails or we are told to stop
async fn session(
    stream: TcpStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    config_rx: &mut watch::Receiver<ConsoleConfig>,
    shutdown_rx: &mut watch::Receiver<bool>,
    events_tx: &mpsc::Sender<ConnectionEvent>,
) -> SessionEnd {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => return SessionEnd::Lost("connection closed by console".to_string()),
                Ok(n) => {
                    trace!("RX {}", format_hex(&buf[..n]));
                    if events_tx.send(ConnectionEvent::Data(buf[..n].to_vec())).await.is_err() {
                        return SessionEnd::Shutdown;
                    }
                }
                Err(e) => return SessionEnd::Lost(e.to_string()),
            },
            outbound = outbound_rx.recv() => match outbound {
                Some(bytes) => {
                    trace!("TX {}", format_hex(&bytes));
                    if let Err(e) = writer.write_all(&bytes).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                None => return SessionEnd::Shutdown,
            },
            changed = config_rx.changed() => {
                return match changed {
                    Ok(()) => SessionEnd::Reconfigured,
                    Err(_) => SessionEnd::Shutdown,
                };
            }
            _ = shutdown_rx.changed() => return SessionEnd::Shutdown,
        }
    }
}
