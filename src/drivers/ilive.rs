//! iLive console driver
//!
//! Decodes the console's byte stream into the channel state store, encodes
//! control actions, and drives name polling across connection changes.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{ConnectionStatus, Driver, NamePoller, OutboundSink, StateCallback, StatusCallback};
use crate::config::PollingConfig;
use crate::error::BridgeError;
use crate::protocol::address::{ChannelAddress, ChannelType};
use crate::protocol::decoder::{DecodedEvent, DecoderStats, StreamDecoder};
use crate::protocol::level::clamp_db;
use crate::protocol::{encoder, format_hex};
use crate::state::{ChannelState, ChannelStateStore, SharedStore, StateChange};

/// Driver for one Allen & Heath iLive console
pub struct IliveDriver {
    name: String,
    sink: Arc<dyn OutboundSink>,
    store: SharedStore,
    decoder: Mutex<StreamDecoder>,
    poller: NamePoller,
    connected: AtomicBool,
    state_callbacks: RwLock<Vec<StateCallback>>,
    status_callbacks: RwLock<Vec<StatusCallback>>,
}

impl IliveDriver {
    /// Create a driver writing to `sink`
    pub fn new(sink: Arc<dyn OutboundSink>, polling: PollingConfig) -> Self {
        Self {
            name: "ilive".to_string(),
            poller: NamePoller::new(sink.clone(), polling),
            sink,
            store: ChannelStateStore::shared(),
            decoder: Mutex::new(StreamDecoder::new()),
            connected: AtomicBool::new(false),
            state_callbacks: RwLock::new(Vec::new()),
            status_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Shared handle to the channel state
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn channel_state(&self, address: ChannelAddress) -> ChannelState {
        self.store.lock().get(address)
    }

    pub fn current_scene(&self) -> Option<u16> {
        self.store.lock().current_scene()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.lock().stats()
    }

    /// Register a callback for channel state changes
    pub fn subscribe(&self, callback: StateCallback) {
        self.state_callbacks.write().push(callback);
    }

    /// Feed bytes received from the console
    ///
    /// Returns the number of state changes applied.
    pub fn on_bytes_received(&self, data: &[u8]) -> usize {
        let events: Vec<DecodedEvent> = {
            let mut decoder = self.decoder.lock();
            decoder.feed(data);
            decoder.events().collect()
        };

        let mut applied = 0;
        for event in events {
            let change = self.store.lock().apply(&event);
            match change {
                Some(change) => {
                    trace!("Console event: {:?}", event);
                    applied += 1;
                    self.notify(change);
                }
                None => {
                    if let DecodedEvent::Unrecognized { raw } = &event {
                        trace!("Ignoring unrecognized bytes: {}", format_hex(raw));
                    }
                }
            }
        }
        applied
    }

    /// The transport connected: start name polling
    pub fn on_connect(&self) {
        let was_connected = self.connected.swap(true, Ordering::AcqRel);
        self.decoder.lock().clear();
        self.poller.start();
        if !was_connected {
            self.emit_status(ConnectionStatus::Connected);
        }
    }

    /// The transport dropped: stop polling and forget all channel state
    pub fn on_disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        self.poller.stop();
        self.decoder.lock().clear();
        let change = self.store.lock().reset();
        info!("🔌 Console disconnected, channel state reset");
        self.notify(change);
        if was_connected {
            self.emit_status(ConnectionStatus::Disconnected);
        }
    }

    /// Move a fader to an absolute position (clamped to the fader range)
    pub fn set_fader(&self, address: ChannelAddress, db: f64) -> crate::error::Result<()> {
        let db = clamp_db(db);
        self.send(encoder::fader(address, db))?;
        debug!("🎚️  {} fader → {:.1} dB", address, db);
        let change = self.store.lock().set_fader(address, db);
        self.notify(change);
        Ok(())
    }

    /// Move a fader relative to its last known position
    ///
    /// Returns the new position.
    pub fn adjust_fader(&self, address: ChannelAddress, delta_db: f64) -> crate::error::Result<f64> {
        let target = clamp_db(self.channel_state(address).fader_db + delta_db);
        self.set_fader(address, target)?;
        Ok(target)
    }

    pub fn set_mute(&self, address: ChannelAddress, muted: bool) -> crate::error::Result<()> {
        self.send(encoder::mute(address, muted))?;
        debug!("🔇 {} {}", address, if muted { "muted" } else { "unmuted" });
        let change = self.store.lock().set_mute(address, muted);
        self.notify(change);
        Ok(())
    }

    /// Recall a scene (1-250)
    pub fn recall_scene(&self, scene: u16) -> crate::error::Result<()> {
        let bytes = encoder::scene_recall(scene)?;
        self.send(bytes)?;
        info!("🎬 Recalled scene {}", scene);
        let change = self.store.lock().set_current_scene(scene);
        self.notify(change);
        Ok(())
    }

    /// Start a name sweep outside the periodic schedule
    ///
    /// Does nothing while disconnected; the next connection sweeps anyway.
    pub fn poll_names(&self) -> Option<JoinHandle<usize>> {
        if !self.is_connected() {
            info!("Not connected, skipping name poll");
            return None;
        }
        info!("📛 Polling channel names");
        Some(self.poller.poll_now())
    }

    /// Apply new polling settings
    pub fn reconfigure_polling(&self, settings: PollingConfig) {
        self.poller.reconfigure(settings);
    }

    fn send(&self, bytes: Vec<u8>) -> crate::error::Result<()> {
        trace!("→ {}", format_hex(&bytes));
        self.sink.send_raw(bytes)
    }

    fn emit_status(&self, status: ConnectionStatus) {
        info!("iLive driver {}", status);
        for callback in self.status_callbacks.read().iter() {
            callback(status.clone());
        }
    }

    fn notify(&self, change: StateChange) {
        for callback in self.state_callbacks.read().iter() {
            callback(change);
        }
    }
}

/// Channel address from params[offset] (type) and params[offset + 1] (index)
fn param_address(params: &[Value], offset: usize) -> crate::error::Result<ChannelAddress> {
    let channel_type: ChannelType = params
        .get(offset)
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::InvalidParams("missing channel type".to_string()))?
        .parse()?;
    let index = param_number(params, offset + 1, "channel")?;
    if index.fract() != 0.0 || !(0.0..=u16::MAX as f64).contains(&index) {
        return Err(BridgeError::InvalidParams(format!(
            "channel must be a whole number, got {}",
            index
        )));
    }
    ChannelAddress::new(channel_type, index as u16)
}

/// Number from params[index], accepting numeric strings
fn param_number(params: &[Value], index: usize, what: &str) -> crate::error::Result<f64> {
    let value = params
        .get(index)
        .ok_or_else(|| BridgeError::InvalidParams(format!("missing {}", what)))?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| BridgeError::InvalidParams(format!("{} must be a number, got {}", what, value)))
}

/// Mute state from an optional param; omitted means mute
fn param_mute_state(value: Option<&Value>) -> crate::error::Result<bool> {
    let Some(value) = value else {
        return Ok(true);
    };
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_f64() == Some(1.0) => Ok(true),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "on" | "mute" | "true" | "1" => Ok(true),
            "off" | "unmute" | "false" | "0" => Ok(false),
            _ => Err(BridgeError::InvalidParams(format!("invalid mute state '{}'", s))),
        },
        other => Err(BridgeError::InvalidParams(format!(
            "invalid mute state {}",
            other
        ))),
    }
}

#[async_trait]
impl Driver for IliveDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        debug!("Initializing iLive driver");
        Ok(())
    }

    async fn execute(&self, action: &str, params: Vec<Value>) -> Result<()> {
        match action {
            "fader" => {
                let address = param_address(&params, 0)?;
                let db = param_number(&params, 2, "level")?;
                self.set_fader(address, db)?;
            }
            "adjust" => {
                let address = param_address(&params, 0)?;
                let delta = param_number(&params, 2, "delta")?;
                self.adjust_fader(address, delta)?;
            }
            "mute" => {
                let address = param_address(&params, 0)?;
                let muted = param_mute_state(params.get(2))?;
                self.set_mute(address, muted)?;
            }
            "scene" => {
                let scene = param_number(&params, 0, "scene")?;
                if scene.fract() != 0.0 {
                    return Err(BridgeError::InvalidParams(format!(
                        "scene must be a whole number, got {}",
                        scene
                    ))
                    .into());
                }
                self.recall_scene(scene.clamp(0.0, u16::MAX as f64) as u16)?;
            }
            "poll" => {
                self.poll_names();
            }
            _ => {
                warn!("Unknown iLive action: {}", action);
                return Err(BridgeError::UnknownAction(action.to_string()).into());
            }
        }
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        self.poll_names();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        debug!("Shutting down iLive driver");
        self.poller.stop();
        Ok(())
    }

    fn subscribe_state(&self, callback: StateCallback) {
        self.subscribe(callback);
    }

    fn connection_status(&self) -> ConnectionStatus {
        if self.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    fn subscribe_connection_status(&self, callback: StatusCallback) {
        callback(self.connection_status());
        self.status_callbacks.write().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::testing::RecordingSink;
    use crate::protocol::SYSEX_HEADER;
    use serde_json::json;

    fn driver() -> (IliveDriver, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let polling = PollingConfig {
            interval_secs: 0,
            ..PollingConfig::default()
        };
        (IliveDriver::new(sink.clone(), polling), sink)
    }

    fn addr(channel_type: ChannelType, index: u16) -> ChannelAddress {
        ChannelAddress::new(channel_type, index).unwrap()
    }

    fn recorder(driver: &IliveDriver) -> Arc<Mutex<Vec<StateChange>>> {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        driver.subscribe(Arc::new(move |change: StateChange| sink.lock().push(change)));
        changes
    }

    #[test]
    fn test_inbound_updates_store_and_notifies() {
        let (driver, _) = driver();
        let changes = recorder(&driver);

        let mut bytes = vec![0xFE, 0x90, 0x20, 0x7F];
        bytes.extend_from_slice(&[0xB0, 0x63, 0x21, 0x62, 0x17, 0x06, 0x6B]);
        bytes.extend_from_slice(&SYSEX_HEADER);
        bytes.extend_from_slice(&[0x02, 0x20, b'K', b'i', b'c', b'k', 0xF7]);

        // Split mid-message to exercise reassembly
        assert_eq!(driver.on_bytes_received(&bytes[..6]), 1);
        assert_eq!(driver.on_bytes_received(&bytes[6..]), 2);

        let ch1 = driver.channel_state(addr(ChannelType::Input, 1));
        assert!(ch1.muted);
        assert_eq!(ch1.name, "Kick");
        let ch2 = driver.channel_state(addr(ChannelType::Input, 2));
        assert!((ch2.fader_db - 0.0).abs() < 0.3);

        assert_eq!(
            *changes.lock(),
            vec![
                StateChange::Mute(addr(ChannelType::Input, 1)),
                StateChange::Fader(addr(ChannelType::Input, 2)),
                StateChange::Name(addr(ChannelType::Input, 1)),
            ]
        );
    }

    #[test]
    fn test_garbage_changes_nothing() {
        let (driver, _) = driver();
        assert_eq!(driver.on_bytes_received(&[0x12, 0x34, 0xB0, 0x01, 0x02]), 0);
        assert_eq!(
            driver.channel_state(addr(ChannelType::Input, 1)),
            ChannelState::default_for(ChannelType::Input)
        );
    }

    #[test]
    fn test_set_fader_sends_and_updates() {
        let (driver, sink) = driver();
        let address = addr(ChannelType::Mix, 1);
        driver.set_fader(address, 20.0).unwrap();

        assert_eq!(sink.sent(), vec![vec![0xB0, 0x63, 0x60, 0x62, 0x17, 0x06, 0x7F]]);
        assert_eq!(driver.channel_state(address).fader_db, 10.0);
    }

    #[test]
    fn test_adjust_fader_is_relative_and_clamped() {
        let (driver, _) = driver();
        let address = addr(ChannelType::Input, 4);
        assert_eq!(driver.adjust_fader(address, -3.0).unwrap(), -54.0);
        assert_eq!(driver.adjust_fader(address, 30.0).unwrap(), -24.0);
        assert_eq!(driver.adjust_fader(address, 50.0).unwrap(), 10.0);
    }

    #[test]
    fn test_mute_and_scene() {
        let (driver, sink) = driver();
        let changes = recorder(&driver);
        driver.set_mute(addr(ChannelType::Dca, 2), true).unwrap();
        driver.recall_scene(129).unwrap();

        assert_eq!(
            sink.sent(),
            vec![vec![0x90, 0x11, 0x7F], vec![0xB0, 0x00, 0x01, 0xC0, 0x00]]
        );
        assert_eq!(driver.current_scene(), Some(129));
        assert_eq!(changes.lock().last(), Some(&StateChange::Scene(129)));
        assert!(driver.recall_scene(251).is_err());
        assert_eq!(sink.sent().len(), 2);
    }

    #[test]
    fn test_failed_send_leaves_state_alone() {
        let (driver, sink) = driver();
        sink.close();
        let address = addr(ChannelType::Input, 1);
        assert!(matches!(
            driver.set_mute(address, true),
            Err(BridgeError::TransportClosed)
        ));
        assert!(!driver.channel_state(address).muted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_polls_and_disconnect_resets() {
        let (driver, sink) = driver();
        let changes = recorder(&driver);

        driver.on_connect();
        assert!(driver.is_connected());
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(sink.sent().len(), 128);

        driver.set_mute(addr(ChannelType::Input, 3), true).unwrap();
        driver.recall_scene(5).unwrap();
        driver.on_disconnect();

        assert!(!driver.is_connected());
        assert!(!driver.channel_state(addr(ChannelType::Input, 3)).muted);
        assert_eq!(driver.current_scene(), None);
        assert_eq!(changes.lock().last(), Some(&StateChange::Reset));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_while_disconnected_sends_nothing() {
        let (driver, sink) = driver();

        driver.execute("poll", vec![]).await.unwrap();
        driver.sync().await.unwrap();
        assert!(driver.poll_names().is_none());
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(sink.sent().is_empty());

        driver.on_connect();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        sink.clear();
        let handle = driver.poll_names().expect("connected driver polls");
        assert_eq!(handle.await.unwrap(), 128);
        assert_eq!(sink.sent().len(), 128);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_status_follows_transport() {
        let (driver, _) = driver();
        assert_eq!(driver.connection_status(), ConnectionStatus::Disconnected);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        driver.subscribe_connection_status(Arc::new(move |status: ConnectionStatus| {
            sink.lock().push(status)
        }));

        driver.on_connect();
        driver.on_connect();
        assert_eq!(driver.connection_status(), ConnectionStatus::Connected);
        driver.on_disconnect();
        assert_eq!(driver.connection_status(), ConnectionStatus::Disconnected);

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_actions() {
        let (driver, sink) = driver();

        driver.execute("fader", vec![json!("input"), json!(1), json!(0)]).await.unwrap();
        driver.execute("mute", vec![json!("mix"), json!("2"), json!("off")]).await.unwrap();
        driver.execute("mute", vec![json!("dca"), json!(1)]).await.unwrap();
        driver.execute("scene", vec![json!(1)]).await.unwrap();
        driver.execute("adjust", vec![json!("input"), json!(1), json!(-6)]).await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent[0], vec![0xB0, 0x63, 0x20, 0x62, 0x17, 0x06, 0x6B]);
        assert_eq!(sent[1], vec![0x90, 0x61, 0x3F]);
        assert_eq!(sent[2], vec![0x90, 0x10, 0x7F]);
        assert_eq!(sent[3], vec![0xB0, 0x00, 0x00, 0xC0, 0x00]);
        assert_eq!(driver.channel_state(addr(ChannelType::Input, 1)).fader_db, -6.0);
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_params() {
        let (driver, sink) = driver();

        assert!(driver.execute("fader", vec![json!("input"), json!(65), json!(0)]).await.is_err());
        assert!(driver.execute("fader", vec![json!("aux"), json!(1), json!(0)]).await.is_err());
        assert!(driver.execute("fader", vec![json!("input"), json!(1)]).await.is_err());
        assert!(driver.execute("mute", vec![json!("input"), json!(1.5)]).await.is_err());
        assert!(driver.execute("mute", vec![json!("input"), json!(1), json!("maybe")]).await.is_err());
        assert!(driver.execute("scene", vec![json!(0)]).await.is_err());
        assert!(driver.execute("scene", vec![json!(251)]).await.is_err());

        let err = driver.execute("solo", vec![]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::UnknownAction(_))
        ));
        assert!(sink.sent().is_empty());
    }
}
