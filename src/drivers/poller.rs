//! Name poll sequencer
//!
//! The console only reports channel names when asked, one sysex request per
//! channel. A sweep walks every channel group in a fixed order, pacing the
//! requests so the console's input buffer keeps up.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::OutboundSink;
use crate::config::PollingConfig;
use crate::protocol::address::{ChannelAddress, ChannelType};
use crate::protocol::encoder;

/// Channel groups of one sweep, in request order
///
/// Inputs are limited to `max_input_channel`; every other type is swept in
/// full.
pub fn sweep_groups(max_input_channel: u8) -> Vec<(ChannelType, Vec<ChannelAddress>)> {
    ChannelType::all()
        .iter()
        .map(|&channel_type| {
            let addresses = ChannelAddress::iter_type(channel_type)
                .filter(|addr| {
                    channel_type != ChannelType::Input || addr.index() <= max_input_channel
                })
                .collect();
            (channel_type, addresses)
        })
        .collect()
}

/// Clears the in-flight flag when a sweep ends or is aborted
struct SweepGuard(Arc<AtomicBool>);

impl SweepGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard(flag.clone()))
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run one sweep, returning the number of requests sent
///
/// Returns 0 without sending anything if another sweep holds `in_flight`.
async fn sweep(
    sink: Arc<dyn OutboundSink>,
    settings: PollingConfig,
    in_flight: Arc<AtomicBool>,
) -> usize {
    let Some(_guard) = SweepGuard::acquire(&in_flight) else {
        debug!("Name poll already running, skipping");
        return 0;
    };

    let mut sent = 0;
    for (i, (channel_type, addresses)) in sweep_groups(settings.max_input_channel)
        .into_iter()
        .enumerate()
    {
        if i > 0 {
            sleep(settings.group_delay()).await;
        }
        debug!("Polling {} names (1-{})", channel_type.label(), addresses.len());

        for address in addresses {
            if let Err(e) = sink.send_raw(encoder::name_request(address)) {
                warn!("Name poll aborted: {}", e);
                return sent;
            }
            sent += 1;
            sleep(settings.request_delay()).await;
        }
    }

    debug!("Channel name poll complete ({} requests)", sent);
    sent
}

/// Schedules name sweeps while the console is connected
pub struct NamePoller {
    sink: Arc<dyn OutboundSink>,
    settings: RwLock<PollingConfig>,
    /// Replaced on stop so aborted sweeps cannot block new ones
    in_flight: Mutex<Arc<AtomicBool>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    on_demand: Mutex<Option<AbortHandle>>,
    active: AtomicBool,
}

impl NamePoller {
    pub fn new(sink: Arc<dyn OutboundSink>, settings: PollingConfig) -> Self {
        Self {
            sink,
            settings: RwLock::new(settings),
            in_flight: Mutex::new(Arc::new(AtomicBool::new(false))),
            periodic: Mutex::new(None),
            on_demand: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> PollingConfig {
        self.settings.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Sweep now, then keep sweeping at the configured interval
    ///
    /// The interval is measured from the end of one sweep to the start of the
    /// next. Restarts the schedule if it is already running.
    pub fn start(&self) {
        self.stop();
        self.active.store(true, Ordering::Release);

        let settings = self.settings();
        let sink = self.sink.clone();
        let in_flight = self.in_flight.lock().clone();

        match settings.interval() {
            Some(interval) => info!("📛 Polling channel names every {:?}", interval),
            None => info!("📛 Polling channel names once (periodic polling disabled)"),
        }

        let handle = tokio::spawn(async move {
            sweep(sink.clone(), settings.clone(), in_flight.clone()).await;
            let Some(interval) = settings.interval() else {
                return;
            };
            loop {
                sleep(interval).await;
                sweep(sink.clone(), settings.clone(), in_flight.clone()).await;
            }
        });
        *self.periodic.lock() = Some(handle);
    }

    /// Cancel the schedule and any sweep in progress
    pub fn stop(&self) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if let Some(handle) = self.periodic.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.on_demand.lock().take() {
            handle.abort();
        }
        *self.in_flight.lock() = Arc::new(AtomicBool::new(false));
        if was_active {
            debug!("Name polling stopped");
        }
    }

    /// Run a single sweep outside the schedule
    ///
    /// Skipped if a sweep is already in flight.
    pub fn poll_now(&self) -> JoinHandle<usize> {
        let sink = self.sink.clone();
        let settings = self.settings();
        let in_flight = self.in_flight.lock().clone();
        let handle = tokio::spawn(sweep(sink, settings, in_flight));
        *self.on_demand.lock() = Some(handle.abort_handle());
        handle
    }

    /// Apply new settings, restarting the schedule if it is running
    pub fn reconfigure(&self, settings: PollingConfig) {
        if *self.settings.read() == settings {
            return;
        }
        *self.settings.write() = settings;
        if self.is_active() {
            info!("Polling settings changed, restarting name poll");
            self.start();
        }
    }
}

impl Drop for NamePoller {
    fn drop(&mut self) {
        self.stop();
    }
}
