//! iLive Bridge
//!
//! Connects to an Allen & Heath iLive console, mirrors its channel state and
//! accepts fader, mute and scene commands from an interactive prompt.

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ilive_bridge::cli;
use ilive_bridge::config::{AppConfig, ConfigWatcher};
use ilive_bridge::drivers::{
    ConnectionEvent, ConnectionStatus, ConsoleConnection, Driver, IliveDriver,
};
use ilive_bridge::feedback::FeedbackMonitor;
use ilive_bridge::sniffer;
use ilive_bridge::state::StateChange;

/// iLive Bridge - Control an Allen & Heath iLive console over TCP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Console host, overrides console.host from the config file
    #[arg(long, env = "ILIVE_HOST")]
    host: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run in sniffer mode
    #[arg(long)]
    sniffer: bool,

    /// Run without the interactive prompt
    #[arg(long)]
    no_repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting iLive Bridge v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Handle sniffer mode
    if args.sniffer {
        let mut config = AppConfig::load(&args.config).await?;
        apply_overrides(&mut config, &args);
        return sniffer::run_sniffer(config.console).await;
    }

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let mut config = (*initial_config).clone();
    apply_overrides(&mut config, &args);

    run_app(config, &args, config_watcher, shutdown_signal()).await?;

    info!("iLive Bridge shutdown complete");
    Ok(())
}

/// Command line values take precedence over the config file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.console.host = host.clone();
    }
}

async fn run_app(
    mut config: AppConfig,
    args: &Args,
    mut config_watcher: ConfigWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    // Transport events from the console connection
    let (events_tx, mut events_rx) = mpsc::channel::<ConnectionEvent>(1000);
    let connection = Arc::new(ConsoleConnection::spawn(config.console.clone(), events_tx));
    connection.subscribe_status(Arc::new(|status: ConnectionStatus| {
        debug!("Console connection status: {}", status)
    }));

    let driver = Arc::new(IliveDriver::new(connection.clone(), config.polling.clone()));
    driver.init().await?;
    let store = driver.store();
    let monitor = Arc::new(Mutex::new(FeedbackMonitor::new(&config.feedbacks, &store.lock())));
    info!("Watching {} feedback(s)", monitor.lock().len());
    {
        let monitor = monitor.clone();
        driver.subscribe_state(Arc::new(move |change: StateChange| {
            debug!("State change: {:?}", change);
            let store = store.lock();
            for (feedback, value) in monitor.lock().on_change(&store, change) {
                info!("💡 Feedback '{}' → {}", feedback, if value { "on" } else { "off" });
            }
        }));
    }
    driver.subscribe_connection_status(Arc::new(|status: ConnectionStatus| {
        debug!("Driver status: {}", status)
    }));
    info!("Registered driver: {}", driver.name());

    // Commands from the interactive prompt
    let (repl_tx, mut repl_rx) = mpsc::channel::<cli::Command>(16);
    if args.no_repl {
        drop(repl_tx);
    } else {
        cli::spawn_repl(repl_tx)?;
        info!("Type 'help' for a list of commands");
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Console traffic and connection changes
            Some(event) = events_rx.recv() => match event {
                ConnectionEvent::Connected => driver.on_connect(),
                ConnectionEvent::Data(bytes) => {
                    driver.on_bytes_received(&bytes);
                }
                ConnectionEvent::Disconnected { reason } => {
                    debug!("Console disconnected: {}", reason);
                    driver.on_disconnect();
                }
            },

            // Interactive commands
            Some(command) = repl_rx.recv() => {
                if !cli::handle_command(&driver, command).await {
                    info!("Quit requested, stopping event loop");
                    break;
                }
            }

            // Handle config reload
            Some(mut new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                apply_overrides(&mut new_config, args);

                if new_config.console != config.console {
                    connection.reconfigure(new_config.console.clone());
                }
                if new_config.polling != config.polling {
                    driver.reconfigure_polling(new_config.polling.clone());
                } else if let Err(e) = driver.sync().await {
                    warn!("⚠️  Driver sync after reload failed: {}", e);
                }
                if new_config.feedbacks != config.feedbacks {
                    let store = driver.store();
                    let fresh = FeedbackMonitor::new(&new_config.feedbacks, &store.lock());
                    *monitor.lock() = fresh;
                    info!("Watching {} feedback(s)", new_config.feedbacks.len());
                }

                config = new_config;
                info!("✅ Configuration reloaded");
            }

            // Handle shutdown signal
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    driver.shutdown().await?;
    connection.shutdown().await;

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
