//! Console traffic sniffer for debugging
//!
//! Connects to the console like the bridge does, but only prints what the
//! console sends: each received chunk as hex, followed by the events the
//! decoder recognized in it.

use anyhow::Result;
use chrono::Local;
use colored::*;
use tokio::sync::mpsc;

use crate::config::ConsoleConfig;
use crate::drivers::{ConnectionEvent, ConsoleConnection};
use crate::protocol::decoder::{DecodedEvent, StreamDecoder};
use crate::protocol::format_hex;

/// Run the sniffer until Ctrl+C
pub async fn run_sniffer(config: ConsoleConfig) -> Result<()> {
    println!("{}", "=== iLive Sniffer ===".bold().cyan());
    println!("Console: {}", config.address().bright_white());
    println!("Press Ctrl+C to exit\n");
    println!("{}", "Format: [time] +bytes | HEX".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    let (events_tx, mut events_rx) = mpsc::channel(1000);
    let connection = ConsoleConnection::spawn(config, events_tx);
    let mut decoder = StreamDecoder::new();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => match event {
                ConnectionEvent::Connected => {
                    decoder.clear();
                    println!("{} {}", timestamp(), "connected".green().bold());
                }
                ConnectionEvent::Disconnected { reason } => {
                    println!("{} {} ({})", timestamp(), "disconnected".red().bold(), reason);
                }
                ConnectionEvent::Data(bytes) => {
                    println!("{} +{:<4} | {}", timestamp(), bytes.len(), format_hex(&bytes).bright_black());
                    decoder.feed(&bytes);
                    for event in decoder.events() {
                        println!("{:>20} => {}", "", colorize(&event));
                    }
                }
            },
            _ = &mut shutdown => break,
        }
    }

    connection.shutdown().await;
    let stats = decoder.stats();
    println!(
        "\n{} {} messages, {} keepalives, {} resyncs, {} unrecognized, {} discarded",
        "Sniffer stopped:".yellow(),
        stats.messages,
        stats.keepalives,
        stats.resyncs,
        stats.unrecognized,
        stats.discarded
    );
    Ok(())
}

fn timestamp() -> ColoredString {
    format!("[{}]", Local::now().format("%H:%M:%S%.3f")).dimmed()
}

/// One-line description of a decoded event
pub fn describe_event(event: &DecodedEvent) -> String {
    match event {
        DecodedEvent::MuteChanged { address, muted } => {
            format!("{} {}", address, if *muted { "muted" } else { "unmuted" })
        }
        DecodedEvent::FaderChanged { address, db } => format!("{} fader {:.1} dB", address, db),
        DecodedEvent::NameReceived { address, name } => format!("{} name \"{}\"", address, name),
        DecodedEvent::Unrecognized { raw } => format!("unrecognized {}", format_hex(raw)),
    }
}

fn colorize(event: &DecodedEvent) -> ColoredString {
    let text = describe_event(event);
    match event {
        DecodedEvent::MuteChanged { .. } => text.bright_green(),
        DecodedEvent::FaderChanged { .. } => text.bright_yellow(),
        DecodedEvent::NameReceived { .. } => text.bright_magenta(),
        DecodedEvent::Unrecognized { .. } => text.bright_black(),
    }
}
