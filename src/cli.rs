//! Command-line interface and REPL
//!
//! The REPL reads lines on its own thread and hands parsed commands to the
//! main loop, which executes them against the driver.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::drivers::{Driver, IliveDriver};
use crate::feedback;
use crate::protocol::address::{ChannelAddress, ChannelType};

/// A parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Driver action with positional params
    Action { action: String, params: Vec<Value> },
    /// Print one channel, or every channel of a type
    Show { channel_type: ChannelType, index: Option<u16> },
    Vars,
    Help,
    Quit,
}

fn usage(text: &str) -> String {
    format!("usage: {}", text)
}

/// Parse one input line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> std::result::Result<Option<Command>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let strings = |args: &[&str]| -> Vec<Value> {
        args.iter().map(|s| Value::String(s.to_string())).collect()
    };
    let action = |name: &str, params: Vec<Value>| -> std::result::Result<Option<Command>, String> {
        Ok(Some(Command::Action {
            action: name.to_string(),
            params,
        }))
    };

    match verb.to_ascii_lowercase().as_str() {
        "fader" if args.len() == 3 => action("fader", strings(args)),
        "fader" => Err(usage("fader <type> <channel> <dB>")),
        "adjust" if args.len() == 3 => action("adjust", strings(args)),
        "adjust" => Err(usage("adjust <type> <channel> <delta dB>")),
        "mute" if args.len() == 2 || args.len() == 3 => action("mute", strings(args)),
        "mute" => Err(usage("mute <type> <channel> [on|off]")),
        "unmute" if args.len() == 2 => {
            let mut params = strings(args);
            params.push(Value::String("off".to_string()));
            action("mute", params)
        }
        "unmute" => Err(usage("unmute <type> <channel>")),
        "scene" if args.len() == 1 => action("scene", strings(args)),
        "scene" => Err(usage("scene <1-250>")),
        "poll" => action("poll", Vec::new()),
        "show" if !args.is_empty() && args.len() <= 2 => {
            let channel_type: ChannelType = args[0].parse().map_err(|e: crate::error::BridgeError| e.to_string())?;
            let index = match args.get(1) {
                Some(s) => Some(
                    s.parse::<u16>()
                        .map_err(|_| format!("invalid channel '{}'", s))?,
                ),
                None => None,
            };
            Ok(Some(Command::Show { channel_type, index }))
        }
        "show" => Err(usage("show <type> [channel]")),
        "vars" => Ok(Some(Command::Vars)),
        "help" | "?" => Ok(Some(Command::Help)),
        "quit" | "exit" => Ok(Some(Command::Quit)),
        other => Err(format!("unknown command '{}' (try 'help')", other)),
    }
}

/// Start the REPL on a dedicated thread
///
/// Ctrl+C and Ctrl+D end the session with a `Quit` command. Without a
/// usable terminal the REPL is skipped and the bridge keeps running.
pub fn spawn_repl(tx: mpsc::Sender<Command>) -> Result<()> {
    std::thread::Builder::new()
        .name("repl".to_string())
        .spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    warn!("Interactive prompt unavailable: {}", e);
                    return;
                }
            };

            loop {
                match rl.readline("ilive> ") {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = rl.add_history_entry(line.as_str());
                        }
                        match parse_line(&line) {
                            Ok(Some(command)) => {
                                let quit = command == Command::Quit;
                                if tx.blocking_send(command).is_err() || quit {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(message) => println!("{}", message.yellow()),
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                        let _ = tx.blocking_send(Command::Quit);
                        break;
                    }
                    Err(e) => {
                        warn!("REPL error: {}", e);
                        let _ = tx.blocking_send(Command::Quit);
                        break;
                    }
                }
            }
        })?;

    Ok(())
}

/// Execute a command; returns false when the session should end
pub async fn handle_command(driver: &IliveDriver, command: Command) -> bool {
    match command {
        Command::Action { action, params } => {
            if let Err(e) = driver.execute(&action, params).await {
                println!("{}", format!("✗ {}", e).red());
            }
        }
        Command::Show { channel_type, index } => match index {
            Some(index) => match ChannelAddress::new(channel_type, index) {
                Ok(address) => print_channel(driver, address),
                Err(e) => println!("{}", format!("✗ {}", e).red()),
            },
            None => {
                for address in ChannelAddress::iter_type(channel_type) {
                    print_channel(driver, address);
                }
            }
        },
        Command::Vars => {
            let store = driver.store();
            let vars = feedback::all_variables(&store.lock());
            for (id, value) in vars {
                println!("  {:20} {}", id.cyan(), value);
            }
        }
        Command::Help => print_help(),
        Command::Quit => return false,
    }
    true
}

fn print_channel(driver: &IliveDriver, address: ChannelAddress) {
    let state = driver.channel_state(address);
    let name = if state.name.is_empty() {
        "-".dimmed()
    } else {
        state.name.bright_white()
    };
    let mute = if state.muted {
        "MUTED".red().bold()
    } else {
        "on".green()
    };
    println!(
        "  {:14} {:10} {:>6} dB  {}",
        address.to_string(),
        name,
        feedback::format_db(state.fader_db),
        mute
    );
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  fader <type> <channel> <dB>      set fader (-54 to +10 dB)");
    println!("  adjust <type> <channel> <dB>     move fader relative to its position");
    println!("  mute <type> <channel> [on|off]   mute (default) or unmute");
    println!("  unmute <type> <channel>");
    println!("  scene <1-250>                    recall a scene");
    println!("  poll                             refresh channel names now");
    println!("  show <type> [channel]            print channel state");
    println!("  vars                             print all variables");
    println!("  quit");
    println!(
        "{}",
        "Types: input (ch), fx_send, fx_return, mix, dca".dimmed()
    );
}
