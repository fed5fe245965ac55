use anyhow::Result;
use clap::Parser;
use log::{error, info, LevelFilter};
use std::env;
use std::sync::Arc;
use std::time::Duration;

mod utils;

use nuntius::api::{BackendConfig, HttpBackend, IdentityClaim};
use nuntius::models::DeliveryStatus;
use nuntius::session::{self, Session};
use nuntius::sync::{SyncEngine, SyncEvent, DEFAULT_POLL_INTERVAL};

/// Command line arguments for Nuntius
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Nuntius: a CLI messenger client backed by polling sync.",
    long_about = "Nuntius is a command-line client for a one-to-one messenger.\n\n\
    The backend is reached purely through periodic polling; the client keeps\n\
    chats and timelines fresh in the background while you type."
)]
struct Args {
    /// Log file path (defaults to nuntius.log in the working directory)
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,

    /// Poll cadence in seconds
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Discard any saved session and log in again
    #[arg(long)]
    fresh: bool,
}

/// Prompts the user for a phone-based identity claim, preferring
/// environment variables
fn prompt_identity() -> Result<IdentityClaim> {
    let phone = match env::var("NUNTIUS_PHONE") {
        Ok(p) => p,
        Err(_) => {
            eprintln!("Enter phone number (e.g. +79990000000):");
            utils::read_line()?
        }
    };

    let name = match env::var("NUNTIUS_NAME") {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Enter display name:");
            utils::read_line()?
        }
    };

    Ok(IdentityClaim::Phone { phone, name })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_path = args.log_file.clone().unwrap_or_else(|| "nuntius.log".to_string());
    utils::setup_logging(Some(&log_path), LevelFilter::Debug)?;
    info!("Nuntius starting up");

    let backend = Arc::new(HttpBackend::new(BackendConfig::from_env())?);

    if args.fresh {
        session::clear_session()?;
    }

    // Restore a persisted session if there is one; otherwise authenticate
    // and persist the result.
    let session: Session = match session::load_session()? {
        Some(restored) => {
            println!("Welcome back, {}.", restored.user.name);
            restored
        }
        None => {
            let claim = prompt_identity()?;
            match session::authenticate(backend.as_ref(), &claim).await {
                Ok(fresh) => {
                    if let Err(e) = session::save_session(&fresh) {
                        eprintln!("Warning: failed to save session: {}", e);
                    }
                    println!("Logged in as {}.", fresh.user.name);
                    fresh
                }
                Err(e) => {
                    error!("Authentication failed: {}", e);
                    eprintln!("Authentication failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    };

    let (engine, mut events_rx) = SyncEngine::new(session, backend);
    let engine = Arc::new(engine);

    let interval = if args.interval == 0 {
        DEFAULT_POLL_INTERVAL
    } else {
        Duration::from_secs(args.interval)
    };
    engine.start(interval).await;

    // Print sync notifications as they arrive; the command loop below
    // stays free to read stdin.
    let printer_engine = engine.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                SyncEvent::TimelineUpdated(chat_id) => {
                    if printer_engine.active_chat().await.as_deref() == Some(chat_id.as_str()) {
                        if let Some(last) = printer_engine.timeline(&chat_id).await.last() {
                            let who = if last.is_sent { "you" } else { "them" };
                            let marker = match last.delivery_status {
                                DeliveryStatus::Pending => " …",
                                DeliveryStatus::Failed => " ✗",
                                DeliveryStatus::Read => " ✓✓",
                                _ => "",
                            };
                            println!("[{}] {}: {}{}", last.timestamp, who, last.text, marker);
                        }
                    }
                }
                SyncEvent::MessageFailed { chat_id, .. } => {
                    println!("! send failed in chat {} (kept for retry)", chat_id);
                }
                SyncEvent::ChatBlocked(chat_id) => {
                    println!("Chat {} blocked.", chat_id);
                }
                SyncEvent::ChatsUpdated => {}
            }
        }
    });

    print_help();

    loop {
        let line = tokio::task::spawn_blocking(utils::read_line).await??;
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.splitn(2, ' ');
            let command = parts.next().unwrap_or("");
            let argument = parts.next().unwrap_or("").trim();

            match command {
                "chats" => {
                    for chat in engine.chats().await {
                        let flags = format!(
                            "{}{}{}",
                            if chat.is_online { "*" } else { " " },
                            if chat.is_typing { "~" } else { " " },
                            if chat.is_blocked { "B" } else { " " },
                        );
                        println!(
                            "{} [{}] {}: {} ({} unread)",
                            chat.id, flags, chat.name, chat.last_message, chat.unread
                        );
                    }
                }
                "open" => {
                    if argument.is_empty() {
                        eprintln!("Usage: /open <chat id>");
                        continue;
                    }
                    engine.select_chat(Some(argument)).await;
                    for msg in engine.timeline(argument).await {
                        let who = if msg.is_sent { "you" } else { "them" };
                        println!("[{}] {}: {}", msg.timestamp, who, msg.text);
                    }
                }
                "close" => engine.select_chat(None).await,
                "add" => {
                    if argument.is_empty() {
                        eprintln!("Usage: /add <phone>");
                        continue;
                    }
                    match engine.create_chat(argument).await {
                        Ok(chat) => println!("Chat ready: {} ({})", chat.name, chat.id),
                        Err(e) => eprintln!("Could not add contact: {}", e),
                    }
                }
                "block" => match engine.active_chat().await {
                    Some(chat_id) => {
                        if let Err(e) = engine.block_chat(&chat_id).await {
                            eprintln!("Block failed: {}", e);
                        }
                    }
                    None => eprintln!("Open a chat first."),
                },
                "name" => {
                    if argument.is_empty() {
                        eprintln!("Usage: /name <display name>");
                        continue;
                    }
                    let mut user = engine.user().await;
                    user.name = argument.to_string();
                    if let Err(e) = engine.update_profile(user).await {
                        eprintln!("Profile update failed: {}", e);
                    }
                }
                "logout" => {
                    session::clear_session()?;
                    break;
                }
                "quit" | "q" => break,
                _ => print_help(),
            }
            continue;
        }

        // Any non-command line is an outgoing message for the open chat.
        match engine.active_chat().await {
            Some(chat_id) => {
                if let Err(e) = engine.send_message(&chat_id, &line, None).await {
                    eprintln!("Send failed: {} (message kept, retry by resending)", e);
                }
            }
            None => eprintln!("No chat open. Use /chats and /open <id>."),
        }
    }

    engine.shutdown().await;
    printer.abort();
    println!("Chat session ended.");
    Ok(())
}

fn print_help() {
    println!(
        "Commands: /chats, /open <id>, /close, /add <phone>, /block, /name <name>, /logout, /quit.\n\
         Anything else is sent to the open chat."
    );
}
