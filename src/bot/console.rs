use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Settings;
use crate::gateway::{Affiliation, MemoryGateway};
use crate::handlers::RoomEvent;

const CONSOLE_NICK: &str = "console";

/// Make the console operator an owner of the control room.
///
/// Must run before startup so the first admin refresh sees it.
pub fn seed_operator(settings: &Settings, memory: &MemoryGateway) {
    match &settings.console_operator_jid {
        Some(jid) => {
            memory.set_affiliation(&settings.control_room, jid, Affiliation::Owner);
            info!("Console operator {} is owner of {}", jid, settings.control_room);
        }
        None => warn!("CONSOLE_OPERATOR_JID not set, console commands will be read-only"),
    }
}

/// Feed stdin into the bot as control-room traffic.
///
/// Plain lines are messages from the console operator. `/presence <room>
/// <nick> <jid>` simulates someone joining a room and `/outcast <room>
/// <jid> [reason]` a ban placed by a room moderator.
pub fn spawn_console(
    settings: Arc<Settings>,
    memory: Arc<MemoryGateway>,
    events: mpsc::UnboundedSender<RoomEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let control_room = settings.control_room.clone();
        let operator = RoomEvent::Presence {
            room: control_room.clone(),
            nick: CONSOLE_NICK.to_string(),
            jid: settings.console_operator_jid.clone(),
            affiliation: Affiliation::Owner,
            available: true,
        };
        if events.send(operator).is_err() {
            warn!("Event loop is gone, console not started");
            return;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            };
            let words: Vec<&str> = line.split_whitespace().collect();
            let event = match words.as_slice() {
                [] => continue,
                ["/presence", room, nick, jid] => {
                    memory.add_occupant(room, nick, jid);
                    RoomEvent::Presence {
                        room: room.to_string(),
                        nick: nick.to_string(),
                        jid: Some(jid.to_string()),
                        affiliation: Affiliation::None,
                        available: true,
                    }
                }
                ["/outcast", room, jid, reason @ ..] => {
                    let reason = reason.join(" ");
                    memory.add_outcast(room, jid, Some(reason.as_str()).filter(|r| !r.is_empty()));
                    println!("[{}] {} outcast locally", room, jid);
                    continue;
                }
                _ => RoomEvent::Message {
                    room: control_room.clone(),
                    nick: CONSOLE_NICK.to_string(),
                    body: line.clone(),
                },
            };
            if events.send(event).is_err() {
                warn!("Event loop is gone, closing console");
                break;
            }
        }
        info!("Console input closed");
    })
}
