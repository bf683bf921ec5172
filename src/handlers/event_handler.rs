use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::bot::data::Data;
use crate::commands;
use crate::gateway::Affiliation;

/// Something that happened in a joined room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Presence {
        room: String,
        nick: String,
        /// Real JID, when the room exposes it to the bot
        jid: Option<String>,
        affiliation: Affiliation,
        available: bool,
    },
    Message {
        room: String,
        nick: String,
        body: String,
    },
}

pub async fn event_handler(data: &Arc<Data>, event: RoomEvent) {
    match event {
        RoomEvent::Presence {
            room,
            nick,
            jid,
            affiliation,
            available,
        } => {
            if available {
                debug!("Presence: {} in {} as {:?} ({})", nick, room, jid, affiliation.as_str());
                data.identities
                    .observe(&room, &nick, jid.as_deref(), affiliation);
            } else {
                debug!("{} left {}", nick, room);
                data.identities.departed(&room, &nick);
            }
        }

        RoomEvent::Message { room, nick, body } => {
            if nick == data.settings.snapshot().bot_nick {
                return;
            }
            debug!("Message from {} (room={}): {}", nick, room, body);

            if let Some(reply) = commands::dispatch(data, &room, &nick, &body, Utc::now()).await {
                if let Err(e) = data.gateway().send_message(&room, &reply).await {
                    warn!("Could not reply in {}: {}", room, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, CONTROL_ROOM};

    #[tokio::test]
    async fn test_presence_then_command() {
        let (data, memory) = harness(&[]).await;

        event_handler(
            &data,
            RoomEvent::Presence {
                room: CONTROL_ROOM.to_string(),
                nick: "dave".to_string(),
                jid: Some("dave@example.org/home".to_string()),
                affiliation: Affiliation::Member,
                available: true,
            },
        )
        .await;
        event_handler(
            &data,
            RoomEvent::Message {
                room: CONTROL_ROOM.to_string(),
                nick: "dave".to_string(),
                body: "!whoami".to_string(),
            },
        )
        .await;

        let sent = memory.take_sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, CONTROL_ROOM);
        assert_eq!(sent[0].1, "You are dave@example.org (member), not a bot admin");
    }

    #[tokio::test]
    async fn test_own_messages_are_ignored() {
        let (data, memory) = harness(&[]).await;
        event_handler(
            &data,
            RoomEvent::Message {
                room: CONTROL_ROOM.to_string(),
                nick: "banbot".to_string(),
                body: "!help".to_string(),
            },
        )
        .await;
        assert!(memory.take_sent_messages().is_empty());
    }
}
