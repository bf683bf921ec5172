use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::services::enforcement::{reconcile_rooms, SyncMode};
use crate::utils::formatting::format_sync_report;
use crate::utils::jid::{bare_jid, is_jid_shaped};

fn check_room(room: &str) -> Result<String, Error> {
    if !is_jid_shaped(room) {
        return Err(Error::invalid(format!("'{}' is not a room address", room)));
    }
    Ok(bare_jid(room))
}

/// Protect a room: persist it, join it, and push active bans into it
pub async fn add(data: &Data, room: &str, now: DateTime<Utc>) -> Result<String, Error> {
    let room = check_room(room)?;
    if room == bare_jid(&data.control_room()) {
        return Err(Error::invalid("the control room cannot be a protected room"));
    }

    if !data.registry.add_room(&room).await? {
        return Ok(format!("{} is already protected.", room));
    }
    info!("Added protected room {}", room);

    let nick = data.settings.snapshot().bot_nick.clone();
    if let Err(e) = data.gateway().join(&room, &nick).await {
        warn!("Could not join new protected room {}: {}", room, e);
        return Ok(format!(
            "⚠️ Added protection for {} but joining failed ({}); run !sync to retry",
            room, e
        ));
    }

    let report = reconcile_rooms(data, &[room.clone()], SyncMode::EnforceOnly, now).await?;
    Ok(format!(
        "✅ Added protection for {}\n{}",
        room,
        format_sync_report(&report)
    ))
}

/// Stop protecting a room. Bans already placed there stay.
pub async fn remove(data: &Data, room: &str) -> Result<String, Error> {
    let room = check_room(room)?;

    if !data.registry.remove_room(&room).await? {
        return Ok(format!("{} was not protected.", room));
    }
    info!("Removed protected room {}", room);

    if let Err(e) = data.gateway().leave(&room).await {
        warn!("Could not leave {}: {}", room, e);
    }
    Ok(format!("♻️ Removed protection for {}", room))
}

pub async fn list(data: &Data) -> Result<String, Error> {
    let rooms = data.registry.list_rooms().await?;
    if rooms.is_empty() {
        return Ok("No protected rooms.".to_string());
    }
    Ok(rooms.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BanRecord, BanSubject, Expiry};
    use crate::test_support::{harness, CONTROL_ROOM, ROOM_A, ROOM_B};

    #[tokio::test]
    async fn test_new_room_gets_existing_bans() {
        let (data, memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        data.registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_jid("bob@example.org"),
                Expiry::Permanent,
                "carol@example.org",
                None,
                now,
            ))
            .await
            .unwrap();

        let reply = add(&data, ROOM_B, now).await.unwrap();

        assert!(reply.starts_with("✅ Added protection"));
        assert!(memory.is_joined(ROOM_B));
        assert_eq!(memory.outcasts(ROOM_B), vec!["bob@example.org"]);
        assert_eq!(data.registry.list_rooms().await.unwrap(), vec![ROOM_A, ROOM_B]);
    }

    #[tokio::test]
    async fn test_remove_persists_and_leaves() {
        let (data, memory) = harness(&[ROOM_A]).await;

        remove(&data, ROOM_A).await.unwrap();

        assert!(data.registry.list_rooms().await.unwrap().is_empty());
        assert!(!memory.is_joined(ROOM_A));
        assert_eq!(remove(&data, ROOM_A).await.unwrap(), format!("{} was not protected.", ROOM_A));
    }

    #[tokio::test]
    async fn test_rejects_bad_addresses() {
        let (data, _memory) = harness(&[]).await;
        assert!(add(&data, "lobby", Utc::now()).await.is_err());
        assert!(add(&data, CONTROL_ROOM, Utc::now()).await.is_err());
    }
}
