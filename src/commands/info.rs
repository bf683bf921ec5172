use chrono::{DateTime, Utc};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::constants::timeouts::human_time;
use crate::services::identity::Resolution;
use crate::utils::formatting::{format_ban_line, format_ban_list};

pub async fn ban_list(data: &Data, now: DateTime<Utc>) -> Result<String, Error> {
    let records = data.registry.list_active(now).await?;
    Ok(format_ban_list(&records, now, "No active bans."))
}

pub async fn ban_search(data: &Data, query: &str, now: DateTime<Utc>) -> Result<String, Error> {
    let records = data.registry.search(query, now).await?;
    Ok(format_ban_list(
        &records,
        now,
        &format!("No active bans matching '{}'.", query),
    ))
}

/// Explain the ban on a subject. An unknown subject is not an error.
pub async fn why(data: &Data, subject: &str, now: DateTime<Utc>) -> Result<String, Error> {
    let resolution = data.identities.resolve(subject);
    let record = data.registry.find(&resolution.clone().into_subject()).await?;

    Ok(match record {
        Some(record) => {
            let mut reply = format_ban_line(&record, now);
            reply.push_str(&format!(
                "\nissued {}",
                record.created_at.format("%Y-%m-%d %H:%M UTC")
            ));
            reply
        }
        None => match resolution {
            Resolution::Jid { jid, .. } => format!("No ban found for {}.", jid),
            Resolution::Unresolved { nick } => format!("No ban found for {} (nick not seen).", nick),
        },
    })
}

pub async fn status(data: &Data, now: DateTime<Utc>) -> Result<String, Error> {
    let rooms = data.registry.list_rooms().await?;
    let active = data.registry.count_active(now).await?;
    let ago = |at: DateTime<Utc>| format!("{} ago", human_time((now - at).num_seconds().max(1)));
    let last_sync = data.last_sync().map(ago).unwrap_or_else(|| "never".to_string());
    let admins_refreshed = data
        .admins
        .refreshed_at()
        .map(ago)
        .unwrap_or_else(|| "never".to_string());

    Ok(format!(
        "✅ Bot is online and healthy.\nuptime: {}\nprotected rooms: {}\nactive bans: {}\nknown admins: {} (refreshed {})\nlast sync: {}",
        human_time(data.started_at.elapsed().as_secs().max(1) as i64),
        rooms.len(),
        active,
        data.admins.len(),
        admins_refreshed,
        last_sync
    ))
}

pub fn who_am_i(data: &Data, room: &str, nick: &str) -> String {
    match data.identities.occupant(room, nick) {
        Some(occupant) => {
            let jid = occupant.jid.unwrap_or_else(|| "unknown JID".to_string());
            let admin = data.admins.is_admin(&jid);
            format!(
                "You are {} ({}), {}",
                jid,
                occupant.affiliation.as_str(),
                if admin { "bot admin" } else { "not a bot admin" }
            )
        }
        None => "You are none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;

    #[tokio::test]
    async fn test_why_unknown_nick_is_not_found() {
        let (data, _memory) = harness(&[]).await;
        let reply = why(&data, "alice", Utc::now()).await.unwrap();
        assert_eq!(reply, "No ban found for alice (nick not seen).");
    }

    #[tokio::test]
    async fn test_empty_ban_list() {
        let (data, _memory) = harness(&[]).await;
        assert_eq!(ban_list(&data, Utc::now()).await.unwrap(), "No active bans.");
    }

    #[tokio::test]
    async fn test_status_reports_admin_refresh() {
        let (data, _memory) = harness(&[]).await;
        let reply = status(&data, Utc::now()).await.unwrap();
        assert!(reply.contains("known admins: 1 (refreshed "), "{}", reply);
        assert!(reply.contains("last sync: never"));
    }
}

