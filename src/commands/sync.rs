use chrono::{DateTime, Utc};
use tracing::warn;

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::services::enforcement::{reconcile, SyncMode};
use crate::utils::formatting::format_sync_report;

/// Rejoin every protected room, then enforce active bans in them
pub async fn sync(data: &Data, now: DateTime<Utc>) -> Result<String, Error> {
    let rooms = data.registry.list_rooms().await?;
    let nick = data.settings.snapshot().bot_nick.clone();
    let gateway = data.gateway();

    let mut join_failures = Vec::new();
    for room in &rooms {
        if let Err(e) = gateway.join(room, &nick).await {
            warn!("Could not rejoin {}: {}", room, e);
            join_failures.push(format!("{} ({})", room, e));
        }
    }

    let report = reconcile(data, SyncMode::EnforceOnly, now).await?;
    let mut reply = format_sync_report(&report);
    if !join_failures.is_empty() {
        reply.push_str(&format!("\nRejoin failed: {}", join_failures.join(", ")));
    }
    Ok(reply)
}

/// Full two-way reconciliation
pub async fn sync_bans(data: &Data, now: DateTime<Utc>) -> Result<String, Error> {
    let report = reconcile(data, SyncMode::Full, now).await?;
    Ok(format_sync_report(&report))
}

pub async fn sync_admins(data: &Data) -> Result<String, Error> {
    let count = data
        .admins
        .refresh(&data.gateway(), &data.control_room())
        .await?;
    Ok(format!("✅ Admin list refreshed: {} admins", count))
}
