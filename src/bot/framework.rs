use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::handlers::{event_handler, RoomEvent};
use crate::services::enforcement::{reconcile, SyncMode, SyncReport};
use crate::services::expiry::spawn_expiry_scheduler;
use crate::utils::formatting::format_sync_report;

/// Bring the bot into a working state, once, before events are handled.
///
/// Joins the control room (fatal on failure), loads the admin list, joins
/// every protected room and pushes active bans into them. Unknown room
/// outcasts are left alone here; adopting them takes an explicit
/// `!syncbans`.
pub async fn startup(data: &Data) -> Result<SyncReport, Error> {
    let settings = data.settings.snapshot();
    let gateway = data.gateway();

    gateway
        .join(&settings.control_room, &settings.bot_nick)
        .await?;
    info!("Joined control room {}", settings.control_room);

    if let Err(e) = data.admins.refresh(&gateway, &settings.control_room).await {
        warn!("Could not load admins, run !syncadmins once the room is reachable: {}", e);
    }

    for room in data.registry.list_rooms().await? {
        match gateway.join(&room, &settings.bot_nick).await {
            Ok(()) => info!("Joined protected room {}", room),
            Err(e) => warn!("Could not join protected room {}: {}", room, e),
        }
    }

    let report = reconcile(data, SyncMode::EnforceOnly, Utc::now()).await?;
    if report.action_count() > 0 || !report.is_clean() {
        let body = format!("Startup: {}", format_sync_report(&report));
        if let Err(e) = gateway.send_message(&settings.control_room, &body).await {
            warn!("Could not post startup report: {}", e);
        }
    }

    Ok(report)
}

/// Run until the event stream closes
pub async fn run(data: Arc<Data>, mut events: mpsc::UnboundedReceiver<RoomEvent>) -> Result<(), Error> {
    startup(&data).await?;

    let scheduler = spawn_expiry_scheduler(data.clone());
    info!("Started expiry scheduler");

    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::Presence { .. } => event_handler(&data, event).await,
            RoomEvent::Message { .. } => {
                // commands may wait on rooms; keep presence flowing meanwhile
                let data = data.clone();
                tokio::spawn(async move {
                    event_handler(&data, event).await;
                });
            }
        }
    }

    scheduler.abort();
    error!("Room event stream closed");
    Ok(())
}

/// Re-read settings from the environment on every SIGHUP.
///
/// A failed reload keeps the running snapshot.
#[cfg(unix)]
pub fn spawn_reload_listener(data: Arc<Data>) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use crate::config::Settings;
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            dotenvy::dotenv().ok();
            match Settings::from_env() {
                Ok(settings) => {
                    let current = data.settings.snapshot();
                    if settings.database_url != current.database_url {
                        warn!("DATABASE_URL changes need a restart, keeping {}", current.database_url);
                    }
                    info!(
                        "Reloaded settings: expiry check every {}s, gateway timeout {}s",
                        settings.expiry_check_interval.as_secs(),
                        settings.gateway_timeout.as_secs()
                    );
                    data.settings.replace(settings);
                }
                Err(e) => error!("Settings reload failed, keeping current settings: {}", e),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BanRecord, BanSubject, Expiry};
    use crate::test_support::{harness, ROOM_A};

    #[tokio::test]
    async fn test_startup_enforces_without_importing() {
        let (data, memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        memory.add_outcast(ROOM_A, "eve@example.org", None);
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

        let report = startup(&data).await.unwrap();

        assert_eq!(report.room(ROOM_A).unwrap().applied, vec!["bob@example.org"]);
        assert_eq!(data.registry.list_all().await.unwrap().len(), 1);
        assert!(data.admins.is_admin("carol@example.org"));
    }
}
