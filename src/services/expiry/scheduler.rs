use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::db::models::BanRecord;
use crate::services::enforcement::fanout::{self, RoomFailure};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Bans lifted everywhere and removed from the registry
    pub lifted: Vec<String>,
    /// Bans kept for the next tick because some room failed
    pub retained: Vec<(String, Vec<RoomFailure>)>,
    /// Bans re-issued while their lift was running, pushed back out
    pub reissued: Vec<String>,
}

impl ExpiryReport {
    pub fn is_empty(&self) -> bool {
        self.lifted.is_empty() && self.retained.is_empty() && self.reissued.is_empty()
    }
}

/// Start the background task that lifts expired bans
pub fn spawn_expiry_scheduler(data: Arc<Data>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut period = data.settings.snapshot().expiry_check_interval;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match run_expiry_pass(&data, Utc::now()).await {
                Ok(report) if !report.is_empty() => notify_control_room(&data, &report).await,
                Ok(_) => {}
                Err(e) => error!("Error lifting expired bans: {:?}", e),
            }

            // pick up a reloaded interval
            let configured = data.settings.snapshot().expiry_check_interval;
            if configured != period {
                info!("Expiry check interval changed to {:?}", configured);
                period = configured;
                ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
            }
        }
    })
}

/// Lift every ban that has run out at `now`.
///
/// A ban is deleted only after every protected room accepted the unban;
/// otherwise it stays and the next pass tries again. Deleting a ban a
/// manual `!unban` already removed is a no-op. A ban re-issued while the
/// lift was in flight is kept and applied again.
pub async fn run_expiry_pass(data: &Data, now: DateTime<Utc>) -> Result<ExpiryReport, Error> {
    let _pass = data.pass_lock.lock().await;
    let mut report = ExpiryReport::default();

    let expired = data.registry.list_expired(now).await?;
    if expired.is_empty() {
        return Ok(report);
    }
    let rooms = data.registry.list_rooms().await?;
    debug!("{} expired bans to lift across {} rooms", expired.len(), rooms.len());

    for record in expired {
        let Some(target) = data.identities.target_for(&record.subject) else {
            continue;
        };

        let fanout = fanout::lift_ban(data, &rooms, &target).await;
        if fanout.is_complete() {
            if data.registry.delete_expired(&record.key(), now).await? {
                info!("Ban on {} expired and was lifted", record.subject);
                report.lifted.push(record.subject.to_string());
            } else if let Some(current) = data.registry.find(&record.subject).await? {
                if current.is_active(now) {
                    reapply(data, &rooms, &current).await;
                    report.reissued.push(current.subject.to_string());
                }
            }
        } else {
            warn!(
                "Ban on {} expired but could not be lifted in {:?}, retrying next tick",
                record.subject,
                fanout.failed_rooms()
            );
            report.retained.push((record.subject.to_string(), fanout.failed));
        }
    }

    Ok(report)
}

async fn reapply(data: &Data, rooms: &[String], record: &BanRecord) {
    let Some(target) = data.identities.target_for(&record.subject) else {
        return;
    };
    let fanout = fanout::apply_ban(data, rooms, &target, record.comment.as_deref()).await;
    info!(
        "Ban on {} was re-issued during its lift, re-applied in {} rooms",
        record.subject,
        fanout.succeeded.len()
    );
    if !fanout.is_complete() {
        warn!(
            "Re-issued ban on {} could not be re-applied in {:?}, next sync will retry",
            record.subject,
            fanout.failed_rooms()
        );
    }
}

async fn notify_control_room(data: &Data, report: &ExpiryReport) {
    let control_room = data.control_room();
    let gateway = data.gateway();

    for subject in &report.lifted {
        let body = format!("♻️ Ban on {} expired and was lifted", subject);
        if let Err(e) = gateway.send_message(&control_room, &body).await {
            warn!("Could not notify {}: {}", control_room, e);
        }
    }
}
