//! Keeps the ban registry and each protected room's outcast list in line.
//!
//! The registry always wins: a ban missing from a room is put back, never
//! dropped from the registry. The only thing a room can add to the
//! registry is an outcast the registry has never heard of, and only in a
//! full sync.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::constants::timeouts::IMPORTED_ISSUER;
use crate::db::models::{BanRecord, BanSubject, Expiry};
use crate::gateway::{GatewayError, Outcast, Target};
use crate::utils::jid::bare_jid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Import unknown outcasts, then enforce (`!syncbans`)
    Full,
    /// Enforce active bans only (startup, `!sync`, new rooms)
    EnforceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Consistent,
    Applied,
    /// Some bans could not be enforced for lack of a JID
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFailure {
    pub subject: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomReport {
    pub room: String,
    /// Outcasts adopted into the registry
    pub imported: Vec<String>,
    /// Bans re-applied to the room
    pub applied: Vec<String>,
    pub failed: Vec<SubjectFailure>,
    /// Nickname-only bans with no known JID, left alone this pass
    pub unresolved: Vec<String>,
    pub consistent: usize,
    /// Set when the outcast list could not be fetched at all
    pub error: Option<String>,
}

impl RoomReport {
    fn new(room: &str) -> Self {
        Self {
            room: room.to_string(),
            ..Default::default()
        }
    }

    pub fn status(&self) -> RoomStatus {
        if self.error.is_some() || !self.failed.is_empty() {
            RoomStatus::Failed
        } else if !self.unresolved.is_empty() {
            RoomStatus::Partial
        } else if !self.imported.is_empty() || !self.applied.is_empty() {
            RoomStatus::Applied
        } else {
            RoomStatus::Consistent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub rooms: Vec<RoomReport>,
}

impl SyncReport {
    /// Imports plus attempted enforcements
    pub fn action_count(&self) -> usize {
        self.rooms
            .iter()
            .map(|r| r.imported.len() + r.applied.len() + r.failed.len())
            .sum()
    }

    pub fn failed_rooms(&self) -> Vec<&str> {
        self.rooms
            .iter()
            .filter(|r| r.status() == RoomStatus::Failed)
            .map(|r| r.room.as_str())
            .collect()
    }

    /// True when every room was fully enforced
    pub fn is_clean(&self) -> bool {
        self.rooms.iter().all(|r| {
            matches!(r.status(), RoomStatus::Consistent | RoomStatus::Applied)
        })
    }

    pub fn room(&self, room: &str) -> Option<&RoomReport> {
        self.rooms.iter().find(|r| r.room == room)
    }
}

/// Reconcile every protected room, in stored order
pub async fn reconcile(data: &Data, mode: SyncMode, now: DateTime<Utc>) -> Result<SyncReport, Error> {
    let rooms = data.registry.list_rooms().await?;
    reconcile_rooms(data, &rooms, mode, now).await
}

/// Reconcile the given rooms.
///
/// Outcast lists are fetched for every room before anything is enforced,
/// so a ban imported from a later room still reaches the earlier ones in
/// the same pass. A room that fails is reported and skipped; only a
/// registry failure aborts the pass.
pub async fn reconcile_rooms(
    data: &Data,
    rooms: &[String],
    mode: SyncMode,
    now: DateTime<Utc>,
) -> Result<SyncReport, Error> {
    let _pass = data.pass_lock.lock().await;
    let gateway = data.gateway();

    let mut live: Vec<Result<Vec<Outcast>, GatewayError>> = Vec::with_capacity(rooms.len());
    for room in rooms {
        let listed = gateway.list_outcasts(room).await;
        if let Err(e) = &listed {
            warn!("Could not fetch outcasts of {}: {}", room, e);
        }
        live.push(listed);
    }

    let mut reports: Vec<RoomReport> = rooms.iter().map(|r| RoomReport::new(r)).collect();

    if mode == SyncMode::Full {
        import_unknown(data, &live, &mut reports, now).await?;
    }

    let active = data.registry.list_active(now).await?;

    for (report, listed) in reports.iter_mut().zip(&live) {
        let outcasts = match listed {
            Ok(outcasts) => outcasts,
            Err(e) => {
                report.error = Some(e.to_string());
                continue;
            }
        };
        let present: HashSet<String> = outcasts.iter().map(|o| bare_jid(&o.jid)).collect();

        for record in &active {
            let Some(jid) = data.identities.resolve_subject(&record.subject) else {
                report.unresolved.push(record.subject.to_string());
                continue;
            };
            if present.contains(&jid) {
                report.consistent += 1;
                continue;
            }

            let target = Target::Jid(jid.clone());
            match gateway
                .set_outcast(&report.room, &target, record.comment.as_deref())
                .await
            {
                Ok(()) => {
                    debug!("Re-applied ban on {} in {}", jid, report.room);
                    report.applied.push(jid);
                }
                Err(e) => {
                    warn!("Could not re-apply ban on {} in {}: {}", jid, report.room, e);
                    report.failed.push(SubjectFailure {
                        subject: jid,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    let report = SyncReport {
        mode,
        rooms: reports,
    };
    data.mark_synced(now);
    info!(
        "{:?} sync over {} rooms: {} actions, {} rooms failed",
        mode,
        report.rooms.len(),
        report.action_count(),
        report.failed_rooms().len()
    );

    Ok(report)
}

/// Adopt outcasts the registry does not know about as permanent bans.
///
/// Known means any stored ban, including ones whose expiry is still being
/// lifted, matched by JID where one can be resolved.
async fn import_unknown(
    data: &Data,
    live: &[Result<Vec<Outcast>, GatewayError>],
    reports: &mut [RoomReport],
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let mut known: HashSet<String> = data
        .registry
        .list_all()
        .await?
        .iter()
        .map(|record| {
            data.identities
                .resolve_subject(&record.subject)
                .unwrap_or_else(|| record.key())
        })
        .collect();

    for (report, listed) in reports.iter_mut().zip(live) {
        let Ok(outcasts) = listed else {
            continue;
        };
        for outcast in outcasts {
            let jid = bare_jid(&outcast.jid);
            if jid.is_empty() || known.contains(&jid) {
                continue;
            }

            let record = BanRecord::new(
                BanSubject::from_jid(&jid),
                Expiry::Permanent,
                IMPORTED_ISSUER,
                outcast.reason.as_deref(),
                now,
            );
            data.registry.upsert_ban(&record).await?;
            info!("Imported outcast {} from {}", jid, report.room);

            known.insert(jid.clone());
            report.imported.push(jid);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, ROOM_A, ROOM_B};
    use crate::utils::formatting::format_sync_report;
    use chrono::Duration;

    #[tokio::test]
    async fn test_full_sync_imports_and_enforces() {
        let (data, memory) = harness(&[ROOM_A, ROOM_B]).await;
        let now = Utc::now();
        memory.add_outcast(ROOM_B, "eve@example.org", Some("raid"));
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

        let report = reconcile(&data, SyncMode::Full, now).await.unwrap();

        let a = report.room(ROOM_A).unwrap();
        assert_eq!(a.applied, vec!["bob@example.org", "eve@example.org"]);
        let b = report.room(ROOM_B).unwrap();
        assert_eq!(b.imported, vec!["eve@example.org"]);
        assert_eq!(b.applied, vec!["bob@example.org"]);

        let eve = data
            .registry
            .find(&BanSubject::from_jid("eve@example.org"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(eve.issuer, IMPORTED_ISSUER);
        assert_eq!(eve.until, Expiry::Permanent);
        assert_eq!(eve.comment.as_deref(), Some("raid"));
    }

    #[tokio::test]
    async fn test_enforce_only_never_imports() {
        let (data, memory) = harness(&[ROOM_A]).await;
        memory.add_outcast(ROOM_A, "eve@example.org", None);

        let report = reconcile(&data, SyncMode::EnforceOnly, Utc::now())
            .await
            .unwrap();

        assert_eq!(report.action_count(), 0);
        assert!(data.registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_outcast_is_reapplied_not_unbanned() {
        let (data, memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        data.registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_jid("bob@example.org"),
                Expiry::At(now + Duration::hours(1)),
                "carol@example.org",
                None,
                now,
            ))
            .await
            .unwrap();

        reconcile(&data, SyncMode::Full, now).await.unwrap();
        memory.drop_outcast(ROOM_A, "bob@example.org");
        let report = reconcile(&data, SyncMode::Full, now).await.unwrap();

        assert_eq!(report.room(ROOM_A).unwrap().applied, vec!["bob@example.org"]);
        assert_eq!(data.registry.list_active(now).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_room_does_not_stop_others() {
        let (data, memory) = harness(&[ROOM_A, ROOM_B]).await;
        let now = Utc::now();
        memory.fail_room(ROOM_A);
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

        let report = reconcile(&data, SyncMode::Full, now).await.unwrap();

        assert_eq!(report.failed_rooms(), vec![ROOM_A]);
        assert_eq!(report.room(ROOM_B).unwrap().status(), RoomStatus::Applied);
        assert_eq!(memory.outcasts(ROOM_B), vec!["bob@example.org"]);
    }

    #[tokio::test]
    async fn test_unresolved_nick_ban_is_skipped_until_seen() {
        let (data, memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        data.registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_nick("dave"),
                Expiry::Permanent,
                "carol@example.org",
                None,
                now,
            ))
            .await
            .unwrap();

        let report = reconcile(&data, SyncMode::Full, now).await.unwrap();
        assert_eq!(report.room(ROOM_A).unwrap().unresolved.len(), 1);
        assert_eq!(report.room(ROOM_A).unwrap().status(), RoomStatus::Partial);
        assert!(!report.is_clean());
        assert!(format_sync_report(&report).contains("⚠️ lobby@muc.example.org"));
        assert_eq!(report.action_count(), 0);

        data.identities.observe(
            ROOM_A,
            "dave",
            Some("dave@example.org"),
            crate::gateway::Affiliation::None,
        );
        let report = reconcile(&data, SyncMode::Full, now).await.unwrap();
        assert_eq!(report.room(ROOM_A).unwrap().applied, vec!["dave@example.org"]);
        assert_eq!(memory.outcasts(ROOM_A), vec!["dave@example.org"]);

        // the stored nick ban now matches the room's JID outcast
        let report = reconcile(&data, SyncMode::Full, now).await.unwrap();
        assert_eq!(report.action_count(), 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_second_full_sync_changes_nothing() {
        let (data, memory) = harness(&[ROOM_A, ROOM_B]).await;
        let now = Utc::now();
        memory.add_outcast(ROOM_A, "eve@example.org", None);
        data.registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_jid("bob@example.org"),
                Expiry::At(now + Duration::days(1)),
                "carol@example.org",
                None,
                now,
            ))
            .await
            .unwrap();

        let first = reconcile(&data, SyncMode::Full, now).await.unwrap();
        assert!(first.action_count() > 0);
        let mutations = memory.mutation_count();

        let second = reconcile(&data, SyncMode::Full, now).await.unwrap();
        assert_eq!(second.action_count(), 0);
        assert_eq!(memory.mutation_count(), mutations);
        assert_eq!(second.room(ROOM_B).unwrap().consistent, 2);
    }
}

