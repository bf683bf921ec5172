use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::db::models::{BanRecord, BanSubject, Expiry};
use crate::services::enforcement::fanout;
use crate::services::identity::Resolution;
use crate::utils::formatting::{format_expiry, format_fanout};
use crate::utils::jid::is_jid_shaped;

/// Reject input that is neither a JID nor something usable as a nickname
fn check_subject(subject: &str) -> Result<(), Error> {
    let subject = subject.trim();
    if subject.is_empty() || (subject.contains('@') && !is_jid_shaped(subject)) {
        return Err(Error::UnresolvedIdentity(subject.to_string()));
    }
    Ok(())
}

/// Nicknames seen with the resolved JID, whose nickname-only bans belong
/// to this subject
fn aliases_of(data: &Data, resolution: &Resolution) -> Vec<String> {
    resolution
        .jid()
        .map(|jid| data.identities.nicks_for(jid))
        .unwrap_or_default()
}

/// Stored ban for a subject, under its own key or a nickname alias
async fn find_existing(data: &Data, resolution: &Resolution) -> Result<Option<BanRecord>, Error> {
    if let Some(record) = data.registry.find(&resolution.clone().into_subject()).await? {
        return Ok(Some(record));
    }
    for nick in aliases_of(data, resolution) {
        if let Some(record) = data.registry.find(&BanSubject::from_nick(&nick)).await? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Ban `subject` everywhere until `until`.
///
/// The ban is stored before any room is touched; if storing fails no room
/// is touched at all. A nickname with no known JID is stored as a
/// nickname ban and pushed to rooms by nickname.
pub async fn ban(
    data: &Data,
    issuer: &str,
    subject: &str,
    until: Expiry,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    check_subject(subject)?;

    let resolution = data.identities.resolve(subject);
    let target = resolution.target();
    let aliases = aliases_of(data, &resolution);
    let record = BanRecord::new(resolution.into_subject(), until, issuer, reason, now);

    let prior = data.registry.upsert_ban_absorbing(&record, &aliases).await?;
    let rooms = data.registry.list_rooms().await?;
    let report = fanout::apply_ban(data, &rooms, &target, record.comment.as_deref()).await;

    info!(
        "{} banned {} ({}), {} rooms ok, {} failed",
        issuer,
        record.subject,
        format_expiry(&until, now),
        report.succeeded.len(),
        report.failed.len()
    );

    let action = match (&prior, until) {
        (Some(_), _) => "Updated ban on",
        (None, Expiry::Permanent) => "Banned",
        (None, Expiry::At(_)) => "Temporarily banned",
    };
    let subject_text = format!("{} ({})", record.subject, format_expiry(&until, now));
    Ok(format_fanout(action, &subject_text, &report))
}

/// Lift a ban everywhere.
///
/// The record goes away only if every room accepted the unban. Otherwise
/// it is marked expired so the expiry scheduler keeps retrying the rooms
/// that failed.
pub async fn unban(data: &Data, issuer: &str, subject: &str, now: DateTime<Utc>) -> Result<String, Error> {
    check_subject(subject)?;

    let resolution = data.identities.resolve(subject);
    let existing = find_existing(data, &resolution).await?;
    let target = existing
        .as_ref()
        .and_then(|record| data.identities.target_for(&record.subject))
        .unwrap_or_else(|| resolution.target());

    let rooms = data.registry.list_rooms().await?;
    if existing.is_none() && rooms.is_empty() {
        return Ok(format!("No ban found for {}.", subject));
    }

    let report = fanout::lift_ban(data, &rooms, &target).await;

    if report.is_complete() {
        if let Some(record) = &existing {
            if !data.registry.delete_unchanged(record).await? {
                info!("Ban on {} was re-issued during the unban, keeping it", record.subject);
            }
        }
        info!("{} unbanned {}", issuer, target);
        let reply = format_fanout("Unbanned", &target.to_string(), &report);
        return Ok(match existing {
            Some(_) => reply,
            None => format!("{} (it was not in the ban list)", reply),
        });
    }

    if let Some(record) = &existing {
        data.registry.mark_expired(record, now).await?;
    }
    warn!(
        "Unban of {} by {} failed in {:?}, left for the expiry scheduler",
        target,
        issuer,
        report.failed_rooms()
    );
    Ok(format!(
        "{}; remaining rooms will be retried automatically",
        format_fanout("Unbanned", &target.to_string(), &report)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Affiliation;
    use crate::test_support::{harness, ROOM_A, ROOM_B};
    use chrono::Duration;

    const ADMIN: &str = "carol@example.org";

    #[tokio::test]
    async fn test_ban_by_observed_nick_stores_jid() {
        let (data, memory) = harness(&[ROOM_A, ROOM_B]).await;
        data.identities
            .observe(ROOM_A, "mallory", Some("mallory@evil.example/pc"), Affiliation::None);

        let reply = ban(&data, ADMIN, "mallory", Expiry::Permanent, Some("spam"), Utc::now())
            .await
            .unwrap();

        assert!(reply.starts_with("✅ Banned mallory@evil.example (mallory)"));
        assert_eq!(memory.outcasts(ROOM_A), vec!["mallory@evil.example"]);
        assert_eq!(memory.outcasts(ROOM_B), vec!["mallory@evil.example"]);
        let record = data
            .registry
            .find(&BanSubject::from_jid("mallory@evil.example"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.issuer, ADMIN);
        assert_eq!(record.subject.nick(), Some("mallory"));
    }

    #[tokio::test]
    async fn test_malformed_jid_is_rejected_without_state_change() {
        let (data, memory) = harness(&[ROOM_A]).await;

        let result = ban(&data, ADMIN, "mallory@", Expiry::Permanent, None, Utc::now()).await;

        assert!(matches!(result, Err(Error::UnresolvedIdentity(_))));
        assert!(data.registry.list_all().await.unwrap().is_empty());
        assert_eq!(memory.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_unban_lifts_and_deletes() {
        let (data, memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        ban(&data, ADMIN, "bob@example.org", Expiry::Permanent, None, now)
            .await
            .unwrap();

        let reply = unban(&data, ADMIN, "bob@example.org", now).await.unwrap();

        assert!(reply.starts_with("✅ Unbanned bob@example.org"));
        assert!(memory.outcasts(ROOM_A).is_empty());
        assert!(data.registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_unban_hands_over_to_scheduler() {
        let (data, memory) = harness(&[ROOM_A, ROOM_B]).await;
        let now = Utc::now();
        ban(&data, ADMIN, "bob@example.org", Expiry::Permanent, None, now)
            .await
            .unwrap();
        memory.fail_room(ROOM_B);

        let reply = unban(&data, ADMIN, "bob@example.org", now).await.unwrap();
        assert!(reply.contains("partially applied"));
        assert!(data.registry.list_active(now).await.unwrap().is_empty());

        memory.heal_room(ROOM_B);
        let later = now + Duration::minutes(1);
        let report = crate::services::expiry::run_expiry_pass(&data, later)
            .await
            .unwrap();
        assert_eq!(report.lifted, vec!["bob@example.org"]);
        assert!(memory.outcasts(ROOM_B).is_empty());
    }

    #[tokio::test]
    async fn test_reban_replaces_expiry() {
        let (data, _memory) = harness(&[ROOM_A]).await;
        let t1 = Utc::now();
        ban(&data, ADMIN, "bob@example.org", Expiry::At(t1 + Duration::hours(1)), None, t1)
            .await
            .unwrap();

        let t2 = t1 + Duration::minutes(30);
        let reply = ban(&data, ADMIN, "bob@example.org", Expiry::At(t2 + Duration::hours(1)), None, t2)
            .await
            .unwrap();

        assert!(reply.starts_with("✅ Updated ban on bob@example.org"));
        let active = data.registry.list_active(t2).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].until.to_unix(), (t2 + Duration::hours(1)).timestamp());
    }

    #[tokio::test]
    async fn test_timed_out_room_is_reported_and_retried_alone() {
        let (data, memory) = harness(&[ROOM_A, ROOM_B]).await;
        let now = Utc::now();
        memory.hang_room(ROOM_B);

        let reply = ban(&data, ADMIN, "mallory@example.org", Expiry::Permanent, None, now)
            .await
            .unwrap();

        assert!(reply.starts_with("⚠️"));
        assert!(reply.contains(ROOM_B));
        assert_eq!(data.registry.list_active(now).await.unwrap().len(), 1);
        assert_eq!(memory.outcasts(ROOM_A), vec!["mallory@example.org"]);

        memory.heal_room(ROOM_B);
        let report = crate::services::enforcement::reconcile(
            &data,
            crate::services::enforcement::SyncMode::EnforceOnly,
            now,
        )
        .await
        .unwrap();
        assert!(report.room(ROOM_A).unwrap().applied.is_empty());
        assert_eq!(report.room(ROOM_B).unwrap().applied, vec!["mallory@example.org"]);
    }

    #[tokio::test]
    async fn test_jid_ban_folds_in_earlier_nick_ban() {
        let (data, _memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        ban(&data, ADMIN, "dave", Expiry::Permanent, Some("flood"), now)
            .await
            .unwrap();
        data.identities
            .observe(ROOM_A, "dave", Some("dave@example.org"), Affiliation::None);

        let reply = ban(&data, ADMIN, "dave@example.org", Expiry::Permanent, None, now)
            .await
            .unwrap();

        assert!(reply.starts_with("✅ Updated ban on dave@example.org"), "{}", reply);
        let all = data.registry.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key(), "dave@example.org");
    }

    #[tokio::test]
    async fn test_unban_by_jid_finds_nick_ban() {
        let (data, memory) = harness(&[ROOM_A]).await;
        let now = Utc::now();
        ban(&data, ADMIN, "dave", Expiry::Permanent, None, now)
            .await
            .unwrap();
        data.identities
            .observe(ROOM_A, "dave", Some("dave@example.org"), Affiliation::None);
        memory.add_occupant(ROOM_A, "dave", "dave@example.org");

        let reply = unban(&data, ADMIN, "dave@example.org", now).await.unwrap();

        assert!(!reply.contains("not in the ban list"), "{}", reply);
        assert!(data.registry.list_all().await.unwrap().is_empty());
    }
}

