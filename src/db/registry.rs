use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::bot::error::Error;
use crate::db::models::{BanRecord, BanSubject};
use crate::db::queries::{ban, room};
use crate::utils::jid::bare_jid;

/// Durable ban list and protected-room set.
///
/// Every mutation is committed before the call returns, so a success seen
/// by a caller is always on disk.
#[derive(Debug, Clone)]
pub struct BanRegistry {
    pool: SqlitePool,
}

impl BanRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store `record`, replacing any ban on the same subject
    pub async fn upsert_ban(&self, record: &BanRecord) -> Result<Option<BanRecord>, Error> {
        self.upsert_ban_absorbing(record, &[]).await
    }

    /// Store `record` and fold in nickname-only bans on `aliases`, the
    /// nicknames known to belong to the record's JID
    pub async fn upsert_ban_absorbing(
        &self,
        record: &BanRecord,
        aliases: &[String],
    ) -> Result<Option<BanRecord>, Error> {
        let prior = ban::upsert(&self.pool, record, aliases).await?;
        debug!(
            "Stored ban on {} (replaced existing: {})",
            record.subject,
            prior.is_some()
        );
        Ok(prior)
    }

    /// Idempotent: `Ok(false)` means there was nothing to delete
    pub async fn delete_ban(&self, subject_key: &str) -> Result<bool, Error> {
        Ok(ban::delete(&self.pool, subject_key).await?)
    }

    /// Delete `record` unless it was replaced after being read
    pub async fn delete_unchanged(&self, record: &BanRecord) -> Result<bool, Error> {
        Ok(ban::delete_unchanged(&self.pool, record).await?)
    }

    /// Delete a ban only while it is still expired at `now`
    pub async fn delete_expired(&self, subject_key: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        Ok(ban::delete_expired(&self.pool, subject_key, now.timestamp()).await?)
    }

    pub async fn find(&self, subject: &BanSubject) -> Result<Option<BanRecord>, Error> {
        for key in subject.lookup_keys() {
            if let Some(record) = ban::get(&self.pool, &key).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Take a ban out of the active set without forgetting it, so the
    /// expiry scheduler finishes lifting it. A ban replaced since `record`
    /// was read is left alone.
    pub async fn mark_expired(&self, record: &BanRecord, now: DateTime<Utc>) -> Result<bool, Error> {
        Ok(ban::expire(&self.pool, record, now.timestamp()).await?)
    }

    pub async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<BanRecord>, Error> {
        Ok(ban::list_active(&self.pool, now.timestamp()).await?)
    }

    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<BanRecord>, Error> {
        Ok(ban::list_expired(&self.pool, now.timestamp()).await?)
    }

    /// Active and pending-lift bans alike
    pub async fn list_all(&self) -> Result<Vec<BanRecord>, Error> {
        Ok(ban::list_all(&self.pool).await?)
    }

    pub async fn search(&self, query: &str, now: DateTime<Utc>) -> Result<Vec<BanRecord>, Error> {
        Ok(ban::search_active(&self.pool, query, now.timestamp()).await?)
    }

    pub async fn count_active(&self, now: DateTime<Utc>) -> Result<i64, Error> {
        Ok(ban::count_active(&self.pool, now.timestamp()).await?)
    }

    pub async fn add_room(&self, room_address: &str) -> Result<bool, Error> {
        let added = room::add(&self.pool, &bare_jid(room_address), Utc::now().timestamp()).await?;
        Ok(added)
    }

    pub async fn remove_room(&self, room_address: &str) -> Result<bool, Error> {
        Ok(room::remove(&self.pool, &bare_jid(room_address)).await?)
    }

    pub async fn list_rooms(&self) -> Result<Vec<String>, Error> {
        let rooms = room::list(&self.pool).await?;
        Ok(rooms.into_iter().map(|r| r.room_address).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Expiry;
    use crate::db::pool;
    use chrono::Duration;
    use tokio_test::assert_ok;

    async fn registry() -> BanRegistry {
        let pool = pool::create_memory_pool().await.unwrap();
        pool::run_migrations(&pool).await.unwrap();
        BanRegistry::new(pool)
    }

    fn temp_ban(jid: &str, until: DateTime<Utc>, now: DateTime<Utc>) -> BanRecord {
        BanRecord::new(
            BanSubject::from_jid(jid),
            Expiry::At(until),
            "admin@example.org",
            None,
            now,
        )
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_returns_prior() {
        let registry = registry().await;
        let now = Utc::now();

        let first = temp_ban("bob@example.org", now + Duration::hours(1), now);
        assert!(assert_ok!(registry.upsert_ban(&first).await).is_none());

        let second = temp_ban("bob@example.org", now + Duration::hours(3), now);
        let prior = assert_ok!(registry.upsert_ban(&second).await).unwrap();
        assert_eq!(prior.until.to_unix(), first.until.to_unix());

        let active = registry.list_active(now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].until.to_unix(), second.until.to_unix());
    }

    #[tokio::test]
    async fn test_jid_ban_absorbs_nick_ban() {
        let registry = registry().await;
        let now = Utc::now();

        let by_nick = BanRecord::new(
            BanSubject::from_nick("alice"),
            Expiry::Permanent,
            "admin@example.org",
            Some("flooding"),
            now,
        );
        registry.upsert_ban(&by_nick).await.unwrap();

        let by_jid = BanRecord::new(
            BanSubject::new(Some("alice@example.org"), Some("alice")).unwrap(),
            Expiry::Permanent,
            "admin@example.org",
            None,
            now,
        );
        let prior = registry.upsert_ban(&by_jid).await.unwrap();
        assert_eq!(prior.map(|p| p.key()), Some("nick:alice".to_string()));

        let active = registry.list_active(now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key(), "alice@example.org");
    }

    #[tokio::test]
    async fn test_active_ordering_and_expired_split() {
        let registry = registry().await;
        let now = Utc::now();

        registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_jid("perm@example.org"),
                Expiry::Permanent,
                "admin@example.org",
                None,
                now,
            ))
            .await
            .unwrap();
        registry
            .upsert_ban(&temp_ban("late@example.org", now + Duration::hours(5), now))
            .await
            .unwrap();
        registry
            .upsert_ban(&temp_ban("soon@example.org", now + Duration::minutes(5), now))
            .await
            .unwrap();
        registry
            .upsert_ban(&temp_ban("gone@example.org", now - Duration::minutes(1), now))
            .await
            .unwrap();

        let active: Vec<String> = registry
            .list_active(now)
            .await
            .unwrap()
            .iter()
            .map(|r| r.key())
            .collect();
        assert_eq!(
            active,
            vec!["soon@example.org", "late@example.org", "perm@example.org"]
        );

        let expired = registry.list_expired(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key(), "gone@example.org");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let registry = registry().await;
        let now = Utc::now();
        registry
            .upsert_ban(&temp_ban("bob@example.org", now + Duration::hours(1), now))
            .await
            .unwrap();

        assert!(registry.delete_ban("bob@example.org").await.unwrap());
        assert!(!registry.delete_ban("bob@example.org").await.unwrap());
    }

    #[tokio::test]
    async fn test_rooms_keep_insertion_order() {
        let registry = registry().await;

        assert!(registry.add_room("b@muc.example.org").await.unwrap());
        assert!(registry.add_room("A@muc.example.org").await.unwrap());
        assert!(!registry.add_room("b@muc.example.org").await.unwrap());

        assert_eq!(
            registry.list_rooms().await.unwrap(),
            vec!["b@muc.example.org", "a@muc.example.org"]
        );

        assert!(registry.remove_room("b@muc.example.org").await.unwrap());
        assert!(!registry.remove_room("b@muc.example.org").await.unwrap());
        assert_eq!(registry.list_rooms().await.unwrap(), vec!["a@muc.example.org"]);
    }

    #[tokio::test]
    async fn test_search_matches_comment_and_issuer() {
        let registry = registry().await;
        let now = Utc::now();
        registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_jid("troll@example.org"),
                Expiry::Permanent,
                "carol@example.org",
                Some("Spamming links"),
                now,
            ))
            .await
            .unwrap();

        assert_eq!(registry.search("spam", now).await.unwrap().len(), 1);
        assert_eq!(registry.search("CAROL", now).await.unwrap().len(), 1);
        assert!(registry.search("nobody", now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_record_is_not_deleted_or_expired() {
        let registry = registry().await;
        let now = Utc::now();
        let first = temp_ban("bob@example.org", now + Duration::hours(1), now);
        registry.upsert_ban(&first).await.unwrap();
        let stale = registry
            .find(&BanSubject::from_jid("bob@example.org"))
            .await
            .unwrap()
            .unwrap();

        let later = now + Duration::minutes(10);
        registry
            .upsert_ban(&temp_ban("bob@example.org", later + Duration::hours(1), later))
            .await
            .unwrap();

        assert!(!assert_ok!(registry.mark_expired(&stale, later).await));
        assert!(!assert_ok!(registry.delete_unchanged(&stale).await));
        assert!(!assert_ok!(registry.delete_expired("bob@example.org", later).await));
        assert_eq!(registry.list_active(later).await.unwrap().len(), 1);

        let current = registry
            .find(&BanSubject::from_jid("bob@example.org"))
            .await
            .unwrap()
            .unwrap();
        assert!(assert_ok!(registry.delete_unchanged(&current).await));
    }

    #[tokio::test]
    async fn test_jid_ban_absorbs_aliased_nick_ban() {
        let registry = registry().await;
        let now = Utc::now();
        registry
            .upsert_ban(&BanRecord::new(
                BanSubject::from_nick("dave"),
                Expiry::Permanent,
                "admin@example.org",
                None,
                now,
            ))
            .await
            .unwrap();

        let by_jid = BanRecord::new(
            BanSubject::from_jid("dave@example.org"),
            Expiry::Permanent,
            "admin@example.org",
            None,
            now,
        );
        let prior = registry
            .upsert_ban_absorbing(&by_jid, &["dave".to_string()])
            .await
            .unwrap();

        assert_eq!(prior.map(|p| p.key()), Some("nick:dave".to_string()));
        let all = registry.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key(), "dave@example.org");
    }
}
