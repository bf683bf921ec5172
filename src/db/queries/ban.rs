use sqlx::SqlitePool;

use crate::db::models::{nick_key, BanRecord, BanRow};

/// Insert or replace the ban for this subject, returning the replaced one.
///
/// A JID-keyed ban absorbs nickname-only bans on its own nickname and on
/// every nickname in `aliases`. Runs as one transaction.
pub async fn upsert(
    pool: &SqlitePool,
    record: &BanRecord,
    aliases: &[String],
) -> Result<Option<BanRecord>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let key = record.key();

    let prior = sqlx::query_as::<_, BanRow>("SELECT * FROM bans WHERE subject_key = ?")
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

    let mut absorbed = None;
    if record.subject.jid().is_some() {
        let nicks = record
            .subject
            .nick()
            .into_iter()
            .chain(aliases.iter().map(String::as_str));
        for nick in nicks {
            let row = sqlx::query_as::<_, BanRow>(
                "DELETE FROM bans WHERE subject_key = ? RETURNING *",
            )
            .bind(nick_key(nick))
            .fetch_optional(&mut *tx)
            .await?;
            absorbed = absorbed.or(row);
        }
    }

    sqlx::query(
        r#"
        INSERT INTO bans (subject_key, subject_jid, subject_nick, until, issuer, comment, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (subject_key) DO UPDATE SET
            subject_jid = excluded.subject_jid,
            subject_nick = COALESCE(excluded.subject_nick, bans.subject_nick),
            until = excluded.until,
            issuer = excluded.issuer,
            comment = excluded.comment,
            created_at = excluded.created_at
        "#,
    )
    .bind(&key)
    .bind(record.subject.jid())
    .bind(record.subject.nick())
    .bind(record.until.to_unix())
    .bind(&record.issuer)
    .bind(record.comment.as_deref())
    .bind(record.created_at.timestamp())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(prior.or(absorbed).map(BanRecord::from))
}

/// Delete by key. Returns false when nothing was stored under it.
pub async fn delete(pool: &SqlitePool, subject_key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bans WHERE subject_key = ?")
        .bind(subject_key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete only if the stored ban is still exactly `record`, so a ban
/// re-issued in the meantime survives
pub async fn delete_unchanged(pool: &SqlitePool, record: &BanRecord) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM bans WHERE subject_key = ? AND until = ? AND created_at = ?",
    )
    .bind(record.key())
    .bind(record.until.to_unix())
    .bind(record.created_at.timestamp())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete only if the ban is still expired at `now`
pub async fn delete_expired(pool: &SqlitePool, subject_key: &str, now: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bans WHERE subject_key = ? AND until <> 0 AND until <= ?")
        .bind(subject_key)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get(pool: &SqlitePool, subject_key: &str) -> Result<Option<BanRecord>, sqlx::Error> {
    let row = sqlx::query_as::<_, BanRow>("SELECT * FROM bans WHERE subject_key = ?")
        .bind(subject_key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(BanRecord::from))
}

/// Set `until` to `now` so the ban leaves the active set but stays stored.
/// Does nothing if the ban was replaced since `record` was read.
pub async fn expire(pool: &SqlitePool, record: &BanRecord, now: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE bans SET until = ? WHERE subject_key = ? AND until = ? AND created_at = ?",
    )
    .bind(now.max(1))
    .bind(record.key())
    .bind(record.until.to_unix())
    .bind(record.created_at.timestamp())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Permanent bans and bans ending after `now`, soonest to end first
pub async fn list_active(pool: &SqlitePool, now: i64) -> Result<Vec<BanRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BanRow>(
        r#"
        SELECT * FROM bans
        WHERE until = 0 OR until > ?
        ORDER BY CASE WHEN until = 0 THEN 1 ELSE 0 END, until, subject_key
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BanRecord::from).collect())
}

pub async fn list_expired(pool: &SqlitePool, now: i64) -> Result<Vec<BanRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BanRow>(
        r#"
        SELECT * FROM bans
        WHERE until <> 0 AND until <= ?
        ORDER BY until, subject_key
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BanRecord::from).collect())
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<BanRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BanRow>("SELECT * FROM bans ORDER BY subject_key")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(BanRecord::from).collect())
}

/// Active bans whose subject, issuer or comment contains `query`
pub async fn search_active(
    pool: &SqlitePool,
    query: &str,
    now: i64,
) -> Result<Vec<BanRecord>, sqlx::Error> {
    let pattern = format!("%{}%", query.to_lowercase());
    let rows = sqlx::query_as::<_, BanRow>(
        r#"
        SELECT * FROM bans
        WHERE (until = 0 OR until > ?)
          AND (lower(subject_key) LIKE ?
            OR lower(COALESCE(subject_nick, '')) LIKE ?
            OR lower(issuer) LIKE ?
            OR lower(COALESCE(comment, '')) LIKE ?)
        ORDER BY CASE WHEN until = 0 THEN 1 ELSE 0 END, until, subject_key
        "#,
    )
    .bind(now)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(BanRecord::from).collect())
}

pub async fn count_active(pool: &SqlitePool, now: i64) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bans WHERE until = 0 OR until > ?")
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}
