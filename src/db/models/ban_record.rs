use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::utils::jid::bare_jid;

/// When a ban ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Permanent,
    At(DateTime<Utc>),
}

impl Expiry {
    /// Stored form: unix seconds, `0` meaning permanent
    pub fn from_unix(secs: i64) -> Self {
        if secs <= 0 {
            return Expiry::Permanent;
        }
        DateTime::<Utc>::from_timestamp(secs, 0)
            .map(Expiry::At)
            .unwrap_or(Expiry::Permanent)
    }

    pub fn to_unix(&self) -> i64 {
        match self {
            Expiry::Permanent => 0,
            Expiry::At(at) => at.timestamp().max(1),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::Permanent => true,
            Expiry::At(at) => *at > now,
        }
    }

    /// Seconds left, `None` for permanent bans
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            Expiry::Permanent => None,
            Expiry::At(at) => Some((*at - now).num_seconds()),
        }
    }
}

/// Who a ban is aimed at. At least one of `jid`/`nick` is always set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanSubject {
    jid: Option<String>,
    nick: Option<String>,
}

impl BanSubject {
    pub fn new(jid: Option<&str>, nick: Option<&str>) -> Option<Self> {
        let jid = jid.map(bare_jid).filter(|j| !j.is_empty());
        let nick = nick.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        if jid.is_none() && nick.is_none() {
            return None;
        }
        Some(Self { jid, nick })
    }

    pub fn from_jid(jid: &str) -> Self {
        Self {
            jid: Some(bare_jid(jid)),
            nick: None,
        }
    }

    pub fn from_nick(nick: &str) -> Self {
        Self {
            jid: None,
            nick: Some(nick.trim().to_string()),
        }
    }

    pub fn jid(&self) -> Option<&str> {
        self.jid.as_deref()
    }

    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    /// Registry key: the bare JID when known, the nickname otherwise
    pub fn key(&self) -> String {
        match (&self.jid, &self.nick) {
            (Some(jid), _) => jid.clone(),
            (None, Some(nick)) => nick_key(nick),
            (None, None) => String::new(),
        }
    }

    /// Every key this subject could have been stored under
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = vec![self.key()];
        if let (Some(_), Some(nick)) = (&self.jid, &self.nick) {
            keys.push(nick_key(nick));
        }
        keys
    }
}

impl fmt::Display for BanSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.jid, &self.nick) {
            (Some(jid), Some(nick)) => write!(f, "{} ({})", jid, nick),
            (Some(jid), None) => f.write_str(jid),
            (None, Some(nick)) => write!(f, "{} (nick)", nick),
            (None, None) => f.write_str("?"),
        }
    }
}

pub fn nick_key(nick: &str) -> String {
    format!("nick:{}", nick.trim())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub subject: BanSubject,
    pub until: Expiry,
    pub issuer: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BanRecord {
    pub fn new(
        subject: BanSubject,
        until: Expiry,
        issuer: &str,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            subject,
            until,
            issuer: issuer.to_string(),
            comment: comment.map(str::to_string).filter(|c| !c.is_empty()),
            created_at: now,
        }
    }

    pub fn key(&self) -> String {
        self.subject.key()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until.is_active(now)
    }
}

/// Row shape of the `bans` table
#[derive(Debug, Clone, FromRow)]
pub struct BanRow {
    pub subject_key: String,
    pub subject_jid: Option<String>,
    pub subject_nick: Option<String>,
    pub until: i64,
    pub issuer: String,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl From<BanRow> for BanRecord {
    fn from(row: BanRow) -> Self {
        let subject = BanSubject::new(row.subject_jid.as_deref(), row.subject_nick.as_deref())
            .unwrap_or_else(|| BanSubject::from_nick(&row.subject_key));
        Self {
            subject,
            until: Expiry::from_unix(row.until),
            issuer: row.issuer,
            comment: row.comment,
            created_at: DateTime::<Utc>::from_timestamp(row.created_at, 0).unwrap_or_default(),
        }
    }
}
