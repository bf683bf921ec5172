use dashmap::DashMap;
use tracing::debug;

use crate::db::models::BanSubject;
use crate::gateway::{Affiliation, Target};
use crate::utils::jid::{bare_jid, is_jid_shaped};

/// Outcome of turning user input into an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Input was a JID, or a nickname with a known JID
    Jid { jid: String, nick: Option<String> },
    /// Nickname with no observed JID
    Unresolved { nick: String },
}

impl Resolution {
    pub fn jid(&self) -> Option<&str> {
        match self {
            Resolution::Jid { jid, .. } => Some(jid),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn into_subject(self) -> BanSubject {
        match self {
            Resolution::Jid { jid, nick } => {
                BanSubject::new(Some(&jid), nick.as_deref()).unwrap_or_else(|| BanSubject::from_jid(&jid))
            }
            Resolution::Unresolved { nick } => BanSubject::from_nick(&nick),
        }
    }

    /// What to hand the gateway: the JID if known, else the bare nickname
    pub fn target(&self) -> Target {
        match self {
            Resolution::Jid { jid, .. } => Target::Jid(jid.clone()),
            Resolution::Unresolved { nick } => Target::Nick(nick.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Occupant {
    pub jid: Option<String>,
    pub affiliation: Affiliation,
}

/// Nickname to JID mappings learned from room presence.
///
/// Best effort only: a mapping may be stale, and is lost on restart.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    /// nick -> bare JID of the most recent sighting in any room
    by_nick: DashMap<String, String>,
    /// (room, nick) -> current occupant
    occupants: DashMap<(String, String), Occupant>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record presence. The latest sighting of a nickname wins.
    pub fn observe(
        &self,
        room: &str,
        nick: &str,
        jid: Option<&str>,
        affiliation: Affiliation,
    ) {
        let room = bare_jid(room);
        let jid = jid.map(bare_jid);
        if let Some(jid) = &jid {
            self.by_nick.insert(nick.to_string(), jid.clone());
            debug!("Mapped {} -> {} (seen in {})", nick, jid, room);
        }
        self.occupants
            .insert((room, nick.to_string()), Occupant { jid, affiliation });
    }

    /// Occupant left. The nickname mapping is kept.
    pub fn departed(&self, room: &str, nick: &str) {
        self.occupants.remove(&(bare_jid(room), nick.to_string()));
    }

    pub fn resolve(&self, subject: &str) -> Resolution {
        let subject = subject.trim();
        if is_jid_shaped(subject) {
            return Resolution::Jid {
                jid: bare_jid(subject),
                nick: None,
            };
        }
        match self.by_nick.get(subject) {
            Some(jid) => Resolution::Jid {
                jid: jid.clone(),
                nick: Some(subject.to_string()),
            },
            None => Resolution::Unresolved {
                nick: subject.to_string(),
            },
        }
    }

    /// JID a stored ban should be enforced against, if one is known
    pub fn resolve_subject(&self, subject: &BanSubject) -> Option<String> {
        if let Some(jid) = subject.jid() {
            return Some(jid.to_string());
        }
        subject
            .nick()
            .and_then(|nick| self.by_nick.get(nick).map(|jid| jid.clone()))
    }

    /// Gateway target for a stored ban, falling back to the nickname
    pub fn target_for(&self, subject: &BanSubject) -> Option<Target> {
        match self.resolve_subject(subject) {
            Some(jid) => Some(Target::Jid(jid)),
            None => subject.nick().map(|n| Target::Nick(n.to_string())),
        }
    }

    /// Who is speaking under `nick` in `room` right now
    pub fn occupant(&self, room: &str, nick: &str) -> Option<Occupant> {
        self.occupants
            .get(&(bare_jid(room), nick.to_string()))
            .map(|o| o.value().clone())
    }

    /// Nicknames currently mapped to `jid`, sorted
    pub fn nicks_for(&self, jid: &str) -> Vec<String> {
        let jid = bare_jid(jid);
        let mut nicks: Vec<String> = self
            .by_nick
            .iter()
            .filter(|entry| *entry.value() == jid)
            .map(|entry| entry.key().clone())
            .collect();
        nicks.sort();
        nicks
    }

    pub fn known_nicks(&self) -> usize {
        self.by_nick.len()
    }
}
