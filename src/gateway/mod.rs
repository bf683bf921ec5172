//! Room membership capability consumed by the engine.
//!
//! The bot never talks to the messaging network directly; everything it
//! needs from a room goes through [`RoomGateway`].

mod memory;
mod timed;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryGateway;
pub use timed::TimedGateway;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("not joined to {0}")]
    NotJoined(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Who an affiliation change is aimed at.
///
/// Rooms key affiliations by JID; a nickname target only works while that
/// nickname is present in the room, and only where the gateway allows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Jid(String),
    Nick(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Jid(jid) => f.write_str(jid),
            Target::Nick(nick) => write!(f, "{} (nick)", nick),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affiliation {
    Owner,
    Admin,
    Member,
    Outcast,
    None,
}

impl Affiliation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Affiliation::Owner => "owner",
            Affiliation::Admin => "admin",
            Affiliation::Member => "member",
            Affiliation::Outcast => "outcast",
            Affiliation::None => "none",
        }
    }

    /// Owners and admins of the control room may administer the bot
    pub fn is_privileged(&self) -> bool {
        matches!(self, Affiliation::Owner | Affiliation::Admin)
    }
}

/// An entry of a room's live outcast list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcast {
    pub jid: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffiliationEntry {
    pub jid: String,
    pub affiliation: Affiliation,
}

#[async_trait]
pub trait RoomGateway: Send + Sync {
    async fn join(&self, room: &str, nick: &str) -> Result<(), GatewayError>;

    async fn leave(&self, room: &str) -> Result<(), GatewayError>;

    async fn list_outcasts(&self, room: &str) -> Result<Vec<Outcast>, GatewayError>;

    async fn set_outcast(
        &self,
        room: &str,
        target: &Target,
        reason: Option<&str>,
    ) -> Result<(), GatewayError>;

    async fn remove_outcast(&self, room: &str, target: &Target) -> Result<(), GatewayError>;

    async fn list_affiliations(&self, room: &str) -> Result<Vec<AffiliationEntry>, GatewayError>;

    async fn send_message(&self, room: &str, body: &str) -> Result<(), GatewayError>;
}
