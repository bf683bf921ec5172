use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::constants::timeouts::{DEFAULT_EXPIRY_CHECK_SECONDS, DEFAULT_GATEWAY_TIMEOUT_SECONDS};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bot_jid: String,
    pub bot_nick: String,
    /// Room whose owners and admins control the bot
    pub control_room: String,
    /// How often the expiry scheduler wakes up
    pub expiry_check_interval: Duration,
    /// Upper bound for a single room gateway call
    pub gateway_timeout: Duration,
    /// Identity the console transport speaks as
    pub console_operator_jid: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set")?;

        let bot_jid = env::var("BOT_JID").map_err(|_| "BOT_JID environment variable not set")?;

        let control_room = env::var("CONTROL_ROOM")
            .map_err(|_| "CONTROL_ROOM environment variable not set")?;

        let bot_nick = env::var("BOT_NICK")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "banbot".to_string());

        let expiry_check_seconds = env::var("EXPIRY_CHECK_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_EXPIRY_CHECK_SECONDS);

        let gateway_timeout_seconds = env::var("GATEWAY_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECONDS);

        let console_operator_jid = env::var("CONSOLE_OPERATOR_JID")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Self {
            database_url,
            bot_jid,
            bot_nick,
            control_room,
            expiry_check_interval: Duration::from_secs(expiry_check_seconds),
            gateway_timeout: Duration::from_secs(gateway_timeout_seconds),
            console_operator_jid,
        })
    }

    /// Settings for tests and embedding, with default intervals
    pub fn new(database_url: &str, bot_jid: &str, control_room: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            bot_jid: bot_jid.to_string(),
            bot_nick: "banbot".to_string(),
            control_room: control_room.to_string(),
            expiry_check_interval: Duration::from_secs(DEFAULT_EXPIRY_CHECK_SECONDS),
            gateway_timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECONDS),
            console_operator_jid: None,
        }
    }
}

/// Current configuration snapshot.
///
/// Operations take a snapshot once when they start; a reload swaps in a new
/// snapshot without touching the ones already handed out.
#[derive(Debug)]
pub struct SettingsHandle {
    current: RwLock<Arc<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, settings: Settings) {
        let next = Arc::new(settings);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
