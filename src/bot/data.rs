use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::{Settings, SettingsHandle};
use crate::db::registry::BanRegistry;
use crate::gateway::{RoomGateway, TimedGateway};
use crate::services::authorization::AdminCache;
use crate::services::identity::IdentityResolver;

/// Shared state available to all commands, handlers and background tasks
pub struct Data {
    pub registry: BanRegistry,
    pub settings: SettingsHandle,
    /// Nickname to JID mappings seen in any joined room
    pub identities: IdentityResolver,
    /// Control room owners/admins, refreshed at startup and by `!syncadmins`
    pub admins: AdminCache,
    gateway: Arc<dyn RoomGateway>,
    /// Held for a whole reconciliation or expiry pass; passes never overlap
    pub pass_lock: tokio::sync::Mutex<()>,
    pub started_at: Instant,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl Data {
    pub fn new(pool: SqlitePool, settings: Settings, gateway: Arc<dyn RoomGateway>) -> Self {
        Self {
            registry: BanRegistry::new(pool),
            settings: SettingsHandle::new(settings),
            identities: IdentityResolver::new(),
            admins: AdminCache::new(),
            gateway,
            pass_lock: tokio::sync::Mutex::new(()),
            started_at: Instant::now(),
            last_sync: Mutex::new(None),
        }
    }

    /// Gateway bounded by the currently configured timeout
    pub fn gateway(&self) -> TimedGateway {
        TimedGateway::new(self.gateway.clone(), self.settings.snapshot().gateway_timeout)
    }

    pub fn control_room(&self) -> String {
        self.settings.snapshot().control_room.clone()
    }

    pub fn mark_synced(&self, at: DateTime<Utc>) {
        if let Ok(mut last) = self.last_sync.lock() {
            *last = Some(at);
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync.lock().ok().and_then(|last| *last)
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("admins_count", &self.admins.len())
            .field("known_nicks", &self.identities.known_nicks())
            .finish_non_exhaustive()
    }
}
