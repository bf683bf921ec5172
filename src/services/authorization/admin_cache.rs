use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::bot::error::Error;
use crate::gateway::{AffiliationEntry, TimedGateway};
use crate::utils::jid::bare_jid;

#[derive(Debug, Default)]
struct AdminSnapshot {
    admins: HashSet<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Owners and admins of the control room, as last fetched.
///
/// Refresh replaces the whole set so a demoted admin loses access at once.
/// Empty until the first refresh succeeds.
#[derive(Debug, Default)]
pub struct AdminCache {
    current: RwLock<Arc<AdminSnapshot>>,
}

impl AdminCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_admin(&self, jid: &str) -> bool {
        self.snapshot().admins.contains(&bare_jid(jid))
    }

    /// Fetch the control room's affiliations and swap in the new set
    pub async fn refresh(&self, gateway: &TimedGateway, control_room: &str) -> Result<usize, Error> {
        let entries = gateway.list_affiliations(control_room).await?;
        let count = self.replace(&entries);
        info!("Admin cache refreshed from {}: {} admins", control_room, count);
        Ok(count)
    }

    /// Install the privileged entries of `entries`, dropping everything else
    pub fn replace(&self, entries: &[AffiliationEntry]) -> usize {
        let admins: HashSet<String> = entries
            .iter()
            .filter(|e| e.affiliation.is_privileged())
            .map(|e| bare_jid(&e.jid))
            .collect();
        let count = admins.len();
        let next = Arc::new(AdminSnapshot {
            admins,
            refreshed_at: Some(Utc::now()),
        });
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        count
    }

    pub fn len(&self) -> usize {
        self.snapshot().admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().admins.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().refreshed_at
    }

    fn snapshot(&self) -> Arc<AdminSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
