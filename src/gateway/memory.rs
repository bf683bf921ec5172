use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::{debug, info};

use super::{Affiliation, AffiliationEntry, GatewayError, Outcast, RoomGateway, Target};

#[derive(Debug, Default)]
struct RoomState {
    joined: bool,
    outcasts: BTreeMap<String, Option<String>>,
    affiliations: BTreeMap<String, Affiliation>,
    /// nick -> jid of current occupants
    occupants: HashMap<String, String>,
}

/// Gateway that keeps rooms in process memory.
///
/// Backs the console transport and the test suite. Rooms can be told to
/// fail or hang to exercise partial-enforcement paths.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    rooms: DashMap<String, RoomState>,
    failing: DashSet<String>,
    hanging: DashSet<String>,
    /// Extra latency added to every call against a room
    delays: DashMap<String, Duration>,
    sent: Mutex<Vec<(String, String)>>,
    mutations: AtomicUsize,
    /// Print outgoing messages to stdout
    echo: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Put an outcast directly into a room, as a room moderator would
    pub fn add_outcast(&self, room: &str, jid: &str, reason: Option<&str>) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .outcasts
            .insert(jid.to_string(), reason.map(str::to_string));
    }

    pub fn drop_outcast(&self, room: &str, jid: &str) {
        if let Some(mut state) = self.rooms.get_mut(room) {
            state.outcasts.remove(jid);
        }
    }

    pub fn set_affiliation(&self, room: &str, jid: &str, affiliation: Affiliation) {
        let mut state = self.rooms.entry(room.to_string()).or_default();
        if affiliation == Affiliation::None {
            state.affiliations.remove(jid);
        } else {
            state.affiliations.insert(jid.to_string(), affiliation);
        }
    }

    pub fn add_occupant(&self, room: &str, nick: &str, jid: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .occupants
            .insert(nick.to_string(), jid.to_string());
    }

    pub fn outcasts(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|state| state.outcasts.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_joined(&self, room: &str) -> bool {
        self.rooms.get(room).map(|s| s.joined).unwrap_or(false)
    }

    pub fn fail_room(&self, room: &str) {
        self.failing.insert(room.to_string());
    }

    pub fn hang_room(&self, room: &str) {
        self.hanging.insert(room.to_string());
    }

    pub fn slow_room(&self, room: &str, delay: Duration) {
        self.delays.insert(room.to_string(), delay);
    }

    pub fn heal_room(&self, room: &str) {
        self.failing.remove(room);
        self.hanging.remove(room);
        self.delays.remove(room);
    }

    /// Number of successful outcast changes made through the gateway
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn take_sent_messages(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }

    async fn check(&self, room: &str) -> Result<(), GatewayError> {
        let delay = self.delays.get(room).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.hanging.contains(room) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(room) {
            return Err(GatewayError::Protocol(format!("{} is unavailable", room)));
        }
        if !self.rooms.contains_key(room) {
            return Err(GatewayError::NotJoined(room.to_string()));
        }
        Ok(())
    }

    fn target_jid(&self, room: &str, target: &Target) -> Result<String, GatewayError> {
        match target {
            Target::Jid(jid) => Ok(jid.clone()),
            Target::Nick(nick) => self
                .rooms
                .get(room)
                .and_then(|state| state.occupants.get(nick).cloned())
                .ok_or_else(|| {
                    GatewayError::Unsupported(format!("{} is not an occupant of {}", nick, room))
                }),
        }
    }
}

#[async_trait]
impl RoomGateway for MemoryGateway {
    async fn join(&self, room: &str, nick: &str) -> Result<(), GatewayError> {
        if self.failing.contains(room) {
            return Err(GatewayError::Protocol(format!("{} refused join", room)));
        }
        self.rooms.entry(room.to_string()).or_default().joined = true;
        debug!("Joined {} as {}", room, nick);
        Ok(())
    }

    async fn leave(&self, room: &str) -> Result<(), GatewayError> {
        if let Some(mut state) = self.rooms.get_mut(room) {
            state.joined = false;
        }
        Ok(())
    }

    async fn list_outcasts(&self, room: &str) -> Result<Vec<Outcast>, GatewayError> {
        self.check(room).await?;
        Ok(self
            .rooms
            .get(room)
            .map(|state| {
                state
                    .outcasts
                    .iter()
                    .map(|(jid, reason)| Outcast {
                        jid: jid.clone(),
                        reason: reason.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_outcast(
        &self,
        room: &str,
        target: &Target,
        reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.check(room).await?;
        let jid = self.target_jid(room, target)?;
        if let Some(mut state) = self.rooms.get_mut(room) {
            state.affiliations.insert(jid.clone(), Affiliation::Outcast);
            state.outcasts.insert(jid, reason.map(str::to_string));
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_outcast(&self, room: &str, target: &Target) -> Result<(), GatewayError> {
        self.check(room).await?;
        let jid = self.target_jid(room, target)?;
        if let Some(mut state) = self.rooms.get_mut(room) {
            state.outcasts.remove(&jid);
            if state.affiliations.get(&jid) == Some(&Affiliation::Outcast) {
                state.affiliations.remove(&jid);
            }
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_affiliations(&self, room: &str) -> Result<Vec<AffiliationEntry>, GatewayError> {
        self.check(room).await?;
        Ok(self
            .rooms
            .get(room)
            .map(|state| {
                state
                    .affiliations
                    .iter()
                    .map(|(jid, affiliation)| AffiliationEntry {
                        jid: jid.clone(),
                        affiliation: *affiliation,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(&self, room: &str, body: &str) -> Result<(), GatewayError> {
        info!("[{}] {}", room, body);
        if self.echo {
            println!("[{}] {}", room, body);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((room.to_string(), body.to_string()));
        }
        Ok(())
    }
}
