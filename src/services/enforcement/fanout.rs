use tracing::{debug, warn};

use crate::bot::data::Data;
use crate::gateway::{GatewayError, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomFailure {
    pub room: String,
    pub reason: String,
}

/// Per-room result of pushing one affiliation change to every room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<RoomFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Every protected room took the change
    Complete,
    /// Some rooms took it, some did not
    Partial,
    /// No room took it
    Failed,
    /// Nothing is protected yet
    NoRooms,
}

impl FanoutReport {
    pub fn outcome(&self) -> FanoutOutcome {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (true, true) => FanoutOutcome::NoRooms,
            (_, true) => FanoutOutcome::Complete,
            (false, false) => FanoutOutcome::Partial,
            (true, false) => FanoutOutcome::Failed,
        }
    }

    /// True when no room failed (including when there are no rooms)
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_rooms(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.room.as_str()).collect()
    }
}

/// Outcast `target` in every room. Failures are collected, never fatal.
pub async fn apply_ban(
    data: &Data,
    rooms: &[String],
    target: &Target,
    reason: Option<&str>,
) -> FanoutReport {
    let gateway = data.gateway();
    let mut report = FanoutReport::default();

    for room in rooms {
        match gateway.set_outcast(room, target, reason).await {
            Ok(()) => {
                debug!("Outcast {} in {}", target, room);
                report.succeeded.push(room.clone());
            }
            Err(e) => {
                warn!("Ban of {} failed in {}: {}", target, room, e);
                report.failed.push(RoomFailure {
                    room: room.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

/// Remove the outcast affiliation of `target` in every room.
///
/// A room that cannot address a nickname target has no outcast for that
/// nickname, so there is nothing to lift there.
pub async fn lift_ban(data: &Data, rooms: &[String], target: &Target) -> FanoutReport {
    let gateway = data.gateway();
    let mut report = FanoutReport::default();

    for room in rooms {
        match gateway.remove_outcast(room, target).await {
            Ok(()) => {
                debug!("Lifted outcast {} in {}", target, room);
                report.succeeded.push(room.clone());
            }
            Err(GatewayError::Unsupported(reason)) if matches!(target, Target::Nick(_)) => {
                debug!("Nothing to lift for {} in {}: {}", target, room, reason);
                report.succeeded.push(room.clone());
            }
            Err(e) => {
                warn!("Unban of {} failed in {}: {}", target, room, e);
                report.failed.push(RoomFailure {
                    room: room.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}
