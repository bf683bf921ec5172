use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use super::{AffiliationEntry, GatewayError, Outcast, RoomGateway, Target};

/// Bounds every gateway call so a stalled room fails its own step instead
/// of stalling the whole pass.
#[derive(Clone)]
pub struct TimedGateway {
    inner: Arc<dyn RoomGateway>,
    limit: Duration,
}

impl TimedGateway {
    pub fn new(inner: Arc<dyn RoomGateway>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, room: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Gateway call to {} timed out after {:?}", room, self.limit);
                Err(GatewayError::Timeout(room.to_string()))
            }
        }
    }

    pub async fn join(&self, room: &str, nick: &str) -> Result<(), GatewayError> {
        self.bounded(room, self.inner.join(room, nick)).await
    }

    pub async fn leave(&self, room: &str) -> Result<(), GatewayError> {
        self.bounded(room, self.inner.leave(room)).await
    }

    pub async fn list_outcasts(&self, room: &str) -> Result<Vec<Outcast>, GatewayError> {
        self.bounded(room, self.inner.list_outcasts(room)).await
    }

    pub async fn set_outcast(
        &self,
        room: &str,
        target: &Target,
        reason: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.bounded(room, self.inner.set_outcast(room, target, reason))
            .await
    }

    pub async fn remove_outcast(&self, room: &str, target: &Target) -> Result<(), GatewayError> {
        self.bounded(room, self.inner.remove_outcast(room, target))
            .await
    }

    pub async fn list_affiliations(
        &self,
        room: &str,
    ) -> Result<Vec<AffiliationEntry>, GatewayError> {
        self.bounded(room, self.inner.list_affiliations(room)).await
    }

    pub async fn send_message(&self, room: &str, body: &str) -> Result<(), GatewayError> {
        self.bounded(room, self.inner.send_message(room, body)).await
    }
}
