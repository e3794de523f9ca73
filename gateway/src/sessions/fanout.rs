//! Session invalidation on user changes
//!
//! One fan-out subscriber per gateway instance listens to both `user-updated`
//! and `user-deleted` and dispatches on the topic. A message that fails is
//! logged and the loop carries on.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use platform_core::events::topics::{self, UserChange};
use platform_core::{CoreError, Delivery, EventBus, Message};

use super::store::SessionStore;
use crate::error::GatewayError;

/// Subscriber name shared by every gateway instance
pub const SUBSCRIBER: &str = "gateway-sessions";

/// What a user event means for the sessions table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Update(UserChange),
    Delete(String),
}

impl SessionChange {
    pub fn from_message(message: &Message) -> Result<Self, CoreError> {
        let change: UserChange = message.json()?;
        match message.topic.as_str() {
            topics::USER_UPDATED => Ok(SessionChange::Update(change)),
            topics::USER_DELETED => Ok(SessionChange::Delete(change.id)),
            other => Err(CoreError::BadRequest(format!("Unexpected topic {}", other))),
        }
    }

    pub async fn apply(self, store: &SessionStore) -> Result<(), GatewayError> {
        match self {
            SessionChange::Update(user) => {
                let n = store
                    .update_sessions(&user.id, &user.email, user.is_admin)
                    .await?;
                debug!(user_id = %user.id, sessions = n, "Updated sessions");
            }
            SessionChange::Delete(user_id) => {
                let n = store.delete_user_sessions(&user_id).await?;
                debug!(user_id = %user_id, sessions = n, "Deleted sessions");
            }
        }
        Ok(())
    }
}

/// Subscribe to both user topics and apply changes until the bus closes.
///
/// Subscribing happens before the task is spawned so a bus failure is fatal
/// at start-up.
pub async fn start(
    bus: Arc<dyn EventBus>,
    store: SessionStore,
) -> Result<JoinHandle<()>, CoreError> {
    let updated = bus
        .subscribe(topics::USER_UPDATED, SUBSCRIBER, Delivery::FanOut)
        .await?;
    let deleted = bus
        .subscribe(topics::USER_DELETED, SUBSCRIBER, Delivery::FanOut)
        .await?;
    info!("Session fan-out listening on user-updated and user-deleted");

    let mut merged = futures::stream::select(updated, deleted);
    Ok(tokio::spawn(async move {
        while let Some(message) = merged.next().await {
            let change = match SessionChange::from_message(&message) {
                Ok(change) => change,
                Err(e) => {
                    warn!(topic = %message.topic, error = %e, "Bad user event");
                    continue;
                }
            };
            if let Err(e) = change.apply(&store).await {
                warn!(topic = %message.topic, error = %e, "Failed to apply user event");
            }
        }
        warn!("Session fan-out stream closed");
    }))
}
