//! Pull fresh ranks when the social service says they changed

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use platform_core::clients::SocialClient;
use platform_core::db::{self, DbPool};
use platform_core::events::topics::{self, ItemRank};
use platform_core::{CoreError, Delivery, EventBus};

use super::spawn_consumer;
use crate::error::ItemError;
use crate::repo::statistics;

pub const SUBSCRIBER: &str = "item-rank";

/// Fetch and store the rank of each listed item; returns how many were stored
pub async fn apply(pool: &DbPool, social: &dyn SocialClient, event: ItemRank) -> Result<usize, ItemError> {
    let mut stored = 0;
    for id in event.ids {
        let rank = social.item_rank(&id).await?;
        let item_id = id.clone();
        if db::run(pool, move |conn| statistics::set_rank(conn, &item_id, rank)).await? {
            stored += 1;
        } else {
            debug!(id = %id, "Rank for unknown item ignored");
        }
    }
    Ok(stored)
}

pub async fn start(
    bus: Arc<dyn EventBus>,
    pool: DbPool,
    social: Arc<dyn SocialClient>,
) -> Result<JoinHandle<()>, CoreError> {
    let subscription = bus
        .subscribe(topics::ITEM_RANK, SUBSCRIBER, Delivery::Competing)
        .await?;
    info!(subscriber = SUBSCRIBER, "Rank reconciler listening");

    Ok(spawn_consumer(subscription, SUBSCRIBER, move |event: ItemRank| {
        let (pool, social) = (pool.clone(), social.clone());
        async move { apply(&pool, social.as_ref(), event).await.map(|_| ()) }
    }))
}
