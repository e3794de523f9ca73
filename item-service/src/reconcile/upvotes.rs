//! Upvote counters
//!
//! A periodic sweep pulls every count from the social service and writes
//! the ones that differ. Single-item `item-upvotes` events are applied as
//! they arrive in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use platform_core::clients::SocialClient;
use platform_core::db::{self, DbPool};
use platform_core::events::topics::{self, ItemUpvotes};
use platform_core::{CoreError, Delivery, EventBus};

use super::spawn_consumer;
use crate::error::ItemError;
use crate::repo::statistics;

pub const SUBSCRIBER: &str = "item-upvotes";

/// Default time between sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Write every changed count; returns the number of items updated
pub async fn sweep(pool: &DbPool, social: &dyn SocialClient) -> Result<usize, ItemError> {
    let counts = social.upvote_counts().await?;
    db::run(pool, move |conn| {
        let current = statistics::all_upvotes(conn)?;
        let mut changed = 0;
        for (item_id, stored) in current {
            let fresh = counts.get(&item_id).copied().unwrap_or(0);
            if fresh != stored && statistics::set_upvotes(conn, &item_id, fresh)? {
                changed += 1;
            }
        }
        Ok(changed)
    })
    .await
}

pub fn spawn_sweeper(pool: DbPool, social: Arc<dyn SocialClient>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep(&pool, social.as_ref()).await {
                Ok(0) => debug!("Upvote sweep found no changes"),
                Ok(n) => info!(updated = n, "Upvote sweep"),
                Err(e) => warn!(error = %e, "Upvote sweep failed"),
            }
        }
    })
}

pub async fn start_consumer(bus: Arc<dyn EventBus>, pool: DbPool) -> Result<JoinHandle<()>, CoreError> {
    let subscription = bus
        .subscribe(topics::ITEM_UPVOTES, SUBSCRIBER, Delivery::Competing)
        .await?;
    info!(subscriber = SUBSCRIBER, "Upvote reconciler listening");

    Ok(spawn_consumer(subscription, SUBSCRIBER, move |event: ItemUpvotes| {
        let pool = pool.clone();
        async move {
            let ItemUpvotes { item_id, upvotes } = event;
            db::run(&pool, move |conn| statistics::set_upvotes(conn, &item_id, upvotes)).await?;
            Ok(())
        }
    }))
}
