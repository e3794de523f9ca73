//! Mirror item changes into the external geo and full-text index

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use platform_core::clients::SearchIndexClient;
use platform_core::db::{self, DbPool};
use platform_core::events::topics::{self, ItemChange, ItemChangeType};
use platform_core::{CoreError, Delivery, EventBus};

use super::spawn_consumer;
use crate::error::ItemError;
use crate::repo::items;

/// Queue group shared by every reconciler instance
pub const SUBSCRIBER: &str = "item-search-index";

/// Bring the index entry for one item up to date
pub async fn apply(pool: &DbPool, index: &dyn SearchIndexClient, change: &ItemChange) -> Result<(), ItemError> {
    match change.change {
        ItemChangeType::CollAdd | ItemChangeType::CollRem => Ok(()),
        ItemChangeType::Delete => {
            index.delete(&change.id).await?;
            debug!(id = %change.id, "Removed from search index");
            Ok(())
        }
        ItemChangeType::Create | ItemChangeType::Update => {
            let id = change.id.clone();
            match db::run(pool, move |conn| items::get_item(conn, &id)).await? {
                Some(item) => {
                    index.upsert(&item.search_info()).await?;
                    debug!(id = %change.id, "Indexed");
                }
                // Deleted since the event was published
                None => index.delete(&change.id).await?,
            }
            Ok(())
        }
    }
}

pub async fn start(
    bus: Arc<dyn EventBus>,
    pool: DbPool,
    index: Arc<dyn SearchIndexClient>,
) -> Result<JoinHandle<()>, CoreError> {
    let subscription = bus
        .subscribe(topics::ITEM_CHANGE, SUBSCRIBER, Delivery::Competing)
        .await?;
    info!(subscriber = SUBSCRIBER, "Search index reconciler listening");

    Ok(spawn_consumer(subscription, SUBSCRIBER, move |change: ItemChange| {
        let (pool, index) = (pool.clone(), index.clone());
        async move { apply(&pool, index.as_ref(), &change).await }
    }))
}
