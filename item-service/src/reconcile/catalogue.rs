//! Product catalogue sync
//!
//! Members of one named collection (the shopping collection) are mirrored
//! to an external merchant catalogue, keyed by item id. Prices are stored
//! in minor units and sent in major units. Items without price data are
//! left out.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use platform_core::clients::catalogue::{to_major_units, Availability};
use platform_core::clients::{CatalogueClient, CatalogueProduct};
use platform_core::db::{self, DbPool};
use platform_core::events::topics::{self, ItemChange, ItemChangeType};
use platform_core::{CoreError, Delivery, EventBus};

use super::spawn_consumer;
use crate::error::ItemError;
use crate::model::Item;
use crate::repo::{collections, items};

pub const SUBSCRIBER: &str = "item-catalogue";

/// What a change did to the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Upserted,
    Deleted,
    Skipped,
}

/// `(amount in minor units, currency)` from either price shape.
///
/// Offerings carry `price` as an integer next to `currency`; product types
/// carry `price: {amount, currency}`.
fn price_of(item: &Item) -> Option<(i64, String)> {
    match item.attrs.get("price")? {
        Value::Number(amount) => {
            let currency = item.attrs.get("currency")?.as_str()?;
            Some((amount.as_i64()?, currency.to_string()))
        }
        Value::Object(price) => {
            let amount = price.get("amount")?.as_i64()?;
            let currency = price.get("currency")?.as_str()?;
            Some((amount, currency.to_string()))
        }
        _ => None,
    }
}

/// Catalogue entry for an item, or `None` when it has no usable price
pub fn product_for(item: &Item) -> Option<CatalogueProduct> {
    let (amount, currency) = price_of(item)?;
    let sku = item
        .attrs
        .get("sku")
        .and_then(Value::as_str)
        .unwrap_or(&item.slug)
        .to_string();
    let availability = item
        .attrs
        .get("available_quantity")
        .and_then(Value::as_i64)
        .map(Availability::from_quantity)
        .unwrap_or(Availability::InStock);

    Some(CatalogueProduct {
        id: item.id.clone(),
        sku,
        title: item.name.clone(),
        description: item.description.clone(),
        image_link: Some(item.featured_picture.clone()).filter(|p| !p.is_empty()),
        price: to_major_units(amount, &currency),
        currency: currency.to_ascii_uppercase(),
        availability,
    })
}

pub struct CatalogueSync {
    pool: DbPool,
    client: Arc<dyn CatalogueClient>,
    collection: String,
}

impl CatalogueSync {
    pub fn new(pool: DbPool, client: Arc<dyn CatalogueClient>, collection: &str) -> Self {
        Self {
            pool,
            client,
            collection: collection.to_string(),
        }
    }

    pub async fn apply(&self, change: &ItemChange) -> Result<SyncAction, ItemError> {
        let name = self.collection.clone();
        let id = change.id.clone();
        let (coll_id, item, member) = db::run(&self.pool, move |conn| {
            let Some(coll) = collections::get_collection(conn, &name)? else {
                return Ok((None, None, false));
            };
            let item = items::get_item(conn, &id)?;
            let member = collections::collections_of(conn, &id)?.contains(&coll.id);
            Ok::<_, ItemError>((Some(coll.id), item, member))
        })
        .await?;

        let Some(coll_id) = coll_id else {
            return Ok(SyncAction::Skipped);
        };

        match change.change {
            // Removal from the collection precedes deletion and is handled there
            ItemChangeType::Delete => Ok(SyncAction::Skipped),
            ItemChangeType::CollRem if change.collection_id == Some(coll_id) => {
                self.client.delete_product(&change.id).await?;
                info!(id = %change.id, "Removed from catalogue");
                Ok(SyncAction::Deleted)
            }
            ItemChangeType::CollRem => Ok(SyncAction::Skipped),
            ItemChangeType::Create | ItemChangeType::Update | ItemChangeType::CollAdd => {
                let Some(item) = item.filter(|_| member) else {
                    return Ok(SyncAction::Skipped);
                };
                let Some(product) = product_for(&item) else {
                    debug!(id = %item.id, "No price data, not listed in catalogue");
                    return Ok(SyncAction::Skipped);
                };
                self.client.upsert_product(&product).await?;
                info!(id = %item.id, sku = %product.sku, "Catalogue entry updated");
                Ok(SyncAction::Upserted)
            }
        }
    }
}

pub async fn start(bus: Arc<dyn EventBus>, sync: Arc<CatalogueSync>) -> Result<JoinHandle<()>, CoreError> {
    let subscription = bus
        .subscribe(topics::ITEM_CHANGE, SUBSCRIBER, Delivery::Competing)
        .await?;
    info!(subscriber = SUBSCRIBER, collection = %sync.collection, "Catalogue sync listening");

    Ok(spawn_consumer(subscription, SUBSCRIBER, move |change: ItemChange| {
        let sync = sync.clone();
        async move { sync.apply(&change).await.map(|_| ()) }
    }))
}
