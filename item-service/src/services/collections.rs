//! Manually ordered collections

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::info;

use platform_core::events::topics::{ItemChange, ItemChangeType};
use platform_core::AuthInfo;

use super::owners::allowed_owners;
use super::Context;
use crate::error::ItemError;
use crate::repo::collections::{self, CollectionSummary, CollectionView, Position};

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_-]{1,64}$").expect("collection name pattern is valid"));

/// Collection names appear in URLs
fn check_name(name: &str) -> Result<(), ItemError> {
    if NAME.is_match(name) {
        return Ok(());
    }
    Err(ItemError::BadRequest(
        "Collection names are 1-64 characters of letters, digits, '-' and '_'".into(),
    ))
}

pub struct CollectionService {
    ctx: Arc<Context>,
}

impl CollectionService {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create a collection owned by the caller, or by `owner` if they act for it
    pub async fn create(
        &self,
        auth: &AuthInfo,
        name: &str,
        owner: Option<String>,
    ) -> Result<CollectionSummary, ItemError> {
        check_name(name)?;
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let owner = match owner {
            Some(owner) if allowed.permits(&owner) => owner,
            Some(_) => return Err(ItemError::Forbidden),
            None if auth.user_id.is_empty() => {
                return Err(ItemError::BadRequest("owner is required".into()))
            }
            None => auth.user_id.clone(),
        };

        let name = name.to_string();
        let coll = self
            .ctx
            .db(move |conn| collections::create_collection(conn, &name, &owner))
            .await?;
        info!(id = coll.id, name = %coll.name, "Collection created");
        Ok(CollectionSummary {
            id: coll.id,
            name: coll.name,
            owner: coll.owner,
            size: 0,
            created_at: coll.created_at,
        })
    }

    pub async fn list(&self) -> Result<Vec<CollectionSummary>, ItemError> {
        self.ctx.db(collections::list_collections).await
    }

    pub async fn view(&self, name: &str) -> Result<CollectionView, ItemError> {
        let name = name.to_string();
        self.ctx.db(move |conn| collections::view_collection(conn, &name)).await
    }

    pub async fn delete(&self, auth: &AuthInfo, name: &str) -> Result<(), ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let target = name.to_string();
        let (coll_id, members) = self
            .ctx
            .db(move |conn| collections::delete_collection(conn, &target, &allowed))
            .await?;
        info!(id = coll_id, name = %name, members = members.len(), "Collection deleted");

        for item_id in members {
            self.ctx
                .publish(ItemChange::in_collection(ItemChangeType::CollRem, &item_id, coll_id))
                .await;
        }
        Ok(())
    }

    /// Add or move an item; returns its new idx
    pub async fn add_item(
        &self,
        auth: &AuthInfo,
        name: &str,
        item_id: &str,
        position: Position,
    ) -> Result<i64, ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let (name, item) = (name.to_string(), item_id.to_string());
        let (coll_id, idx) = self
            .ctx
            .db(move |conn| collections::add_item(conn, &name, &item, position, &allowed))
            .await?;

        self.ctx
            .publish(ItemChange::in_collection(ItemChangeType::CollAdd, item_id, coll_id))
            .await;
        Ok(idx)
    }

    pub async fn remove_item(&self, auth: &AuthInfo, name: &str, item_id: &str) -> Result<(), ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let (name, item) = (name.to_string(), item_id.to_string());
        let coll_id = self
            .ctx
            .db(move |conn| collections::remove_item(conn, &name, &item, &allowed))
            .await?;

        self.ctx
            .publish(ItemChange::in_collection(ItemChangeType::CollRem, item_id, coll_id))
            .await;
        Ok(())
    }
}
