//! Item lifecycle: create, read, patch, delete, approval and stock

use std::sync::Arc;

use diesel::prelude::*;
use serde_json::Value;
use tracing::info;

use platform_core::events::topics::{ItemChange, ItemChangeType};
use platform_core::AuthInfo;

use super::owners::{allowed_owners, can_see};
use super::Context;
use crate::error::ItemError;
use crate::model::{Approval, Item, ItemInfo, ListedItem};
use crate::repo::{collections, items};

pub struct ItemService {
    ctx: Arc<Context>,
}

impl ItemService {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn ping(&self) -> Result<(), ItemError> {
        self.ctx
            .db(|conn| {
                diesel::sql_query("SELECT 1").execute(conn)?;
                Ok(())
            })
            .await
    }

    /// Validate and store a new item.
    ///
    /// Administrators' items start approved, everyone else's pending. The
    /// owner defaults to the caller; `owner` may name an organisation the
    /// caller administers.
    pub async fn create(&self, auth: &AuthInfo, body: Value, owner: Option<String>) -> Result<Item, ItemError> {
        if !auth.is_user() {
            return Err(ItemError::Unauthorized);
        }
        let draft = self.ctx.schemas.validate_new(body)?;

        let owner = match owner {
            Some(owner) => {
                let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
                if !allowed.permits(&owner) {
                    return Err(ItemError::Forbidden);
                }
                owner
            }
            None => auth.user_id.clone(),
        };
        let approval = if auth.is_admin() {
            Approval::Approved
        } else {
            Approval::Pending
        };

        let creator = auth.user_id.clone();
        let item = self
            .ctx
            .db(move |conn| items::create_item(conn, draft, &creator, &owner, approval))
            .await?;
        info!(id = %item.id, item_type = %item.item_type, approval = %item.approval, "Item created");

        self.ctx.publish(ItemChange::new(ItemChangeType::Create, &item.id)).await;
        Ok(item)
    }

    /// An item with its statistics; hidden items read as not found
    pub async fn get(&self, auth: &AuthInfo, id: &str) -> Result<ListedItem, ItemError> {
        let id = id.to_string();
        let listed = self
            .ctx
            .db(move |conn| items::get_listed(conn, &id))
            .await?
            .ok_or(ItemError::ItemNotFound)?;
        if !can_see(self.ctx.users.as_ref(), auth, &listed.item).await? {
            return Err(ItemError::ItemNotFound);
        }
        Ok(listed)
    }

    /// Apply a JSON merge patch.
    ///
    /// The stored item is read, patched and written back under one write lock.
    pub async fn update(&self, auth: &AuthInfo, id: &str, patch: Value) -> Result<Item, ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let schemas = self.ctx.schemas.clone();
        let id = id.to_string();
        let item = self
            .ctx
            .db(move |conn| {
                conn.immediate_transaction(|conn| {
                    let existing = items::require_item(conn, &id)?;
                    if !allowed.permits(&existing.owner) {
                        return Err(ItemError::ItemNotOwned);
                    }
                    let draft = schemas.validate_patch(&existing, patch)?;
                    let mut edited = existing;
                    edited.apply(draft);
                    items::update_item(conn, &edited, &allowed)
                })
            })
            .await?;

        self.ctx.publish(ItemChange::new(ItemChangeType::Update, &item.id)).await;
        Ok(item)
    }

    /// Delete an item; returns its pictures so blob references can be dropped
    pub async fn delete(&self, auth: &AuthInfo, id: &str) -> Result<Vec<String>, ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let target = id.to_string();
        let (coll_ids, pictures) = self
            .ctx
            .db(move |conn| {
                conn.transaction(|conn| {
                    let coll_ids = collections::collections_of(conn, &target)?;
                    let pictures = items::delete_item(conn, &target, &allowed)?;
                    Ok::<_, ItemError>((coll_ids, pictures))
                })
            })
            .await?;
        info!(id = %id, "Item deleted");

        for coll_id in coll_ids {
            self.ctx
                .publish(ItemChange::in_collection(ItemChangeType::CollRem, id, coll_id))
                .await;
        }
        self.ctx.publish(ItemChange::new(ItemChangeType::Delete, id)).await;
        Ok(pictures)
    }

    /// Administrators move items between pending, approved and rejected
    pub async fn set_approval(&self, auth: &AuthInfo, id: &str, approval: Approval) -> Result<Item, ItemError> {
        require_admin(auth)?;
        let id = id.to_string();
        let item = self
            .ctx
            .db(move |conn| items::set_approval(conn, &id, approval))
            .await?;
        info!(id = %item.id, approval = %approval, "Item approval changed");

        self.ctx.publish(ItemChange::new(ItemChangeType::Update, &item.id)).await;
        Ok(item)
    }

    /// Set `available_quantity` without revalidating the item
    pub async fn set_availability(&self, auth: &AuthInfo, id: &str, quantity: i64) -> Result<Item, ItemError> {
        if quantity < 0 {
            return Err(ItemError::BadRequest("available_quantity must not be negative".into()));
        }
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let lookup = id.to_string();
        let existing = self
            .ctx
            .db(move |conn| items::require_item(conn, &lookup))
            .await?;
        if !existing.attrs.contains_key("available_quantity") {
            return Err(ItemError::BadRequest(format!(
                "Items of type '{}' do not track availability",
                existing.item_type
            )));
        }

        let mut attrs = existing.attrs;
        attrs.insert("available_quantity".into(), Value::from(quantity));
        let id = id.to_string();
        let item = self
            .ctx
            .db(move |conn| items::update_availability(conn, &id, &attrs, &allowed))
            .await?;

        self.ctx.publish(ItemChange::new(ItemChangeType::Update, &item.id)).await;
        Ok(item)
    }

    /// Compact infos for `ids`, in request order
    pub async fn info(&self, ids: Vec<String>) -> Result<Vec<ItemInfo>, ItemError> {
        self.ctx.db(move |conn| items::item_infos(conn, &ids)).await
    }
}

pub(crate) fn require_admin(auth: &AuthInfo) -> Result<(), ItemError> {
    if auth.is_admin() {
        Ok(())
    } else if auth.is_authenticated() {
        Err(ItemError::Forbidden)
    } else {
        Err(ItemError::Unauthorized)
    }
}
