//! Link creation, listing and deletion

use std::sync::Arc;

use tracing::info;

use platform_core::AuthInfo;

use super::owners::{allowed_owners, can_see};
use super::Context;
use crate::error::ItemError;
use crate::repo::items;
use crate::repo::links::{self, Link};

pub struct LinkService {
    ctx: Arc<Context>,
}

impl LinkService {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn create(
        &self,
        auth: &AuthInfo,
        origin_id: &str,
        link_type: &str,
        target_id: &str,
    ) -> Result<Link, ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let (origin, link_type, target) = (origin_id.to_string(), link_type.to_string(), target_id.to_string());
        let user_id = auth.user_id.clone();
        let link = self
            .ctx
            .db(move |conn| links::create_link(conn, &link_type, &origin, &target, &user_id, &allowed))
            .await?;
        info!(id = %link.id, link_type = %link.link_type, origin = %link.origin, target = %link.target, "Link created");
        Ok(link)
    }

    /// Outbound links of an item, inverse rows included.
    ///
    /// Items the caller may not see read as not found.
    pub async fn list(
        &self,
        auth: &AuthInfo,
        origin_id: &str,
        link_type: Option<String>,
    ) -> Result<Vec<Link>, ItemError> {
        let origin = origin_id.to_string();
        let (item, found) = self
            .ctx
            .db(move |conn| {
                let item = items::require_item(conn, &origin)?;
                let found = links::links_from(conn, &origin, link_type.as_deref())?;
                Ok::<_, ItemError>((item, found))
            })
            .await?;
        if !can_see(self.ctx.users.as_ref(), auth, &item).await? {
            return Err(ItemError::ItemNotFound);
        }
        Ok(found)
    }

    pub async fn delete(&self, auth: &AuthInfo, link_id: &str) -> Result<Link, ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let id = link_id.to_string();
        let link = self.ctx.db(move |conn| links::delete_link(conn, &id, &allowed)).await?;
        info!(id = %link.id, "Link deleted");
        Ok(link)
    }
}
