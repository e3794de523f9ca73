//! Ownership claims

use std::sync::Arc;

use tracing::info;

use platform_core::events::topics::{ItemChange, ItemChangeType};
use platform_core::AuthInfo;

use super::items::require_admin;
use super::owners::allowed_owners;
use super::Context;
use crate::error::ItemError;
use crate::repo::claims::{self, Claim, ClaimStatus};

pub struct ClaimService {
    ctx: Arc<Context>,
}

impl ClaimService {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Claim an item for the caller, or for an organisation they administer
    pub async fn claim(&self, auth: &AuthInfo, item_id: &str, owner: Option<String>) -> Result<Claim, ItemError> {
        if !auth.is_user() {
            return Err(ItemError::Unauthorized);
        }
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

        let item = item_id.to_string();
        let claim = self
            .ctx
            .db(move |conn| claims::create_claim(conn, &item, &owner))
            .await?;
        info!(id = %claim.id, item = %claim.item_id, owner = %claim.owner_id, "Ownership claimed");
        Ok(claim)
    }

    /// All claims for administrators, the caller's own otherwise
    pub async fn list(&self, auth: &AuthInfo) -> Result<Vec<Claim>, ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let owners = allowed.ids().map(<[String]>::to_vec);
        self.ctx
            .db(move |conn| claims::list_claims(conn, owners.as_deref()))
            .await
    }

    pub async fn delete(&self, auth: &AuthInfo, id: &str) -> Result<(), ItemError> {
        let allowed = allowed_owners(self.ctx.users.as_ref(), auth).await?;
        let id = id.to_string();
        let claim = self
            .ctx
            .db(move |conn| claims::delete_claim(conn, &id, &allowed))
            .await?;
        info!(id = %claim.id, "Ownership claim withdrawn");
        Ok(())
    }

    /// Administrators decide claims; approval hands the item over
    pub async fn set_status(&self, auth: &AuthInfo, id: &str, status: ClaimStatus) -> Result<Claim, ItemError> {
        require_admin(auth)?;
        let id = id.to_string();
        let claim = self
            .ctx
            .db(move |conn| claims::set_claim_status(conn, &id, status))
            .await?;
        info!(id = %claim.id, status = %status, "Ownership claim decided");

        if status == ClaimStatus::Approved {
            self.ctx
                .publish(ItemChange::new(ItemChangeType::Update, &claim.item_id))
                .await;
        }
        Ok(claim)
    }
}
