//! Resolving who a caller may act for

use platform_core::clients::UserClient;
use platform_core::AuthInfo;

use crate::error::ItemError;
use crate::model::{AllowedOwners, Approval, Item};

/// Owners a caller may mutate on behalf of.
///
/// Administrators (and internal service clients) get [`AllowedOwners::Any`].
/// A user gets their own id plus every organisation they administer.
/// Anonymous callers are rejected.
pub async fn allowed_owners(users: &dyn UserClient, auth: &AuthInfo) -> Result<AllowedOwners, ItemError> {
    if auth.is_admin() {
        return Ok(AllowedOwners::Any);
    }
    if !auth.is_user() {
        return Err(ItemError::Unauthorized);
    }

    let mut ids = vec![auth.user_id.clone()];
    ids.extend(
        users
            .orgs(&auth.user_id)
            .await?
            .into_iter()
            .filter(|m| m.is_org_admin)
            .map(|m| m.org_id),
    );
    Ok(AllowedOwners::Only(ids))
}

/// Ids an `owner=` search filter stands for.
///
/// An organisation id stands for itself. A user id also covers every
/// organisation the user is a member of.
pub async fn owner_filter(users: &dyn UserClient, owner: &str) -> Result<Vec<String>, ItemError> {
    if owner.starts_with("org_") {
        return Ok(vec![owner.to_string()]);
    }
    let mut ids = vec![owner.to_string()];
    ids.extend(users.orgs(owner).await?.into_iter().map(|m| m.org_id));
    Ok(ids)
}

/// Whether the caller may see `item`; unapproved items are limited to
/// administrators, the creator and whoever may act for the owner
pub async fn can_see(users: &dyn UserClient, auth: &AuthInfo, item: &Item) -> Result<bool, ItemError> {
    if item.approval == Approval::Approved || auth.is_admin() {
        return Ok(true);
    }
    if !auth.is_user() {
        return Ok(false);
    }
    if item.creator == auth.user_id {
        return Ok(true);
    }
    Ok(allowed_owners(users, auth).await?.permits(&item.owner))
}
