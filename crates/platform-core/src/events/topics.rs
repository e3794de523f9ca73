//! Topic catalogue and payload types

use serde::{Deserialize, Serialize};

pub const LOGIN_EMAIL_REQUEST: &str = "login-email-request";

pub const USER_CREATED: &str = "user-created";
pub const USER_LOGIN: &str = "user-login";
pub const USER_UPDATED: &str = "user-updated";
pub const USER_DELETED: &str = "user-deleted";
pub const ORG_UPDATED: &str = "org-updated";
pub const ORG_DELETED: &str = "org-deleted";
pub const CREATE_API_KEY: &str = "create-api-key";
pub const DELETE_API_KEY: &str = "delete-api-key";

/// Payload is the affected user or org id as a JSON string
pub const INVALIDATE_CACHED_USER: &str = "invalidate-cached-user";

pub const ITEM_CHANGE: &str = "item-change";
pub const CATEGORY_UPDATE: &str = "category-update";
pub const SITE_UPDATE: &str = "site-update";

// Originated by the social service
pub const ITEM_RANK: &str = "item-rank";
pub const ITEM_UPVOTES: &str = "item-upvotes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEmailRequest {
    pub email: String,
    pub site: String,
    pub language: String,
    pub login_token: String,
}

/// Payload of `user-updated` and `user-deleted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChange {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemChangeType {
    Create,
    Update,
    Delete,
    CollAdd,
    CollRem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    #[serde(rename = "type")]
    pub change: ItemChangeType,
    #[serde(alias = "item_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
}

impl ItemChange {
    pub fn new(change: ItemChangeType, id: &str) -> Self {
        Self {
            change,
            id: id.to_string(),
            collection_id: None,
        }
    }

    pub fn in_collection(change: ItemChangeType, id: &str, collection_id: i64) -> Self {
        Self {
            change,
            id: id.to_string(),
            collection_id: Some(collection_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: String,
    pub entries: Vec<String>,
}

/// Items whose rank the social service recomputed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRank {
    #[serde(alias = "item_ids")]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpvotes {
    pub item_id: String,
    pub upvotes: i64,
}
