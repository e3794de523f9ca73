//! Ownership claims
//!
//! A user claims an item for themselves or an organisation they run. When
//! an administrator approves the claim, the item changes hands in the same
//! transaction as the status change.

use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use platform_core::db::current_timestamp;
use platform_core::ids;

use super::events::save_event;
use super::items::{require_item, transfer_ownership};
use crate::db::models::ClaimRow;
use crate::db::schema::ownership_claims;
use crate::error::ItemError;
use crate::model::AllowedOwners;

pub const CLAIM_PREFIX: &str = "claim";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "approved" => Ok(ClaimStatus::Approved),
            "rejected" => Ok(ClaimStatus::Rejected),
            other => Err(format!("unknown claim status '{}'", other)),
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub id: String,
    pub owner_id: String,
    pub item_id: String,
    pub status: ClaimStatus,
    pub created_at: String,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = ItemError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse().map_err(ItemError::Database)?,
            id: row.id,
            owner_id: row.owner_id,
            item_id: row.item_id,
            created_at: row.created_at,
        })
    }
}

pub fn get_claim(conn: &mut SqliteConnection, id: &str) -> Result<Option<Claim>, ItemError> {
    ownership_claims::table
        .find(id)
        .select(ClaimRow::as_select())
        .first(conn)
        .optional()?
        .map(Claim::try_from)
        .transpose()
}

pub fn create_claim(conn: &mut SqliteConnection, item_id: &str, owner_id: &str) -> Result<Claim, ItemError> {
    conn.transaction(|conn| {
        let item = require_item(conn, item_id)?;
        if item.owner == owner_id {
            return Err(ItemError::BadRequest("Item is already owned by the claimant".into()));
        }

        let pending: i64 = ownership_claims::table
            .filter(ownership_claims::item_id.eq(item_id))
            .filter(ownership_claims::owner_id.eq(owner_id))
            .filter(ownership_claims::status.eq(ClaimStatus::Pending.as_str()))
            .count()
            .get_result(conn)?;
        if pending > 0 {
            return Err(ItemError::Conflict("A pending claim for this item already exists".into()));
        }

        let claim = Claim {
            id: ids::new_id(CLAIM_PREFIX)?,
            owner_id: owner_id.to_string(),
            item_id: item_id.to_string(),
            status: ClaimStatus::Pending,
            created_at: current_timestamp(),
        };
        diesel::insert_into(ownership_claims::table)
            .values(&ClaimRow {
                id: claim.id.clone(),
                owner_id: claim.owner_id.clone(),
                item_id: claim.item_id.clone(),
                status: claim.status.as_str().to_string(),
                created_at: claim.created_at.clone(),
            })
            .execute(conn)?;
        save_event(conn, "claim-created", &claim)?;
        Ok(claim)
    })
}

/// Claims newest first; `owners` restricts to claims made for those ids
pub fn list_claims(conn: &mut SqliteConnection, owners: Option<&[String]>) -> Result<Vec<Claim>, ItemError> {
    let mut query = ownership_claims::table.into_boxed();
    if let Some(owners) = owners {
        query = query.filter(ownership_claims::owner_id.eq_any(owners));
    }
    query
        .order((ownership_claims::created_at.desc(), ownership_claims::id.asc()))
        .select(ClaimRow::as_select())
        .load(conn)?
        .into_iter()
        .map(Claim::try_from)
        .collect()
}

/// Withdraw a pending claim.
///
/// Claims the caller may not act for are reported as not found.
pub fn delete_claim(conn: &mut SqliteConnection, id: &str, allowed: &AllowedOwners) -> Result<Claim, ItemError> {
    conn.transaction(|conn| {
        let claim = get_claim(conn, id)?.ok_or(ItemError::ClaimNotFound)?;
        if !allowed.permits(&claim.owner_id) {
            return Err(ItemError::ClaimNotFound);
        }
        if claim.status != ClaimStatus::Pending {
            return Err(ItemError::BadRequest("Only pending claims can be deleted".into()));
        }
        diesel::delete(ownership_claims::table.find(id)).execute(conn)?;
        save_event(conn, "claim-deleted", &json!({"id": id}))?;
        Ok(claim)
    })
}

/// Change a claim's status; approval transfers the item
pub fn set_claim_status(conn: &mut SqliteConnection, id: &str, status: ClaimStatus) -> Result<Claim, ItemError> {
    conn.transaction(|conn| {
        let mut claim = get_claim(conn, id)?.ok_or(ItemError::ClaimNotFound)?;
        diesel::update(ownership_claims::table.find(id))
            .set(ownership_claims::status.eq(status.as_str()))
            .execute(conn)?;

        if status == ClaimStatus::Approved {
            if let Err(e) = transfer_ownership(conn, &claim.item_id, &claim.owner_id) {
                if matches!(e, ItemError::ItemNotFound) {
                    error!(claim = %id, item = %claim.item_id, "Approved claim refers to a missing item");
                }
                return Err(e);
            }
        }

        claim.status = status;
        save_event(conn, "claim-status", &json!({"id": id, "status": status}))?;
        Ok(claim)
    })
}
