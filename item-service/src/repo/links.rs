//! Typed links between items
//!
//! A link type constrains the item types at either end, may allow only one
//! link per origin, and names which end(s) the caller must own. A forward
//! type with an `inverse` gets a paired row in the opposite direction; the
//! two rows reference each other through `inverse_id` and are deleted
//! together. Inverse types cannot be created directly.

use std::collections::HashMap;
use std::str::FromStr;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use platform_core::db::current_timestamp;
use platform_core::ids;

use super::events::save_event;
use super::items::get_item;
use crate::db::models::{LinkRow, LinkTypeRow};
use crate::db::schema::{item_link_types, item_links};
use crate::error::ItemError;
use crate::model::{AllowedOwners, Item, ItemType};

pub const LINK_PREFIX: &str = "lnk";

/// Which end of a link the caller must own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkOwnership {
    OwnerToOwner,
    OwnerToAny,
    AnyToOwner,
}

impl FromStr for LinkOwnership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner-to-owner" => Ok(LinkOwnership::OwnerToOwner),
            "owner-to-any" => Ok(LinkOwnership::OwnerToAny),
            "any-to-owner" => Ok(LinkOwnership::AnyToOwner),
            other => Err(format!("unknown link ownership '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkType {
    pub name: String,
    /// Empty means any type
    pub origin_types: Vec<ItemType>,
    /// Empty means any type
    pub target_types: Vec<ItemType>,
    pub unique_origin: bool,
    pub ownership: LinkOwnership,
    pub is_inverse: bool,
    pub inverse: String,
}

impl LinkType {
    fn from_row(row: LinkTypeRow) -> Result<Self, ItemError> {
        let types = |raw: &str| -> Result<Vec<ItemType>, ItemError> {
            serde_json::from_str(raw).map_err(|e| ItemError::Database(format!("Bad link type row: {}", e)))
        };
        Ok(Self {
            origin_types: types(&row.origin_types)?,
            target_types: types(&row.target_types)?,
            ownership: row.ownership.parse().map_err(ItemError::Database)?,
            name: row.name,
            unique_origin: row.unique_origin,
            is_inverse: row.is_inverse,
            inverse: row.inverse,
        })
    }

    pub fn allows_origin(&self, item_type: ItemType) -> bool {
        self.origin_types.is_empty() || self.origin_types.contains(&item_type)
    }

    pub fn allows_target(&self, item_type: ItemType) -> bool {
        self.target_types.is_empty() || self.target_types.contains(&item_type)
    }

    /// Whether a caller acting for `allowed` may link `origin` to `target`
    pub fn owner_check(&self, origin: &Item, target: &Item, allowed: &AllowedOwners) -> bool {
        match self.ownership {
            LinkOwnership::OwnerToOwner => allowed.permits(&origin.owner) && allowed.permits(&target.owner),
            LinkOwnership::OwnerToAny => allowed.permits(&origin.owner),
            LinkOwnership::AnyToOwner => allowed.permits(&target.owner),
        }
    }

    /// Owner recorded on a new link
    fn link_owner(&self, origin: &Item, target: &Item, user_id: &str, allowed: &AllowedOwners) -> String {
        if allowed.is_any() {
            return user_id.to_string();
        }
        match self.ownership {
            LinkOwnership::AnyToOwner => target.owner.clone(),
            _ => origin.owner.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: String,
    pub inverse_id: Option<String>,
    pub origin: String,
    pub target: String,
    pub link_type: String,
    pub owner: String,
    pub created_at: String,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Self {
            id: row.id,
            inverse_id: row.inverse_id,
            origin: row.origin,
            target: row.target,
            link_type: row.link_type,
            owner: row.owner,
            created_at: row.created_at,
        }
    }
}

impl Link {
    fn to_row(&self) -> LinkRow {
        LinkRow {
            id: self.id.clone(),
            inverse_id: self.inverse_id.clone(),
            origin: self.origin.clone(),
            target: self.target.clone(),
            link_type: self.link_type.clone(),
            owner: self.owner.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

pub fn get_link_type(conn: &mut SqliteConnection, name: &str) -> Result<Option<LinkType>, ItemError> {
    item_link_types::table
        .find(name)
        .select(LinkTypeRow::as_select())
        .first(conn)
        .optional()?
        .map(LinkType::from_row)
        .transpose()
}

pub fn list_link_types(conn: &mut SqliteConnection) -> Result<Vec<LinkType>, ItemError> {
    item_link_types::table
        .order(item_link_types::name.asc())
        .select(LinkTypeRow::as_select())
        .load(conn)?
        .into_iter()
        .map(LinkType::from_row)
        .collect()
}

pub fn get_link(conn: &mut SqliteConnection, id: &str) -> Result<Option<Link>, ItemError> {
    Ok(item_links::table
        .find(id)
        .select(LinkRow::as_select())
        .first(conn)
        .optional()?
        .map(Link::from))
}

/// Create a link, and its inverse when the type has one
pub fn create_link(
    conn: &mut SqliteConnection,
    link_type: &str,
    origin_id: &str,
    target_id: &str,
    user_id: &str,
    allowed: &AllowedOwners,
) -> Result<Link, ItemError> {
    conn.transaction(|conn| {
        let lt = get_link_type(conn, link_type)?
            .ok_or_else(|| ItemError::UnknownLinkType(link_type.to_string()))?;
        if lt.is_inverse {
            return Err(ItemError::InverseLinkType(lt.name));
        }

        let origin = get_item(conn, origin_id)?.ok_or(ItemError::ItemNotFound)?;
        let target = get_item(conn, target_id)?.ok_or(ItemError::LinkTargetNotFound)?;
        if !lt.allows_origin(origin.item_type) {
            return Err(ItemError::BadLinkOriginType(origin.item_type.to_string()));
        }
        if !lt.allows_target(target.item_type) {
            return Err(ItemError::BadLinkTargetType(target.item_type.to_string()));
        }

        if lt.unique_origin {
            let existing: i64 = item_links::table
                .filter(item_links::link_type.eq(&lt.name))
                .filter(item_links::origin.eq(origin_id))
                .count()
                .get_result(conn)?;
            if existing > 0 {
                return Err(ItemError::LinkTypeRequiresUniqueOrigin(lt.name));
            }
        }

        if !lt.owner_check(&origin, &target, allowed) {
            return Err(ItemError::ItemNotOwned);
        }

        let owner = lt.link_owner(&origin, &target, user_id, allowed);
        let now = current_timestamp();
        let inverse_id = if lt.inverse.is_empty() {
            None
        } else {
            Some(ids::new_id(LINK_PREFIX)?)
        };
        let link = Link {
            id: ids::new_id(LINK_PREFIX)?,
            inverse_id: inverse_id.clone(),
            origin: origin.id.clone(),
            target: target.id.clone(),
            link_type: lt.name.clone(),
            owner: owner.clone(),
            created_at: now.clone(),
        };
        diesel::insert_into(item_links::table)
            .values(&link.to_row())
            .execute(conn)?;

        if let Some(inverse_id) = inverse_id {
            let inverse = Link {
                id: inverse_id,
                inverse_id: Some(link.id.clone()),
                origin: target.id.clone(),
                target: origin.id.clone(),
                link_type: lt.inverse.clone(),
                owner,
                created_at: now,
            };
            diesel::insert_into(item_links::table)
                .values(&inverse.to_row())
                .execute(conn)?;
        }

        save_event(conn, "link-created", &link)?;
        Ok(link)
    })
}

/// Delete a link and its paired inverse
pub fn delete_link(conn: &mut SqliteConnection, id: &str, allowed: &AllowedOwners) -> Result<Link, ItemError> {
    conn.transaction(|conn| {
        let link = get_link(conn, id)?.ok_or(ItemError::LinkNotFound)?;
        let lt = get_link_type(conn, &link.link_type)?
            .ok_or_else(|| ItemError::UnknownLinkType(link.link_type.clone()))?;
        let origin = get_item(conn, &link.origin)?.ok_or(ItemError::ItemNotFound)?;
        let target = get_item(conn, &link.target)?.ok_or(ItemError::LinkTargetNotFound)?;
        if !lt.owner_check(&origin, &target, allowed) {
            return Err(ItemError::ItemNotOwned);
        }

        let mut doomed = vec![link.id.clone()];
        doomed.extend(link.inverse_id.clone());
        diesel::delete(item_links::table.filter(item_links::id.eq_any(&doomed))).execute(conn)?;

        save_event(conn, "link-deleted", &json!({"id": link.id, "inverse_id": link.inverse_id}))?;
        Ok(link)
    })
}

/// Outbound links of an item, optionally of one type
pub fn links_from(
    conn: &mut SqliteConnection,
    origin_id: &str,
    link_type: Option<&str>,
) -> Result<Vec<Link>, ItemError> {
    let mut query = item_links::table
        .filter(item_links::origin.eq(origin_id))
        .into_boxed();
    if let Some(link_type) = link_type {
        query = query.filter(item_links::link_type.eq(link_type));
    }
    Ok(query
        .order((item_links::created_at.asc(), item_links::id.asc()))
        .select(LinkRow::as_select())
        .load(conn)?
        .into_iter()
        .map(Link::from)
        .collect())
}

/// Target ids of `link_type` links for each origin, in creation order
pub fn targets_by_origin(
    conn: &mut SqliteConnection,
    origin_ids: &[String],
    link_type: &str,
) -> Result<HashMap<String, Vec<String>>, ItemError> {
    let rows: Vec<(String, String)> = item_links::table
        .filter(item_links::origin.eq_any(origin_ids))
        .filter(item_links::link_type.eq(link_type))
        .order((item_links::created_at.asc(), item_links::id.asc()))
        .select((item_links::origin, item_links::target))
        .load(conn)?;

    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (origin, target) in rows {
        out.entry(origin).or_default().push(target);
    }
    Ok(out)
}
