//! Named, manually ordered item collections
//!
//! Memberships carry a 1-based `idx` that stays contiguous: inserting at
//! position p moves every `idx >= p` up by one, removing the member at p
//! moves every `idx > p` down by one. Shifts run row by row in an order that
//! never collides with the `(coll_id, idx)` primary key.

use diesel::prelude::*;
use serde::Serialize;
use serde_json::json;

use platform_core::db::current_timestamp;

use super::events::save_event;
use super::items::require_item;
use crate::db::models::{CollectionRow, MembershipRow, NewCollection};
use crate::db::schema::{item_colls, item_colls_items};
use crate::error::ItemError;
use crate::model::AllowedOwners;

/// Where to put an item in a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    End,
    Before(String),
    After(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub size: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub idx: i64,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionView {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub created_at: String,
    pub items: Vec<Member>,
}

pub fn get_collection(conn: &mut SqliteConnection, name: &str) -> Result<Option<CollectionRow>, ItemError> {
    Ok(item_colls::table
        .filter(item_colls::name.eq(name))
        .select(CollectionRow::as_select())
        .first(conn)
        .optional()?)
}

fn require_collection(conn: &mut SqliteConnection, name: &str) -> Result<CollectionRow, ItemError> {
    get_collection(conn, name)?.ok_or(ItemError::ItemCollectionNotFound)
}

fn require_owned(
    conn: &mut SqliteConnection,
    name: &str,
    allowed: &AllowedOwners,
) -> Result<CollectionRow, ItemError> {
    let coll = require_collection(conn, name)?;
    if !allowed.permits(&coll.owner) {
        return Err(ItemError::ItemCollectionNotOwned);
    }
    Ok(coll)
}

pub fn create_collection(
    conn: &mut SqliteConnection,
    name: &str,
    owner: &str,
) -> Result<CollectionRow, ItemError> {
    conn.transaction(|conn| {
        if get_collection(conn, name)?.is_some() {
            return Err(ItemError::Conflict(format!("Item collection '{}' already exists", name)));
        }
        let now = current_timestamp();
        diesel::insert_into(item_colls::table)
            .values(&NewCollection {
                name,
                owner,
                created_at: &now,
            })
            .execute(conn)?;
        let coll = require_collection(conn, name)?;
        save_event(conn, "collection-created", &json!({"id": coll.id, "name": name, "owner": owner}))?;
        Ok(coll)
    })
}

pub fn list_collections(conn: &mut SqliteConnection) -> Result<Vec<CollectionSummary>, ItemError> {
    let colls: Vec<CollectionRow> = item_colls::table
        .order(item_colls::name.asc())
        .select(CollectionRow::as_select())
        .load(conn)?;

    let mut out = Vec::with_capacity(colls.len());
    for coll in colls {
        let size: i64 = item_colls_items::table
            .filter(item_colls_items::coll_id.eq(coll.id))
            .count()
            .get_result(conn)?;
        out.push(CollectionSummary {
            id: coll.id,
            name: coll.name,
            owner: coll.owner,
            size,
            created_at: coll.created_at,
        });
    }
    Ok(out)
}

pub fn members(conn: &mut SqliteConnection, coll_id: i64) -> Result<Vec<Member>, ItemError> {
    Ok(item_colls_items::table
        .filter(item_colls_items::coll_id.eq(coll_id))
        .order(item_colls_items::idx.asc())
        .select(MembershipRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| Member {
            idx: row.idx,
            item_id: row.item_id,
        })
        .collect())
}

pub fn view_collection(conn: &mut SqliteConnection, name: &str) -> Result<CollectionView, ItemError> {
    let coll = require_collection(conn, name)?;
    let items = members(conn, coll.id)?;
    Ok(CollectionView {
        id: coll.id,
        name: coll.name,
        owner: coll.owner,
        created_at: coll.created_at,
        items,
    })
}

/// Member ids of the named collections, in idx order, unioned in argument order
pub fn member_ids(conn: &mut SqliteConnection, names: &[String]) -> Result<Vec<String>, ItemError> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let coll = require_collection(conn, name)?;
        for member in members(conn, coll.id)? {
            if !out.contains(&member.item_id) {
                out.push(member.item_id);
            }
        }
    }
    Ok(out)
}

fn member_idx(conn: &mut SqliteConnection, coll_id: i64, item_id: &str) -> Result<Option<i64>, ItemError> {
    Ok(item_colls_items::table
        .filter(item_colls_items::coll_id.eq(coll_id))
        .filter(item_colls_items::item_id.eq(item_id))
        .select(item_colls_items::idx)
        .first(conn)
        .optional()?)
}

/// Move every member at `idx >= from` up by one, highest first
fn shift_up(conn: &mut SqliteConnection, coll_id: i64, from: i64) -> Result<(), ItemError> {
    let affected: Vec<i64> = item_colls_items::table
        .filter(item_colls_items::coll_id.eq(coll_id))
        .filter(item_colls_items::idx.ge(from))
        .order(item_colls_items::idx.desc())
        .select(item_colls_items::idx)
        .load(conn)?;
    for idx in affected {
        diesel::update(item_colls_items::table.find((coll_id, idx)))
            .set(item_colls_items::idx.eq(idx + 1))
            .execute(conn)?;
    }
    Ok(())
}

/// Move every member at `idx > after` down by one, lowest first
fn shift_down(conn: &mut SqliteConnection, coll_id: i64, after: i64) -> Result<(), ItemError> {
    let affected: Vec<i64> = item_colls_items::table
        .filter(item_colls_items::coll_id.eq(coll_id))
        .filter(item_colls_items::idx.gt(after))
        .order(item_colls_items::idx.asc())
        .select(item_colls_items::idx)
        .load(conn)?;
    for idx in affected {
        diesel::update(item_colls_items::table.find((coll_id, idx)))
            .set(item_colls_items::idx.eq(idx - 1))
            .execute(conn)?;
    }
    Ok(())
}

fn remove_member(conn: &mut SqliteConnection, coll_id: i64, item_id: &str) -> Result<bool, ItemError> {
    let Some(idx) = member_idx(conn, coll_id, item_id)? else {
        return Ok(false);
    };
    diesel::delete(item_colls_items::table.find((coll_id, idx))).execute(conn)?;
    shift_down(conn, coll_id, idx)?;
    Ok(true)
}

/// Add (or move) an item; returns the collection id and the item's new idx
pub fn add_item(
    conn: &mut SqliteConnection,
    name: &str,
    item_id: &str,
    position: Position,
    allowed: &AllowedOwners,
) -> Result<(i64, i64), ItemError> {
    conn.transaction(|conn| {
        let coll = require_owned(conn, name, allowed)?;
        require_item(conn, item_id)?;

        if let Position::Before(marker) | Position::After(marker) = &position {
            if marker == item_id {
                return Err(ItemError::BadRequest("An item cannot be placed relative to itself".into()));
            }
        }
        remove_member(conn, coll.id, item_id)?;

        let idx = match &position {
            Position::End => {
                let max: Option<i64> = item_colls_items::table
                    .filter(item_colls_items::coll_id.eq(coll.id))
                    .select(diesel::dsl::max(item_colls_items::idx))
                    .first(conn)?;
                max.unwrap_or(0) + 1
            }
            Position::Before(marker) => {
                let at = member_idx(conn, coll.id, marker)?.ok_or(ItemError::ItemNotInCollection)?;
                shift_up(conn, coll.id, at)?;
                at
            }
            Position::After(marker) => {
                let at = member_idx(conn, coll.id, marker)?.ok_or(ItemError::ItemNotInCollection)? + 1;
                shift_up(conn, coll.id, at)?;
                at
            }
        };

        diesel::insert_into(item_colls_items::table)
            .values(&MembershipRow {
                coll_id: coll.id,
                idx,
                item_id: item_id.to_string(),
            })
            .execute(conn)?;
        save_event(
            conn,
            "collection-item-added",
            &json!({"collection": coll.id, "item_id": item_id, "idx": idx}),
        )?;
        Ok((coll.id, idx))
    })
}

/// Remove an item from a collection; returns the collection id
pub fn remove_item(
    conn: &mut SqliteConnection,
    name: &str,
    item_id: &str,
    allowed: &AllowedOwners,
) -> Result<i64, ItemError> {
    conn.transaction(|conn| {
        let coll = require_owned(conn, name, allowed)?;
        if !remove_member(conn, coll.id, item_id)? {
            return Err(ItemError::ItemNotInCollection);
        }
        save_event(
            conn,
            "collection-item-removed",
            &json!({"collection": coll.id, "item_id": item_id}),
        )?;
        Ok(coll.id)
    })
}

/// Drop an item from every collection it is in; returns those collection ids
pub fn remove_item_everywhere(conn: &mut SqliteConnection, item_id: &str) -> Result<Vec<i64>, ItemError> {
    let coll_ids: Vec<i64> = item_colls_items::table
        .filter(item_colls_items::item_id.eq(item_id))
        .select(item_colls_items::coll_id)
        .load(conn)?;
    for coll_id in &coll_ids {
        remove_member(conn, *coll_id, item_id)?;
    }
    Ok(coll_ids)
}

/// Collection ids an item belongs to
pub fn collections_of(conn: &mut SqliteConnection, item_id: &str) -> Result<Vec<i64>, ItemError> {
    Ok(item_colls_items::table
        .filter(item_colls_items::item_id.eq(item_id))
        .select(item_colls_items::coll_id)
        .load(conn)?)
}

/// Delete a collection and its memberships; returns the former member ids
pub fn delete_collection(
    conn: &mut SqliteConnection,
    name: &str,
    allowed: &AllowedOwners,
) -> Result<(i64, Vec<String>), ItemError> {
    conn.transaction(|conn| {
        let coll = require_owned(conn, name, allowed)?;
        let ids = members(conn, coll.id)?.into_iter().map(|m| m.item_id).collect();
        diesel::delete(item_colls_items::table.filter(item_colls_items::coll_id.eq(coll.id))).execute(conn)?;
        diesel::delete(item_colls::table.find(coll.id)).execute(conn)?;
        save_event(conn, "collection-deleted", &json!({"id": coll.id, "name": name}))?;
        Ok((coll.id, ids))
    })
}
