//! Per-item persistence: create, read, update, delete
//!
//! Slugs are derived from the item name. Short names get the item type
//! appended; collisions get a random 4-character suffix and are retried up
//! to [`MAX_SLUG_ATTEMPTS`] times.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::{json, Map, Value};
use tracing::debug;

use platform_core::db::current_timestamp;
use platform_core::ids;

use super::collections;
use super::events::save_event;
use crate::db::models::{ItemRow, StatisticsRow};
use crate::db::schema::{item_statistics, item_tags, items};
use crate::error::ItemError;
use crate::model::{AllowedOwners, Approval, Item, ItemDraft, ItemInfo, ItemType, ListedItem, Ownership};

pub const MAX_SLUG_ATTEMPTS: usize = 8;
const MIN_SLUG_LEN: usize = 8;
const SLUG_SUFFIX_LEN: usize = 4;

/// Lowercase ASCII words joined by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub fn base_slug(name: &str, item_type: ItemType) -> String {
    let slug = slugify(name);
    if slug.len() < MIN_SLUG_LEN {
        if slug.is_empty() {
            item_type.as_str().to_string()
        } else {
            format!("{}-{}", slug, item_type)
        }
    } else {
        slug
    }
}

fn suffixed(base: &str) -> Result<String, ItemError> {
    Ok(format!(
        "{}-{}",
        base,
        ids::new_bare_id(SLUG_SUFFIX_LEN)?.to_ascii_lowercase()
    ))
}

fn replace_tags(conn: &mut SqliteConnection, item_id: &str, tags: &[String]) -> Result<(), ItemError> {
    diesel::delete(item_tags::table.filter(item_tags::item_id.eq(item_id))).execute(conn)?;
    for tag in tags {
        diesel::insert_into(item_tags::table)
            .values((item_tags::item_id.eq(item_id), item_tags::tag.eq(tag)))
            .on_conflict_do_nothing()
            .execute(conn)?;
    }
    Ok(())
}

/// Insert a new item with a fresh id and a unique slug
pub fn create_item(
    conn: &mut SqliteConnection,
    draft: ItemDraft,
    creator: &str,
    owner: &str,
    approval: Approval,
) -> Result<Item, ItemError> {
    conn.transaction(|conn| {
        let base = base_slug(&draft.name, draft.item_type);
        let mut item = Item {
            id: ids::new_id(draft.item_type.prefix())?,
            item_type: draft.item_type,
            slug: base.clone(),
            lang: String::new(),
            name: String::new(),
            description: String::new(),
            featured_picture: String::new(),
            pictures: Vec::new(),
            tags: Vec::new(),
            urls: Default::default(),
            attrs: Map::new(),
            approval,
            creator: creator.to_string(),
            owner: owner.to_string(),
            ownership: Ownership::Creator,
            created_at: current_timestamp(),
        };
        item.apply(draft);

        let mut inserted = false;
        for attempt in 0..MAX_SLUG_ATTEMPTS {
            if attempt > 0 {
                item.slug = suffixed(&base)?;
            }
            let rows = diesel::insert_into(items::table)
                .values(&item.to_row()?)
                .on_conflict_do_nothing()
                .execute(conn)?;
            if rows == 1 {
                inserted = true;
                break;
            }
            debug!(slug = %item.slug, attempt, "Slug taken, retrying");
        }
        if !inserted {
            return Err(ItemError::SlugExhausted(base));
        }

        diesel::insert_into(item_statistics::table)
            .values(&StatisticsRow {
                item_id: item.id.clone(),
                rank: 0.0,
                upvotes: 0,
            })
            .execute(conn)?;
        replace_tags(conn, &item.id, &item.tags)?;
        save_event(conn, "item-created", &json!({"id": item.id, "owner": item.owner}))?;
        Ok(item)
    })
}

pub fn get_item(conn: &mut SqliteConnection, id: &str) -> Result<Option<Item>, ItemError> {
    items::table
        .find(id)
        .select(ItemRow::as_select())
        .first(conn)
        .optional()?
        .map(Item::from_row)
        .transpose()
}

/// Load an item or fail with [`ItemError::ItemNotFound`]
pub fn require_item(conn: &mut SqliteConnection, id: &str) -> Result<Item, ItemError> {
    get_item(conn, id)?.ok_or(ItemError::ItemNotFound)
}

/// An item with its statistics
pub fn get_listed(conn: &mut SqliteConnection, id: &str) -> Result<Option<ListedItem>, ItemError> {
    items::table
        .inner_join(item_statistics::table)
        .filter(items::id.eq(id))
        .select((ItemRow::as_select(), item_statistics::rank, item_statistics::upvotes))
        .first::<(ItemRow, f64, i64)>(conn)
        .optional()?
        .map(|(row, rank, upvotes)| {
            Ok(ListedItem {
                item: Item::from_row(row)?,
                rank,
                upvotes,
            })
        })
        .transpose()
}

/// Items by id; missing ids are absent from the map
pub fn items_by_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<HashMap<String, Item>, ItemError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    items::table
        .filter(items::id.eq_any(ids))
        .select(ItemRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| Item::from_row(row).map(|item| (item.id.clone(), item)))
        .collect()
}

/// Items with statistics by id; missing ids are absent from the map
pub fn listed_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<HashMap<String, ListedItem>, ItemError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    items::table
        .inner_join(item_statistics::table)
        .filter(items::id.eq_any(ids))
        .select((ItemRow::as_select(), item_statistics::rank, item_statistics::upvotes))
        .load::<(ItemRow, f64, i64)>(conn)?
        .into_iter()
        .map(|(row, rank, upvotes)| {
            let item = Item::from_row(row)?;
            Ok((item.id.clone(), ListedItem { item, rank, upvotes }))
        })
        .collect()
}

/// Compact infos in the order of `ids`, skipping unknown ids
pub fn item_infos(conn: &mut SqliteConnection, ids: &[String]) -> Result<Vec<ItemInfo>, ItemError> {
    let found = items_by_ids(conn, ids)?;
    Ok(ids.iter().filter_map(|id| found.get(id)).map(ItemInfo::from).collect())
}

fn check_read_only(stored: &Item, item: &Item) -> Result<(), ItemError> {
    let changed = [
        ("item_type", stored.item_type != item.item_type),
        ("slug", stored.slug != item.slug),
        ("approval", stored.approval != item.approval),
        ("creator", stored.creator != item.creator),
        ("owner", stored.owner != item.owner),
        ("ownership", stored.ownership != item.ownership),
        ("created_at", stored.created_at != item.created_at),
    ];
    match changed.iter().find(|(_, differs)| *differs) {
        Some((field, _)) => Err(ItemError::ReadOnlyField(field.to_string())),
        None => Ok(()),
    }
}

fn is_unique_violation(e: &DieselError) -> bool {
    matches!(e, DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
}

/// Write back an edited item.
///
/// Only client-editable fields may differ from the stored row. The slug is
/// regenerated when the name changes.
pub fn update_item(
    conn: &mut SqliteConnection,
    item: &Item,
    allowed: &AllowedOwners,
) -> Result<Item, ItemError> {
    conn.transaction(|conn| {
        let stored = require_item(conn, &item.id)?;
        if !allowed.permits(&stored.owner) {
            return Err(ItemError::ItemNotOwned);
        }
        check_read_only(&stored, item)?;

        let mut updated = item.clone();
        let row = updated.to_row()?;
        let rename = stored.name != item.name;
        let base = base_slug(&item.name, item.item_type);

        let mut written = false;
        for attempt in 0..MAX_SLUG_ATTEMPTS {
            if rename {
                updated.slug = if attempt == 0 { base.clone() } else { suffixed(&base)? };
            }
            let result = diesel::update(items::table.find(&item.id))
                .set((
                    items::slug.eq(&updated.slug),
                    items::lang.eq(&row.lang),
                    items::name.eq(&row.name),
                    items::description.eq(&row.description),
                    items::featured_picture.eq(&row.featured_picture),
                    items::pictures.eq(&row.pictures),
                    items::tags.eq(&row.tags),
                    items::urls.eq(&row.urls),
                    items::attrs.eq(&row.attrs),
                ))
                .execute(conn);
            match result {
                Ok(_) => {
                    written = true;
                    break;
                }
                Err(e) if rename && is_unique_violation(&e) => {
                    debug!(slug = %updated.slug, attempt, "Slug taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        if !written {
            return Err(ItemError::SlugExhausted(base));
        }

        replace_tags(conn, &updated.id, &updated.tags)?;
        save_event(conn, "item-updated", &json!({"id": updated.id}))?;
        Ok(updated)
    })
}

/// Replace only `attrs`, without schema validation
pub fn update_availability(
    conn: &mut SqliteConnection,
    id: &str,
    attrs: &Map<String, Value>,
    allowed: &AllowedOwners,
) -> Result<Item, ItemError> {
    conn.transaction(|conn| {
        let mut item = require_item(conn, id)?;
        if !allowed.permits(&item.owner) {
            return Err(ItemError::ItemNotOwned);
        }
        let raw = serde_json::to_string(attrs).map_err(|e| ItemError::Database(e.to_string()))?;
        diesel::update(items::table.find(id))
            .set(items::attrs.eq(&raw))
            .execute(conn)?;
        item.attrs = attrs.clone();
        save_event(conn, "item-availability", &json!({"id": id}))?;
        Ok(item)
    })
}

pub fn set_approval(conn: &mut SqliteConnection, id: &str, approval: Approval) -> Result<Item, ItemError> {
    conn.transaction(|conn| {
        let mut item = require_item(conn, id)?;
        diesel::update(items::table.find(id))
            .set(items::approval.eq(approval.as_str()))
            .execute(conn)?;
        item.approval = approval;
        save_event(conn, "item-approval", &json!({"id": id, "approval": approval}))?;
        Ok(item)
    })
}

/// Hand an item to a new owner after a successful claim
pub fn transfer_ownership(conn: &mut SqliteConnection, id: &str, owner: &str) -> Result<(), ItemError> {
    let rows = diesel::update(items::table.find(id))
        .set((
            items::owner.eq(owner),
            items::ownership.eq(Ownership::Claimed.as_str()),
        ))
        .execute(conn)?;
    if rows == 0 {
        return Err(ItemError::ItemNotFound);
    }
    Ok(())
}

/// Delete an item and return its pictures.
///
/// Collection memberships are removed first so collection indexes stay
/// contiguous; tags, statistics, links and claims go by cascade.
pub fn delete_item(
    conn: &mut SqliteConnection,
    id: &str,
    allowed: &AllowedOwners,
) -> Result<Vec<String>, ItemError> {
    conn.transaction(|conn| {
        let item = require_item(conn, id)?;
        if !allowed.permits(&item.owner) {
            return Err(ItemError::ItemNotOwned);
        }
        collections::remove_item_everywhere(conn, id)?;
        diesel::delete(items::table.find(id)).execute(conn)?;
        save_event(conn, "item-deleted", &json!({"id": id}))?;
        Ok(item.pictures)
    })
}
