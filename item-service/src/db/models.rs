//! Row types for the item tables
//!
//! JSON-valued columns (`pictures`, `tags`, `urls`, `attrs`, link type sets)
//! are stored as text; conversion to domain types happens in `model`.

use diesel::prelude::*;

use super::schema::{
    events, item_colls, item_colls_items, item_link_types, item_links, item_statistics, items,
    ownership_claims,
};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ItemRow {
    pub id: String,
    pub item_type: String,
    pub slug: String,
    pub lang: String,
    pub name: String,
    pub description: String,
    pub featured_picture: String,
    pub pictures: String,
    pub tags: String,
    pub urls: String,
    pub attrs: String,
    pub approval: String,
    pub creator: String,
    pub owner: String,
    pub ownership: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = item_statistics)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StatisticsRow {
    pub item_id: String,
    pub rank: f64,
    pub upvotes: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = item_link_types)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LinkTypeRow {
    pub name: String,
    pub origin_types: String,
    pub target_types: String,
    pub unique_origin: bool,
    pub ownership: String,
    pub is_inverse: bool,
    pub inverse: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = item_links)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LinkRow {
    pub id: String,
    pub inverse_id: Option<String>,
    pub origin: String,
    pub target: String,
    pub link_type: String,
    pub owner: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = item_colls)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CollectionRow {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = item_colls)]
pub struct NewCollection<'a> {
    pub name: &'a str,
    pub owner: &'a str,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = item_colls_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MembershipRow {
    pub coll_id: i64,
    pub idx: i64,
    pub item_id: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ownership_claims)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClaimRow {
    pub id: String,
    pub owner_id: String,
    pub item_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent<'a> {
    pub label: &'a str,
    pub payload: &'a str,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventRow {
    pub id: i64,
    pub label: String,
    pub payload: String,
    pub created_at: String,
}
