//! Item rank and upvote counters

use std::collections::HashMap;

use diesel::prelude::*;

use crate::db::schema::item_statistics;
use crate::error::ItemError;

/// Set an item's rank; missing items are ignored and reported as `false`
pub fn set_rank(conn: &mut SqliteConnection, item_id: &str, rank: f64) -> Result<bool, ItemError> {
    let rows = diesel::update(item_statistics::table.find(item_id))
        .set(item_statistics::rank.eq(rank))
        .execute(conn)?;
    Ok(rows == 1)
}

/// Set an item's upvote count; returns `true` only if the value changed
pub fn set_upvotes(conn: &mut SqliteConnection, item_id: &str, upvotes: i64) -> Result<bool, ItemError> {
    let rows = diesel::update(
        item_statistics::table
            .find(item_id)
            .filter(item_statistics::upvotes.ne(upvotes)),
    )
    .set(item_statistics::upvotes.eq(upvotes))
    .execute(conn)?;
    Ok(rows == 1)
}

/// Current upvote counts for every item
pub fn all_upvotes(conn: &mut SqliteConnection) -> Result<HashMap<String, i64>, ItemError> {
    Ok(item_statistics::table
        .select((item_statistics::item_id, item_statistics::upvotes))
        .load::<(String, i64)>(conn)?
        .into_iter()
        .collect())
}
