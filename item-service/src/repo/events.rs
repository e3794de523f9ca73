//! Audit events written alongside the change they describe

use diesel::prelude::*;
use serde::Serialize;

use platform_core::db::current_timestamp;

use crate::db::models::{EventRow, NewEvent};
use crate::db::schema::events;
use crate::error::ItemError;

/// Append an audit row; call inside the mutation's transaction
pub fn save_event<T: Serialize + ?Sized>(
    conn: &mut SqliteConnection,
    label: &str,
    payload: &T,
) -> Result<(), ItemError> {
    let payload = serde_json::to_string(payload).map_err(|e| ItemError::Database(e.to_string()))?;
    let now = current_timestamp();
    diesel::insert_into(events::table)
        .values(&NewEvent {
            label,
            payload: &payload,
            created_at: &now,
        })
        .execute(conn)?;
    Ok(())
}

/// Most recent events first
pub fn recent_events(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<EventRow>, ItemError> {
    Ok(events::table
        .order(events::id.desc())
        .limit(limit)
        .select(EventRow::as_select())
        .load(conn)?)
}
