//! Row types for the gateway tables

use diesel::prelude::*;

use super::schema::{login_tokens, sessions};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = login_tokens)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LoginTokenRow {
    pub token: String,
    pub email: String,
    pub site: String,
    pub language: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: String,
}
