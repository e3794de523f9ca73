//! Login tokens and sessions
//!
//! Every multi-step mutation runs inside one SQLite transaction. Login tokens
//! are single use: redemption deletes the row together with every expired
//! token, and issuing a new token for an email deletes that email's older ones.

use std::time::Duration;

use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, warn};

use platform_core::db::{self as core_db, current_timestamp, format_timestamp, DbPool};
use platform_core::ids::{self, LOGIN_TOKEN_LEN};

use crate::db::models::{LoginTokenRow, SessionRow};
use crate::db::schema::{login_tokens, sessions};
use crate::error::GatewayError;

/// How long an emailed login token stays valid
pub const LOGIN_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Attempts at drawing a free token before giving up
pub const MAX_TOKEN_ATTEMPTS: usize = 8;

/// Length of the opaque session token
pub const SESSION_TOKEN_LEN: usize = 16;

/// How often expired login tokens are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What a redeemed login token was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub site: String,
    pub language: String,
}

/// A logged-in user as recorded against a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            user_id: row.user_id,
            email: row.email,
            is_admin: row.is_admin,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    pool: DbPool,
}

impl SessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Issue a fresh 6-digit token for `email`, replacing any older one
    pub async fn create_login_token(
        &self,
        email: &str,
        site: &str,
        language: &str,
    ) -> Result<String, GatewayError> {
        let email = email.to_string();
        let site = site.to_string();
        let language = language.to_string();

        core_db::run(&self.pool, move |conn| {
            conn.transaction(|conn| {
                let now = current_timestamp();
                diesel::delete(
                    login_tokens::table.filter(
                        login_tokens::email
                            .eq(&email)
                            .or(login_tokens::expires_at.lt(&now)),
                    ),
                )
                .execute(conn)?;

                let ttl = chrono::Duration::from_std(LOGIN_TOKEN_TTL)
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                let expires_at = format_timestamp(Utc::now() + ttl);

                for attempt in 1..=MAX_TOKEN_ATTEMPTS {
                    let token = ids::rand_numeric_token(LOGIN_TOKEN_LEN)?;
                    let row = LoginTokenRow {
                        token: token.clone(),
                        email: email.clone(),
                        site: site.clone(),
                        language: language.clone(),
                        expires_at: expires_at.clone(),
                    };
                    let inserted = diesel::insert_into(login_tokens::table)
                        .values(&row)
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                    if inserted == 1 {
                        return Ok(token);
                    }
                    debug!(attempt, "Login token collision, retrying");
                }

                warn!(email = %email, "Exhausted login token attempts");
                Err(GatewayError::TokenExhausted)
            })
        })
        .await
    }

    /// Redeem a login token; unknown and expired tokens fail alike
    pub async fn check_login_token(&self, token: &str) -> Result<LoginRequest, GatewayError> {
        let token = token.to_string();

        core_db::run(&self.pool, move |conn| {
            conn.transaction(|conn| {
                let now = current_timestamp();
                let row: Option<LoginTokenRow> = login_tokens::table
                    .filter(login_tokens::token.eq(&token))
                    .filter(login_tokens::expires_at.ge(&now))
                    .select(LoginTokenRow::as_select())
                    .first(conn)
                    .optional()?;

                diesel::delete(
                    login_tokens::table.filter(
                        login_tokens::token
                            .eq(&token)
                            .or(login_tokens::expires_at.lt(&now)),
                    ),
                )
                .execute(conn)?;

                match row {
                    Some(row) => Ok(LoginRequest {
                        email: row.email,
                        site: row.site,
                        language: row.language,
                    }),
                    None => Err(GatewayError::UnknownLoginToken),
                }
            })
        })
        .await
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        is_admin: bool,
    ) -> Result<String, GatewayError> {
        let row = SessionRow {
            token: ids::new_bare_id(SESSION_TOKEN_LEN)?,
            user_id: user_id.to_string(),
            email: email.to_string(),
            is_admin,
            created_at: current_timestamp(),
        };

        core_db::run(&self.pool, move |conn| {
            diesel::insert_into(sessions::table)
                .values(&row)
                .execute(conn)?;
            Ok(row.token)
        })
        .await
    }

    pub async fn lookup_session(&self, token: &str) -> Result<Session, GatewayError> {
        let token = token.to_string();

        core_db::run(&self.pool, move |conn| {
            sessions::table
                .filter(sessions::token.eq(&token))
                .select(SessionRow::as_select())
                .first(conn)
                .optional()?
                .map(Session::from)
                .ok_or(GatewayError::SessionNotFound)
        })
        .await
    }

    /// Push a user's new email and admin flag into all of their sessions
    pub async fn update_sessions(
        &self,
        user_id: &str,
        email: &str,
        is_admin: bool,
    ) -> Result<usize, GatewayError> {
        let user_id = user_id.to_string();
        let email = email.to_string();

        core_db::run(&self.pool, move |conn| {
            let updated = diesel::update(sessions::table.filter(sessions::user_id.eq(&user_id)))
                .set((sessions::email.eq(&email), sessions::is_admin.eq(is_admin)))
                .execute(conn)?;
            Ok(updated)
        })
        .await
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), GatewayError> {
        let token = token.to_string();

        core_db::run(&self.pool, move |conn| {
            diesel::delete(sessions::table.filter(sessions::token.eq(&token))).execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn delete_user_sessions(&self, user_id: &str) -> Result<usize, GatewayError> {
        let user_id = user_id.to_string();

        core_db::run(&self.pool, move |conn| {
            let deleted = diesel::delete(sessions::table.filter(sessions::user_id.eq(&user_id)))
                .execute(conn)?;
            Ok(deleted)
        })
        .await
    }

    /// Cheap round trip to the database
    pub async fn ping(&self) -> Result<(), GatewayError> {
        core_db::run(&self.pool, |conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Remove every expired login token
    pub async fn delete_expired_tokens(&self) -> Result<usize, GatewayError> {
        core_db::run(&self.pool, move |conn| {
            let now = current_timestamp();
            let deleted =
                diesel::delete(login_tokens::table.filter(login_tokens::expires_at.lt(&now)))
                    .execute(conn)?;
            Ok(deleted)
        })
        .await
    }

    /// Periodically sweep expired login tokens for the life of the process
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.delete_expired_tokens().await {
                    Ok(0) => {}
                    Ok(n) => info!(deleted = n, "Swept expired login tokens"),
                    Err(e) => warn!(error = %e, "Login token sweep failed"),
                }
            }
        })
    }
}
