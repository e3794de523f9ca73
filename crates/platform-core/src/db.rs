//! SQLite connection pool shared by the services
//!
//! Diesel connections are blocking, so async callers go through [`run`],
//! which executes the closure on tokio's blocking pool.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use crate::error::CoreError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Pool acquisition deadline, also the start-up connect deadline
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed-width UTC format; lexical order equals chronological order
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open a pool, failing if no connection is available within [`CONNECT_TIMEOUT`]
pub fn connect(database_url: &str, max_size: u32) -> Result<DbPool, CoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .connection_timeout(CONNECT_TIMEOUT)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|e| CoreError::Database(format!("Failed to open {}: {}", database_url, e)))
}

/// Run a blocking database closure on the blocking pool
pub async fn run<F, T, E>(pool: &DbPool, f: F) -> Result<T, E>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<CoreError> + Send + 'static,
{
    let pool = pool.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| E::from(CoreError::from(e)))?;
        f(&mut conn)
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => Err(E::from(CoreError::Database(format!(
            "Blocking task failed: {}",
            e
        )))),
    }
}

/// Current UTC time in [`TIMESTAMP_FORMAT`]
pub fn current_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CoreError::Database(format!("Bad timestamp {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::prelude::*;
    use diesel::sql_types::Integer;
    use tempfile::TempDir;

    #[derive(QueryableByName)]
    struct Flag {
        #[diesel(sql_type = Integer)]
        foreign_keys: i32,
    }

    #[tokio::test]
    async fn test_pool_enables_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().join("t.db").to_string_lossy().to_string();
        let pool = connect(&url, 2).unwrap();

        let flag: Flag = run(&pool, |conn| {
            diesel::sql_query("PRAGMA foreign_keys")
                .get_result::<Flag>(conn)
                .map_err(CoreError::from)
        })
        .await
        .unwrap();
        assert_eq!(flag.foreign_keys, 1);
    }

    #[test]
    fn test_timestamp_round_trip_and_order() {
        let earlier = current_timestamp();
        let later = format_timestamp(Utc::now() + chrono::Duration::seconds(1));
        assert!(earlier < later);

        let parsed = parse_timestamp(&earlier).unwrap();
        assert_eq!(format_timestamp(parsed), earlier);
    }
}
