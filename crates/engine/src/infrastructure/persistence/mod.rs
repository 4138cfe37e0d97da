//! SQL persistence adapters
//!
//! Implements [`PlaytimeRepo`] for SQLite and MySQL/MariaDB. Both backends open
//! one connection per call and bound every call with the same timeout, so a
//! database outage costs one failed call per event and nothing more.

mod mysql;
mod sqlite;


pub use mysql::MySqlPlaytimeRepo;
pub use sqlite::SqlitePlaytimeRepo;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use playtime_domain::PlayerId;

use crate::infrastructure::ports::{PlaytimeRepo, RepoError};

/// Column format for `SessionStart`, `SessionEnd` and `TimeChanged` (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-call limits shared by all backends.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Upper bound for connect + statements + commit of a single call.
    pub call_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Which backend a connection string points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    MySql,
}

impl DatabaseKind {
    /// Detect the backend from a DSN.
    ///
    /// Accepts `sqlite:` URLs, `mysql://`/`mariadb://` URLs, and ADO-style
    /// `Server=..;Database=..;` strings (always MySQL).
    pub fn detect(database_url: &str) -> Result<Self, RepoError> {
        let url = database_url.trim().to_ascii_lowercase();
        if url.is_empty() {
            return Err(RepoError::configuration("database url is empty"));
        }
        if url.starts_with("sqlite:") {
            return Ok(Self::Sqlite);
        }
        if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            return Ok(Self::MySql);
        }
        if url.contains('=') && url.contains(';') {
            return Ok(Self::MySql);
        }
        Err(RepoError::configuration(
            "unsupported database url (expected sqlite:, mysql:// or Server=...;)",
        ))
    }
}

/// Build the repository for `database_url`.
pub fn open_repo(
    database_url: &str,
    options: GatewayOptions,
) -> Result<Arc<dyn PlaytimeRepo>, RepoError> {
    let repo: Arc<dyn PlaytimeRepo> = match DatabaseKind::detect(database_url)? {
        DatabaseKind::Sqlite => Arc::new(SqlitePlaytimeRepo::new(database_url, options)?),
        DatabaseKind::MySql => Arc::new(MySqlPlaytimeRepo::new(database_url, options)?),
    };
    Ok(repo)
}

/// Run a whole gateway call under the per-call timeout.
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, RepoError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RepoError::timeout(operation, timeout)),
    }
}

/// Classify a driver error for `operation`.
pub(crate) fn map_sqlx_error(operation: &'static str, e: sqlx::Error) -> RepoError {
    use sqlx::error::ErrorKind;

    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => RepoError::connection(operation, e),
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => RepoError::constraint(operation, e),
            _ => RepoError::database(operation, e),
        },
        _ => RepoError::database(operation, e),
    }
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(operation: &'static str, raw: &str) -> Result<DateTime<Utc>, RepoError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| RepoError::database(operation, format!("bad timestamp `{raw}`: {e}")))
}

pub(crate) fn parse_player_id(operation: &'static str, raw: String) -> Result<PlayerId, RepoError> {
    PlayerId::new(raw).map_err(|e| RepoError::database(operation, e))
}
