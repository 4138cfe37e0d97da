//! MySQL/MariaDB-backed playtime storage.
//!
//! Tables are created as InnoDB so the coupled total + session write can run
//! in one transaction. Tables that already exist with a non-transactional
//! engine are detected in `ensure_schema`; for those the session row is
//! written before the total, and a failure between the two is reported as a
//! partial write for reconciliation to repair.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Row};

use playtime_domain::{
    CompletedSession, PlayerId, PlayerMeta, PlayerStats, RoleChange, RoleChangeRecord,
    SessionRecord, TotalDrift,
};

use super::{
    bounded, format_timestamp, map_sqlx_error, parse_player_id, parse_timestamp, GatewayOptions,
};
use crate::infrastructure::ports::{PlaytimeRepo, RepoError};

const CREATE_PLAYER_STATS: &str = r#"
    CREATE TABLE IF NOT EXISTS PlayerStats (
        PlayerId VARCHAR(255) PRIMARY KEY,
        TotalTime DOUBLE NOT NULL DEFAULT 0,
        Nickname VARCHAR(255) NOT NULL,
        AdminRole VARCHAR(64) DEFAULT NULL
    ) ENGINE=InnoDB
"#;

const CREATE_PLAYER_SESSIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS PlayerSessions (
        SessionId INT AUTO_INCREMENT PRIMARY KEY,
        PlayerId VARCHAR(255) NOT NULL,
        SessionStart DATETIME NOT NULL,
        SessionEnd DATETIME NOT NULL,
        SessionTime DOUBLE NOT NULL,
        INDEX idx_player_sessions_player (PlayerId),
        UNIQUE KEY uq_player_sessions_span (PlayerId, SessionStart, SessionEnd, SessionTime),
        FOREIGN KEY (PlayerId) REFERENCES PlayerStats(PlayerId)
    ) ENGINE=InnoDB
"#;

const CREATE_PLAYER_ROLES: &str = r#"
    CREATE TABLE IF NOT EXISTS PlayerRoles (
        RoleId INT AUTO_INCREMENT PRIMARY KEY,
        PlayerId VARCHAR(255) NOT NULL,
        RoleName VARCHAR(255) NOT NULL,
        TimeChanged DATETIME NOT NULL,
        INDEX idx_player_roles_player (PlayerId),
        FOREIGN KEY (PlayerId) REFERENCES PlayerStats(PlayerId)
    ) ENGINE=InnoDB
"#;

const ENSURE_PLAYER: &str = r#"
    INSERT INTO PlayerStats (PlayerId, Nickname, TotalTime)
    VALUES (?, ?, 0)
    ON DUPLICATE KEY UPDATE PlayerId = PlayerId
"#;

const ADD_SESSION_TIME: &str = r#"
    INSERT INTO PlayerStats (PlayerId, Nickname, TotalTime)
    VALUES (?, ?, ?)
    ON DUPLICATE KEY UPDATE TotalTime = TotalTime + VALUES(TotalTime)
"#;

/// Skips a row already recorded under `uq_player_sessions_span`.
const INSERT_SESSION: &str = r#"
    INSERT IGNORE INTO PlayerSessions (PlayerId, SessionStart, SessionEnd, SessionTime)
    VALUES (?, ?, ?, ?)
"#;

/// MySQL implementation of [`PlaytimeRepo`].
pub struct MySqlPlaytimeRepo {
    options: MySqlConnectOptions,
    call_timeout: Duration,
    /// Cleared by `ensure_schema` when the session tables are not InnoDB.
    transactional: AtomicBool,
}

impl MySqlPlaytimeRepo {
    pub fn new(database_url: &str, gateway: GatewayOptions) -> Result<Self, RepoError> {
        Ok(Self {
            options: parse_connect_options(database_url)?,
            call_timeout: gateway.call_timeout,
            transactional: AtomicBool::new(true),
        })
    }

    async fn open(&self, operation: &'static str) -> Result<MySqlConnection, RepoError> {
        self.options
            .connect()
            .await
            .map_err(|e| RepoError::connection(operation, e))
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional.load(Ordering::Relaxed)
    }

    async fn record_session_atomic(
        &self,
        conn: &mut MySqlConnection,
        nickname: &str,
        session: &CompletedSession,
    ) -> Result<(), RepoError> {
        const OP: &str = "record_completed_session";
        let mut tx = conn.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

        sqlx::query(ENSURE_PLAYER)
            .bind(session.player_id().as_str())
            .bind(nickname)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

        let inserted = sqlx::query(INSERT_SESSION)
            .bind(session.player_id().as_str())
            .bind(format_timestamp(session.started_at()))
            .bind(format_timestamp(session.ended_at()))
            .bind(session.seconds())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?
            .rows_affected();
        if inserted == 0 {
            log_already_recorded(session);
            return Ok(());
        }

        sqlx::query("UPDATE PlayerStats SET TotalTime = TotalTime + ? WHERE PlayerId = ?")
            .bind(session.seconds())
            .bind(session.player_id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))
    }

    /// Session row first: it is append-only, so a retry after a failure here
    /// is safe, and a failure after it leaves drift that reconciliation can see.
    async fn record_session_compensating(
        &self,
        conn: &mut MySqlConnection,
        nickname: &str,
        session: &CompletedSession,
    ) -> Result<(), RepoError> {
        const OP: &str = "record_completed_session";

        let inserted = sqlx::query(INSERT_SESSION)
            .bind(session.player_id().as_str())
            .bind(format_timestamp(session.started_at()))
            .bind(format_timestamp(session.ended_at()))
            .bind(session.seconds())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?
            .rows_affected();
        if inserted == 0 {
            log_already_recorded(session);
            return Ok(());
        }

        sqlx::query(ADD_SESSION_TIME)
            .bind(session.player_id().as_str())
            .bind(nickname)
            .bind(session.seconds())
            .execute(&mut *conn)
            .await
            .map_err(|e| RepoError::partial_write(OP, session.player_id(), e))?;

        Ok(())
    }
}

fn log_already_recorded(session: &CompletedSession) {
    tracing::info!(
        player_id = %session.player_id(),
        session_start = %session.started_at(),
        "Session already recorded; total left unchanged"
    );
}

/// Parse a `mysql://`/`mariadb://` URL or an ADO-style `Key=Value;` string.
pub(crate) fn parse_connect_options(database_url: &str) -> Result<MySqlConnectOptions, RepoError> {
    let trimmed = database_url.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("mysql://") {
        return MySqlConnectOptions::from_str(trimmed).map_err(RepoError::configuration);
    }
    if lower.starts_with("mariadb://") {
        let url = format!("mysql://{}", &trimmed["mariadb://".len()..]);
        return MySqlConnectOptions::from_str(&url).map_err(RepoError::configuration);
    }

    parse_ado_connection_string(trimmed)
}

fn parse_ado_connection_string(raw: &str) -> Result<MySqlConnectOptions, RepoError> {
    let mut options = MySqlConnectOptions::new();
    let mut has_host = false;

    for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            RepoError::configuration("connection string segment without `=`")
        })?;
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "server" | "host" | "data source" | "datasource" => {
                options = options.host(value);
                has_host = true;
            }
            "port" => {
                let port = value.parse::<u16>().map_err(|_| {
                    RepoError::configuration(format!("invalid port `{value}` in connection string"))
                })?;
                options = options.port(port);
            }
            "database" | "initial catalog" => options = options.database(value),
            "uid" | "user" | "user id" | "userid" | "username" => options = options.username(value),
            "pwd" | "password" => options = options.password(value),
            other => {
                tracing::debug!(option = other, "Ignoring unsupported connection string option");
            }
        }
    }

    if !has_host {
        return Err(RepoError::configuration("connection string has no Server"));
    }
    Ok(options)
}

fn stats_from_row(row: &MySqlRow) -> Result<PlayerStats, RepoError> {
    const OP: &str = "get_player_stats";
    let get = |e| map_sqlx_error(OP, e);
    Ok(PlayerStats {
        player_id: parse_player_id(OP, row.try_get("PlayerId").map_err(get)?)?,
        nickname: row.try_get("Nickname").map_err(get)?,
        total_time_seconds: row.try_get("TotalTime").map_err(get)?,
        admin_role: row.try_get("AdminRole").map_err(get)?,
    })
}

fn session_from_row(row: &MySqlRow) -> Result<SessionRecord, RepoError> {
    const OP: &str = "list_sessions";
    let get = |e| map_sqlx_error(OP, e);
    let start: String = row.try_get("SessionStart").map_err(get)?;
    let end: String = row.try_get("SessionEnd").map_err(get)?;
    let session_id: i32 = row.try_get("SessionId").map_err(get)?;
    Ok(SessionRecord {
        session_id: i64::from(session_id),
        player_id: parse_player_id(OP, row.try_get("PlayerId").map_err(get)?)?,
        session_start: parse_timestamp(OP, &start)?,
        session_end: parse_timestamp(OP, &end)?,
        session_seconds: row.try_get("SessionTime").map_err(get)?,
    })
}

fn role_from_row(row: &MySqlRow) -> Result<RoleChangeRecord, RepoError> {
    const OP: &str = "list_role_changes";
    let get = |e| map_sqlx_error(OP, e);
    let changed: String = row.try_get("TimeChanged").map_err(get)?;
    let role_id: i32 = row.try_get("RoleId").map_err(get)?;
    Ok(RoleChangeRecord {
        role_id: i64::from(role_id),
        player_id: parse_player_id(OP, row.try_get("PlayerId").map_err(get)?)?,
        role_name: row.try_get("RoleName").map_err(get)?,
        changed_at: parse_timestamp(OP, &changed)?,
    })
}

#[async_trait]
impl PlaytimeRepo for MySqlPlaytimeRepo {
    async fn ensure_schema(&self) -> Result<(), RepoError> {
        const OP: &str = "ensure_schema";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;

            // MySQL commits DDL implicitly, so no transaction here.
            for (table, ddl) in [
                ("PlayerStats", CREATE_PLAYER_STATS),
                ("PlayerSessions", CREATE_PLAYER_SESSIONS),
                ("PlayerRoles", CREATE_PLAYER_ROLES),
            ] {
                sqlx::query(ddl)
                    .execute(&mut conn)
                    .await
                    .map_err(|e| map_sqlx_error(OP, e))?;
                tracing::debug!(table, "Table ensured");
            }

            let non_transactional: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM information_schema.TABLES
                WHERE TABLE_SCHEMA = DATABASE()
                  AND TABLE_NAME IN ('PlayerStats', 'PlayerSessions')
                  AND UPPER(ENGINE) <> 'INNODB'
                "#,
            )
            .fetch_one(&mut conn)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            let transactional = non_transactional == 0;
            if !transactional {
                tracing::warn!(
                    "PlayerStats/PlayerSessions are not InnoDB; session writes are not atomic \
                     and partial writes will need reconciliation"
                );
            }
            self.transactional.store(transactional, Ordering::Relaxed);
            Ok(())
        })
        .await
    }

    async fn upsert_player_meta(&self, meta: &PlayerMeta) -> Result<(), RepoError> {
        const OP: &str = "upsert_player_meta";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            sqlx::query(
                r#"
                INSERT INTO PlayerStats (PlayerId, Nickname, TotalTime, AdminRole)
                VALUES (?, ?, 0, ?)
                ON DUPLICATE KEY UPDATE
                    Nickname = VALUES(Nickname),
                    AdminRole = VALUES(AdminRole)
                "#,
            )
            .bind(meta.player_id.as_str())
            .bind(&meta.nickname)
            .bind(meta.admin_role.as_deref())
            .execute(&mut conn)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
            Ok(())
        })
        .await
    }

    async fn record_completed_session(
        &self,
        nickname: &str,
        session: &CompletedSession,
    ) -> Result<(), RepoError> {
        const OP: &str = "record_completed_session";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            if self.is_transactional() {
                self.record_session_atomic(&mut conn, nickname, session).await
            } else {
                self.record_session_compensating(&mut conn, nickname, session)
                    .await
            }
        })
        .await
    }

    async fn record_role_change(&self, change: &RoleChange) -> Result<(), RepoError> {
        const OP: &str = "record_role_change";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            let mut tx = conn.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

            sqlx::query(
                r#"
                INSERT INTO PlayerStats (PlayerId, Nickname, TotalTime)
                VALUES (?, ?, 0)
                ON DUPLICATE KEY UPDATE PlayerId = PlayerId
                "#,
            )
            .bind(change.player_id.as_str())
            .bind(&change.nickname)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            sqlx::query("INSERT INTO PlayerRoles (PlayerId, RoleName, TimeChanged) VALUES (?, ?, ?)")
                .bind(change.player_id.as_str())
                .bind(&change.role_name)
                .bind(format_timestamp(change.changed_at))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(OP, e))?;

            tx.commit().await.map_err(|e| map_sqlx_error(OP, e))?;
            Ok(())
        })
        .await
    }

    async fn get_player_stats(
        &self,
        player_id: &PlayerId,
    ) -> Result<Option<PlayerStats>, RepoError> {
        const OP: &str = "get_player_stats";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            let row = sqlx::query(
                "SELECT PlayerId, Nickname, TotalTime, AdminRole FROM PlayerStats WHERE PlayerId = ?",
            )
            .bind(player_id.as_str())
            .fetch_optional(&mut conn)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            row.as_ref().map(stats_from_row).transpose()
        })
        .await
    }

    async fn list_sessions(&self, player_id: &PlayerId) -> Result<Vec<SessionRecord>, RepoError> {
        const OP: &str = "list_sessions";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            let rows = sqlx::query(
                r#"
                SELECT SessionId, PlayerId,
                       DATE_FORMAT(SessionStart, '%Y-%m-%d %H:%i:%s') AS SessionStart,
                       DATE_FORMAT(SessionEnd, '%Y-%m-%d %H:%i:%s') AS SessionEnd,
                       SessionTime
                FROM PlayerSessions WHERE PlayerId = ? ORDER BY SessionId
                "#,
            )
            .bind(player_id.as_str())
            .fetch_all(&mut conn)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            rows.iter().map(session_from_row).collect()
        })
        .await
    }

    async fn list_role_changes(
        &self,
        player_id: &PlayerId,
    ) -> Result<Vec<RoleChangeRecord>, RepoError> {
        const OP: &str = "list_role_changes";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            let rows = sqlx::query(
                r#"
                SELECT RoleId, PlayerId, RoleName,
                       DATE_FORMAT(TimeChanged, '%Y-%m-%d %H:%i:%s') AS TimeChanged
                FROM PlayerRoles WHERE PlayerId = ? ORDER BY RoleId
                "#,
            )
            .bind(player_id.as_str())
            .fetch_all(&mut conn)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            rows.iter().map(role_from_row).collect()
        })
        .await
    }

    async fn reconcile_totals(&self) -> Result<Vec<TotalDrift>, RepoError> {
        const OP: &str = "reconcile_totals";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            let mut tx = conn.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

            let rows = sqlx::query(
                r#"
                SELECT ps.PlayerId AS PlayerId,
                       ps.TotalTime AS TotalTime,
                       COALESCE(SUM(s.SessionTime), 0e0) AS SessionSum
                FROM PlayerStats ps
                LEFT JOIN PlayerSessions s ON s.PlayerId = ps.PlayerId
                GROUP BY ps.PlayerId, ps.TotalTime
                "#,
            )
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            let mut drifts = Vec::new();
            for row in &rows {
                let player_id = parse_player_id(
                    OP,
                    row.try_get("PlayerId").map_err(|e| map_sqlx_error(OP, e))?,
                )?;
                let total: f64 = row.try_get("TotalTime").map_err(|e| map_sqlx_error(OP, e))?;
                let sum: f64 = row.try_get("SessionSum").map_err(|e| map_sqlx_error(OP, e))?;
                if let Some(drift) = TotalDrift::new(player_id, total, sum) {
                    drifts.push(drift);
                }
            }

            for drift in &drifts {
                sqlx::query("UPDATE PlayerStats SET TotalTime = ? WHERE PlayerId = ?")
                    .bind(drift.session_sum)
                    .bind(drift.player_id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error(OP, e))?;
            }

            tx.commit().await.map_err(|e| map_sqlx_error(OP, e))?;
            Ok(drifts)
        })
        .await
    }
}
