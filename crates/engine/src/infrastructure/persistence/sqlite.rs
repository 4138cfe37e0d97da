//! SQLite-backed playtime storage.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
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
        TotalTime DOUBLE NOT NULL DEFAULT 0.0,
        Nickname VARCHAR(255) NOT NULL,
        AdminRole VARCHAR(64) DEFAULT NULL
    )
"#;

const CREATE_PLAYER_SESSIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS PlayerSessions (
        SessionId INTEGER PRIMARY KEY AUTOINCREMENT,
        PlayerId VARCHAR(255) NOT NULL REFERENCES PlayerStats(PlayerId),
        SessionStart TEXT NOT NULL,
        SessionEnd TEXT NOT NULL,
        SessionTime DOUBLE NOT NULL
    )
"#;

const CREATE_PLAYER_ROLES: &str = r#"
    CREATE TABLE IF NOT EXISTS PlayerRoles (
        RoleId INTEGER PRIMARY KEY AUTOINCREMENT,
        PlayerId VARCHAR(255) NOT NULL REFERENCES PlayerStats(PlayerId),
        RoleName VARCHAR(255) NOT NULL,
        TimeChanged TEXT NOT NULL
    )
"#;

/// SQLite implementation of [`PlaytimeRepo`].
///
/// Holds connect options only; every call opens and closes its own connection.
pub struct SqlitePlaytimeRepo {
    options: SqliteConnectOptions,
    call_timeout: Duration,
}

impl SqlitePlaytimeRepo {
    pub fn new(database_url: &str, gateway: GatewayOptions) -> Result<Self, RepoError> {
        // A fresh connection per call would see a fresh empty database.
        if database_url.contains(":memory:") || database_url.contains("mode=memory") {
            return Err(RepoError::configuration(
                "in-memory SQLite databases are not supported; use a file path",
            ));
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(RepoError::configuration)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(gateway.call_timeout);

        Ok(Self {
            options,
            call_timeout: gateway.call_timeout,
        })
    }

    async fn open(&self, operation: &'static str) -> Result<SqliteConnection, RepoError> {
        self.options
            .connect()
            .await
            .map_err(|e| RepoError::connection(operation, e))
    }
}

fn stats_from_row(row: &SqliteRow) -> Result<PlayerStats, RepoError> {
    const OP: &str = "get_player_stats";
    let get = |e| map_sqlx_error(OP, e);
    Ok(PlayerStats {
        player_id: parse_player_id(OP, row.try_get("PlayerId").map_err(get)?)?,
        nickname: row.try_get("Nickname").map_err(get)?,
        total_time_seconds: row.try_get("TotalTime").map_err(get)?,
        admin_role: row.try_get("AdminRole").map_err(get)?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SessionRecord, RepoError> {
    const OP: &str = "list_sessions";
    let get = |e| map_sqlx_error(OP, e);
    let start: String = row.try_get("SessionStart").map_err(get)?;
    let end: String = row.try_get("SessionEnd").map_err(get)?;
    Ok(SessionRecord {
        session_id: row.try_get("SessionId").map_err(get)?,
        player_id: parse_player_id(OP, row.try_get("PlayerId").map_err(get)?)?,
        session_start: parse_timestamp(OP, &start)?,
        session_end: parse_timestamp(OP, &end)?,
        session_seconds: row.try_get("SessionTime").map_err(get)?,
    })
}

fn role_from_row(row: &SqliteRow) -> Result<RoleChangeRecord, RepoError> {
    const OP: &str = "list_role_changes";
    let get = |e| map_sqlx_error(OP, e);
    let changed: String = row.try_get("TimeChanged").map_err(get)?;
    Ok(RoleChangeRecord {
        role_id: row.try_get("RoleId").map_err(get)?,
        player_id: parse_player_id(OP, row.try_get("PlayerId").map_err(get)?)?,
        role_name: row.try_get("RoleName").map_err(get)?,
        changed_at: parse_timestamp(OP, &changed)?,
    })
}

#[async_trait]
impl PlaytimeRepo for SqlitePlaytimeRepo {
    async fn ensure_schema(&self) -> Result<(), RepoError> {
        const OP: &str = "ensure_schema";
        bounded(OP, self.call_timeout, async {
            let mut conn = self.open(OP).await?;
            let mut tx = conn.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

            for (table, ddl) in [
                ("PlayerStats", CREATE_PLAYER_STATS),
                ("PlayerSessions", CREATE_PLAYER_SESSIONS),
                ("PlayerRoles", CREATE_PLAYER_ROLES),
            ] {
                sqlx::query(ddl)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error(OP, e))?;
                tracing::debug!(table, "Table ensured");
            }

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_player_sessions_player ON PlayerSessions(PlayerId)",
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            // A replayed session write must not add a second row.
            sqlx::query(
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS uq_player_sessions_span
                ON PlayerSessions(PlayerId, SessionStart, SessionEnd, SessionTime)
                "#,
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_player_roles_player ON PlayerRoles(PlayerId)",
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            tx.commit().await.map_err(|e| map_sqlx_error(OP, e))?;
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
                VALUES (?, ?, 0.0, ?)
                ON CONFLICT(PlayerId) DO UPDATE SET
                    Nickname = excluded.Nickname,
                    AdminRole = excluded.AdminRole
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
            let mut tx = conn.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

            // Parent row first so the session insert satisfies the foreign key.
            sqlx::query(
                r#"
                INSERT INTO PlayerStats (PlayerId, Nickname, TotalTime)
                VALUES (?, ?, 0.0)
                ON CONFLICT(PlayerId) DO NOTHING
                "#,
            )
            .bind(session.player_id().as_str())
            .bind(nickname)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO PlayerSessions (PlayerId, SessionStart, SessionEnd, SessionTime)
                VALUES (?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(session.player_id().as_str())
            .bind(format_timestamp(session.started_at()))
            .bind(format_timestamp(session.ended_at()))
            .bind(session.seconds())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?
            .rows_affected();

            if inserted == 0 {
                tracing::info!(
                    player_id = %session.player_id(),
                    session_start = %session.started_at(),
                    "Session already recorded; total left unchanged"
                );
                return Ok(());
            }

            sqlx::query("UPDATE PlayerStats SET TotalTime = TotalTime + ? WHERE PlayerId = ?")
                .bind(session.seconds())
                .bind(session.player_id().as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(OP, e))?;

            tx.commit().await.map_err(|e| map_sqlx_error(OP, e))?;
            Ok(())
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
                VALUES (?, ?, 0.0)
                ON CONFLICT(PlayerId) DO NOTHING
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
                SELECT SessionId, PlayerId, SessionStart, SessionEnd, SessionTime
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
                SELECT RoleId, PlayerId, RoleName, TimeChanged
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
                       COALESCE(SUM(s.SessionTime), 0.0) AS SessionSum
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
