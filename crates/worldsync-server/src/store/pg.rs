//! Postgres `WorldStore` backend.
//!
//! Thin wrapper over the SQL schema and stored procedures in `migrations/`.
//! All claim/sweep atomicity lives in the database functions; this layer only
//! binds parameters and maps rows.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use worldsync_core::config::WorldConfig;
use worldsync_core::types::{SessionRecord, SyncGroup, TickRecord};
use worldsync_core::{Result, WorldError};

use super::{SweepReport, WorldStore};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and run pending migrations.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(err: sqlx::Error) -> WorldError {
    WorldError::Persistence(err.to_string())
}

fn session_from_row(row: &PgRow) -> std::result::Result<SessionRecord, sqlx::Error> {
    Ok(SessionRecord {
        session_id: row.try_get("general__session_id")?,
        agent_id: row.try_get("auth__agent_id")?,
        provider: row.try_get("auth__provider_name")?,
        created_at: row.try_get("general__created_at")?,
        last_heartbeat: row.try_get("session__last_seen_at")?,
        is_active: row.try_get("is_active")?,
    })
}

fn tick_from_row(row: &PgRow) -> std::result::Result<TickRecord, sqlx::Error> {
    Ok(TickRecord {
        sync_group: row.try_get("group__sync_group")?,
        tick_number: row.try_get("tick__number")?,
        captured_at: row.try_get("tick__captured_at")?,
        duration_ms: row.try_get("tick__duration_ms")?,
        is_delayed: row.try_get("tick__is_delayed")?,
        entity_states: row.try_get("tick__entity_states")?,
        metadata_states: row.try_get("tick__metadata_states")?,
    })
}

#[async_trait]
impl WorldStore for PgStore {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT general__session_id, auth__agent_id, auth__provider_name, \
                    general__created_at, session__last_seen_at, \
                    (session__is_active AND session__expires_at > now()) AS is_active \
             FROM auth.agent_sessions \
             WHERE general__session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(db_err)
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE auth.agent_sessions \
             SET session__last_seen_at = now() \
             WHERE general__session_id = $1 \
               AND session__is_active = true \
               AND session__expires_at > now()",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn invalidate_session(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE auth.agent_sessions \
             SET session__is_active = false \
             WHERE general__session_id = $1 \
               AND session__is_active = true",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_sync_groups(&self) -> Result<Vec<SyncGroup>> {
        let rows = sqlx::query(
            "SELECT general__sync_group, server__tick_rate_ms \
             FROM auth.sync_groups \
             ORDER BY general__sync_group",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let tick_rate_ms: i32 = row.try_get("server__tick_rate_ms")?;
                Ok(SyncGroup {
                    group_name: row.try_get("general__sync_group")?,
                    tick_rate_ms: tick_rate_ms.max(1) as u64,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(db_err)
    }

    async fn load_world_config(&self) -> Result<WorldConfig> {
        let rows = sqlx::query("SELECT general__key, general__value FROM config.world_config")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        if rows.is_empty() {
            return Err(WorldError::MissingConfig("config.world_config".into()));
        }

        let mut map = serde_json::Map::new();
        for row in &rows {
            let key: String = row.try_get("general__key").map_err(db_err)?;
            let value: serde_json::Value = row.try_get("general__value").map_err(db_err)?;
            map.insert(key, value);
        }
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }

    async fn capture_tick(&self, sync_group: &str) -> Result<TickRecord> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query(
            "SELECT group__sync_group, tick__number, tick__captured_at, \
                    tick__duration_ms, tick__is_delayed, tick__entity_states, \
                    tick__metadata_states \
             FROM tick.capture_tick_state($1)",
        )
        .bind(sync_group)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        tick_from_row(&row).map_err(db_err)
    }

    async fn try_claim_action(&self, action_id: Uuid, agent_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT try_claim_action($1, $2)")
            .bind(action_id)
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn update_action_heartbeat(&self, action_id: Uuid, agent_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT update_action_heartbeat($1, $2)")
            .bind(action_id)
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn sweep_action_timeouts(&self) -> Result<SweepReport> {
        let row = sqlx::query("SELECT released, expired FROM handle_action_timeouts()")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let released: i64 = row.try_get("released").map_err(db_err)?;
        let expired: i64 = row.try_get("expired").map_err(db_err)?;
        Ok(SweepReport {
            released: released.max(0) as u64,
            expired: expired.max(0) as u64,
        })
    }

    async fn query_entities(&self, sync_group: Option<&str>) -> Result<serde_json::Value> {
        sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT COALESCE(jsonb_agg(jsonb_build_object( \
                 'entityId', general__entity_id, \
                 'name', general__entity_name, \
                 'syncGroup', group__sync_group, \
                 'data', meta__data, \
                 'updatedAt', general__updated_at)), '[]'::jsonb) \
             FROM entity.entities \
             WHERE $1::text IS NULL OR group__sync_group = $1",
        )
        .bind(sync_group)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
