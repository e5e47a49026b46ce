//! PostgreSQL mirror store
//!
//! Mirrors the semantics of the in-memory backend. Upserts carry absolute
//! values read from the chain, so replaying them is harmless; mirror-only
//! columns (first_entry_at, created_at) survive chain refreshes.

use arena_core::{ArenaStatus, PhaseKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::entities::{
    ArenaEvent, ArenaRow, GlobalStateRow, JobStatus, LifecycleJobRow, PhaseState, PhaseStatus,
    PlayerEntryRow, ProcessingStateRow, SyncCheckpoint, TokenRow, TransactionRecord,
};
use crate::error::{StoreError, StoreResult};
use crate::schema::MIRROR_SCHEMA;
use crate::store::{MirrorStats, MirrorStore};

const STUCK_DEMOTION_NOTE: &str = "stuck processing demoted by reconciliation";

/// Mirror store backed by a PostgreSQL pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the full DDL. All statements are IF NOT EXISTS.
    pub async fn initialize_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(MIRROR_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_processing_row(&self, arena_id: u64) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO processing_states (arena_id) VALUES ($1) ON CONFLICT (arena_id) DO NOTHING",
        )
        .bind(arena_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_arena_status(s: &str) -> StoreResult<ArenaStatus> {
    ArenaStatus::parse(s).ok_or_else(|| StoreError::InvalidData(format!("arena status '{s}'")))
}

fn parse_phase_kind(s: &str) -> StoreResult<PhaseKind> {
    PhaseKind::parse(s).ok_or_else(|| StoreError::InvalidData(format!("phase kind '{s}'")))
}

fn parse_phase_status(s: &str) -> StoreResult<PhaseStatus> {
    PhaseStatus::parse(s).ok_or_else(|| StoreError::InvalidData(format!("phase status '{s}'")))
}

fn parse_job_status(s: &str) -> StoreResult<JobStatus> {
    JobStatus::parse(s).ok_or_else(|| StoreError::InvalidData(format!("job status '{s}'")))
}

fn arena_from_row(row: &PgRow) -> StoreResult<ArenaRow> {
    Ok(ArenaRow {
        arena_id: row.try_get::<i64, _>("arena_id")? as u64,
        address: row.try_get("address")?,
        status: parse_arena_status(&row.try_get::<String, _>("status")?)?,
        player_count: row.try_get::<i16, _>("player_count")? as u8,
        winning_asset: row
            .try_get::<Option<i16>, _>("winning_asset")?
            .map(|v| v as u8),
        canceled: row.try_get("canceled")?,
        treasury_claimed: row.try_get("treasury_claimed")?,
        start_ts: row.try_get("start_ts")?,
        end_ts: row.try_get("end_ts")?,
        total_pool: row.try_get::<i64, _>("total_pool")? as u64,
        entry_fee: row.try_get::<i64, _>("entry_fee")? as u64,
        max_players: row.try_get::<i16, _>("max_players")? as u8,
        vault: row.try_get("vault")?,
        first_entry_at: row.try_get("first_entry_at")?,
        observed_slot: row.try_get::<i64, _>("observed_slot")? as u64,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<PlayerEntryRow> {
    Ok(PlayerEntryRow {
        arena_id: row.try_get::<i64, _>("arena_id")? as u64,
        player: row.try_get("player")?,
        address: row.try_get("address")?,
        asset_index: row.try_get::<i16, _>("asset_index")? as u8,
        player_index: row.try_get::<i16, _>("player_index")? as u8,
        amount: row.try_get::<i64, _>("amount")? as u64,
        entry_ts: row.try_get("entry_ts")?,
        start_price: row.try_get::<Option<i64>, _>("start_price")?.map(|v| v as u64),
        end_price: row.try_get::<Option<i64>, _>("end_price")?.map(|v| v as u64),
        price_movement: row.try_get("price_movement")?,
        is_winner: row.try_get("is_winner")?,
        claimed: row.try_get("claimed")?,
        observed_slot: row.try_get::<i64, _>("observed_slot")? as u64,
        updated_at: row.try_get("updated_at")?,
    })
}

fn global_from_row(row: &PgRow) -> StoreResult<GlobalStateRow> {
    let volume: String = row.try_get("total_volume")?;
    Ok(GlobalStateRow {
        address: row.try_get("address")?,
        authority: row.try_get("authority")?,
        treasury: row.try_get("treasury")?,
        arena_counter: row.try_get::<i64, _>("arena_counter")? as u64,
        entry_fee: row.try_get::<i64, _>("entry_fee")? as u64,
        total_volume: volume
            .parse::<u128>()
            .map_err(|_| StoreError::InvalidData(format!("total volume '{volume}'")))?,
        max_players: row.try_get::<i16, _>("max_players")? as u8,
        paused: row.try_get("paused")?,
        observed_slot: row.try_get::<i64, _>("observed_slot")? as u64,
        updated_at: row.try_get("updated_at")?,
    })
}

fn token_from_row(row: &PgRow) -> StoreResult<TokenRow> {
    Ok(TokenRow {
        address: row.try_get("address")?,
        mint: row.try_get("mint")?,
        symbol: row.try_get("symbol")?,
        asset_index: row.try_get::<i16, _>("asset_index")? as u8,
        decimals: row.try_get::<i16, _>("decimals")? as u8,
        active: row.try_get("active")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> StoreResult<ArenaEvent> {
    Ok(ArenaEvent {
        signature: row.try_get("signature")?,
        ix_index: row.try_get::<i32, _>("ix_index")? as u32,
        arena_id: row.try_get::<Option<i64>, _>("arena_id")?.map(|v| v as u64),
        kind: row.try_get("kind")?,
        data: row.try_get("data")?,
        slot: row.try_get::<i64, _>("slot")? as u64,
        created_at: row.try_get("created_at")?,
    })
}

fn phase_from_row(row: &PgRow, prefix: &str) -> StoreResult<PhaseState> {
    let col = |name: &str| format!("{prefix}_{name}");
    Ok(PhaseState {
        status: parse_phase_status(&row.try_get::<String, _>(col("status").as_str())?)?,
        attempts: row.try_get::<i32, _>(col("attempts").as_str())? as u32,
        last_error: row.try_get(col("last_error").as_str())?,
        scheduled_at: row.try_get(col("scheduled_at").as_str())?,
        processing_since: row.try_get(col("processing_since").as_str())?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn processing_from_row(row: &PgRow) -> StoreResult<ProcessingStateRow> {
    Ok(ProcessingStateRow {
        arena_id: row.try_get::<i64, _>("arena_id")? as u64,
        start: phase_from_row(row, "start")?,
        end: phase_from_row(row, "end")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn job_from_row(row: &PgRow) -> StoreResult<LifecycleJobRow> {
    Ok(LifecycleJobRow {
        id: row.try_get("id")?,
        arena_id: row.try_get::<i64, _>("arena_id")? as u64,
        phase: parse_phase_kind(&row.try_get::<String, _>("phase")?)?,
        status: parse_job_status(&row.try_get::<String, _>("status")?)?,
        attempts: row.try_get::<i32, _>("attempts")? as u32,
        max_attempts: row.try_get::<i32, _>("max_attempts")? as u32,
        next_run_at: row.try_get("next_run_at")?,
        last_error: row.try_get("last_error")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MirrorStore for PostgresStore {
    // ==================== arenas ====================

    async fn upsert_arena(&self, arena: &ArenaRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO arenas
                (arena_id, address, status, player_count, winning_asset, canceled,
                 treasury_claimed, start_ts, end_ts, total_pool, entry_fee, max_players,
                 vault, first_entry_at, observed_slot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (arena_id) DO UPDATE SET
                address = EXCLUDED.address,
                status = EXCLUDED.status,
                player_count = EXCLUDED.player_count,
                winning_asset = EXCLUDED.winning_asset,
                canceled = EXCLUDED.canceled,
                treasury_claimed = EXCLUDED.treasury_claimed,
                start_ts = EXCLUDED.start_ts,
                end_ts = EXCLUDED.end_ts,
                total_pool = EXCLUDED.total_pool,
                entry_fee = EXCLUDED.entry_fee,
                max_players = EXCLUDED.max_players,
                vault = COALESCE(EXCLUDED.vault, arenas.vault),
                first_entry_at = COALESCE(arenas.first_entry_at, EXCLUDED.first_entry_at),
                observed_slot = EXCLUDED.observed_slot,
                updated_at = NOW()
            "#,
        )
        .bind(arena.arena_id as i64)
        .bind(&arena.address)
        .bind(arena.status.as_str())
        .bind(arena.player_count as i16)
        .bind(arena.winning_asset.map(|v| v as i16))
        .bind(arena.canceled)
        .bind(arena.treasury_claimed)
        .bind(arena.start_ts)
        .bind(arena.end_ts)
        .bind(arena.total_pool as i64)
        .bind(arena.entry_fee as i64)
        .bind(arena.max_players as i16)
        .bind(&arena.vault)
        .bind(arena.first_entry_at)
        .bind(arena.observed_slot as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_arena(&self, arena_id: u64) -> StoreResult<Option<ArenaRow>> {
        let row = sqlx::query("SELECT * FROM arenas WHERE arena_id = $1")
            .bind(arena_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| arena_from_row(&r)).transpose()
    }

    async fn get_arena_by_address(&self, address: &str) -> StoreResult<Option<ArenaRow>> {
        let row = sqlx::query("SELECT * FROM arenas WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| arena_from_row(&r)).transpose()
    }

    async fn list_arenas_by_status(&self, status: ArenaStatus) -> StoreResult<Vec<ArenaRow>> {
        let rows = sqlx::query("SELECT * FROM arenas WHERE status = $1 ORDER BY arena_id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(arena_from_row).collect()
    }

    async fn list_non_terminal_arenas(&self) -> StoreResult<Vec<ArenaRow>> {
        let rows = sqlx::query(
            "SELECT * FROM arenas WHERE status IN ('waiting', 'active') ORDER BY arena_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(arena_from_row).collect()
    }

    async fn note_first_entry(&self, arena_id: u64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE arenas
            SET first_entry_at = LEAST(COALESCE(first_entry_at, $2), $2), updated_at = NOW()
            WHERE arena_id = $1
            "#,
        )
        .bind(arena_id as i64)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_arena_status(&self, arena_id: u64, status: ArenaStatus) -> StoreResult<()> {
        sqlx::query("UPDATE arenas SET status = $2, updated_at = NOW() WHERE arena_id = $1")
            .bind(arena_id as i64)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== player entries ====================

    async fn upsert_player_entry(&self, entry: &PlayerEntryRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO player_entries
                (arena_id, player, address, asset_index, player_index, amount, entry_ts,
                 start_price, end_price, price_movement, is_winner, claimed, observed_slot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (arena_id, player) DO UPDATE SET
                address = EXCLUDED.address,
                asset_index = EXCLUDED.asset_index,
                player_index = EXCLUDED.player_index,
                amount = EXCLUDED.amount,
                entry_ts = EXCLUDED.entry_ts,
                start_price = COALESCE(EXCLUDED.start_price, player_entries.start_price),
                end_price = COALESCE(EXCLUDED.end_price, player_entries.end_price),
                price_movement = COALESCE(EXCLUDED.price_movement, player_entries.price_movement),
                is_winner = EXCLUDED.is_winner,
                claimed = EXCLUDED.claimed,
                observed_slot = EXCLUDED.observed_slot,
                updated_at = NOW()
            "#,
        )
        .bind(entry.arena_id as i64)
        .bind(&entry.player)
        .bind(&entry.address)
        .bind(entry.asset_index as i16)
        .bind(entry.player_index as i16)
        .bind(entry.amount as i64)
        .bind(entry.entry_ts)
        .bind(entry.start_price.map(|v| v as i64))
        .bind(entry.end_price.map(|v| v as i64))
        .bind(entry.price_movement)
        .bind(entry.is_winner)
        .bind(entry.claimed)
        .bind(entry.observed_slot as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_player_entry(
        &self,
        arena_id: u64,
        player: &str,
    ) -> StoreResult<Option<PlayerEntryRow>> {
        let row = sqlx::query("SELECT * FROM player_entries WHERE arena_id = $1 AND player = $2")
            .bind(arena_id as i64)
            .bind(player)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    async fn list_entries_for_arena(&self, arena_id: u64) -> StoreResult<Vec<PlayerEntryRow>> {
        let rows =
            sqlx::query("SELECT * FROM player_entries WHERE arena_id = $1 ORDER BY player_index")
                .bind(arena_id as i64)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn set_entry_price(
        &self,
        arena_id: u64,
        player_index: u8,
        phase: PhaseKind,
        price: u64,
    ) -> StoreResult<()> {
        let query = match phase {
            PhaseKind::Start => {
                r#"
                UPDATE player_entries
                SET start_price = $3,
                    price_movement = CASE
                        WHEN end_price IS NOT NULL THEN end_price - $3
                        ELSE price_movement
                    END,
                    updated_at = NOW()
                WHERE arena_id = $1 AND player_index = $2
                "#
            }
            PhaseKind::End => {
                r#"
                UPDATE player_entries
                SET end_price = $3,
                    price_movement = CASE
                        WHEN start_price IS NOT NULL THEN $3 - start_price
                        ELSE price_movement
                    END,
                    updated_at = NOW()
                WHERE arena_id = $1 AND player_index = $2
                "#
            }
        };
        sqlx::query(query)
            .bind(arena_id as i64)
            .bind(player_index as i16)
            .bind(price as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_entry_claimed(&self, arena_id: u64, player: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE player_entries SET claimed = TRUE, updated_at = NOW()
            WHERE arena_id = $1 AND player = $2
            "#,
        )
        .bind(arena_id as i64)
        .bind(player)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== global state / tokens ====================

    async fn upsert_global_state(&self, row: &GlobalStateRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO global_state
                (address, authority, treasury, arena_counter, entry_fee, total_volume,
                 max_players, paused, observed_slot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (address) DO UPDATE SET
                authority = EXCLUDED.authority,
                treasury = EXCLUDED.treasury,
                arena_counter = EXCLUDED.arena_counter,
                entry_fee = EXCLUDED.entry_fee,
                total_volume = EXCLUDED.total_volume,
                max_players = EXCLUDED.max_players,
                paused = EXCLUDED.paused,
                observed_slot = EXCLUDED.observed_slot,
                updated_at = NOW()
            "#,
        )
        .bind(&row.address)
        .bind(&row.authority)
        .bind(&row.treasury)
        .bind(row.arena_counter as i64)
        .bind(row.entry_fee as i64)
        .bind(row.total_volume.to_string())
        .bind(row.max_players as i16)
        .bind(row.paused)
        .bind(row.observed_slot as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_global_state(&self) -> StoreResult<Option<GlobalStateRow>> {
        let row = sqlx::query("SELECT * FROM global_state LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| global_from_row(&r)).transpose()
    }

    async fn upsert_token(&self, row: &TokenRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO whitelisted_tokens (asset_index, address, mint, symbol, decimals, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (asset_index) DO UPDATE SET
                address = EXCLUDED.address,
                mint = EXCLUDED.mint,
                symbol = EXCLUDED.symbol,
                decimals = EXCLUDED.decimals,
                active = EXCLUDED.active,
                updated_at = NOW()
            "#,
        )
        .bind(row.asset_index as i16)
        .bind(&row.address)
        .bind(&row.mint)
        .bind(&row.symbol)
        .bind(row.decimals as i16)
        .bind(row.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_token_by_index(&self, asset_index: u8) -> StoreResult<Option<TokenRow>> {
        let row = sqlx::query("SELECT * FROM whitelisted_tokens WHERE asset_index = $1")
            .bind(asset_index as i16)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| token_from_row(&r)).transpose()
    }

    async fn list_active_tokens(&self) -> StoreResult<Vec<TokenRow>> {
        let rows =
            sqlx::query("SELECT * FROM whitelisted_tokens WHERE active ORDER BY asset_index")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(token_from_row).collect()
    }

    // ==================== transactions / events ====================

    async fn record_transaction(&self, record: &TransactionRecord) -> StoreResult<bool> {
        let actions = serde_json::to_string(&record.actions)?;
        let result = sqlx::query(
            r#"
            INSERT INTO indexed_transactions (signature, slot, block_time, actions)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (signature) DO NOTHING
            "#,
        )
        .bind(&record.signature)
        .bind(record.slot as i64)
        .bind(record.block_time)
        .bind(actions)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_transaction_applied(&self, signature: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM indexed_transactions WHERE signature = $1")
            .bind(signature)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn append_event(&self, event: &ArenaEvent) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO arena_events (signature, ix_index, arena_id, kind, data, slot)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (signature, ix_index) DO NOTHING
            "#,
        )
        .bind(&event.signature)
        .bind(event.ix_index as i32)
        .bind(event.arena_id.map(|v| v as i64))
        .bind(&event.kind)
        .bind(&event.data)
        .bind(event.slot as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_events_for_arena(
        &self,
        arena_id: u64,
        limit: usize,
    ) -> StoreResult<Vec<ArenaEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM arena_events WHERE arena_id = $1
            ORDER BY slot, created_at LIMIT $2
            "#,
        )
        .bind(arena_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    // ==================== checkpoint ====================

    async fn checkpoint(&self) -> StoreResult<Option<SyncCheckpoint>> {
        let row = sqlx::query("SELECT signature, slot, updated_at FROM sync_checkpoint WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| SyncCheckpoint {
            signature: r.get("signature"),
            slot: r.get::<i64, _>("slot") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save_checkpoint(&self, signature: &str, slot: u64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoint (id, signature, slot) VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                signature = EXCLUDED.signature,
                slot = EXCLUDED.slot,
                updated_at = NOW()
            WHERE sync_checkpoint.slot <= EXCLUDED.slot
            "#,
        )
        .bind(signature)
        .bind(slot as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== processing states ====================

    async fn processing_state(&self, arena_id: u64) -> StoreResult<Option<ProcessingStateRow>> {
        let row = sqlx::query("SELECT * FROM processing_states WHERE arena_id = $1")
            .bind(arena_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| processing_from_row(&r)).transpose()
    }

    async fn list_processing_states(&self) -> StoreResult<Vec<ProcessingStateRow>> {
        let rows = sqlx::query("SELECT * FROM processing_states ORDER BY arena_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(processing_from_row).collect()
    }

    async fn claim_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.ensure_processing_row(arena_id).await?;
        // Single-statement CAS; concurrent claimers race on the row lock and
        // the loser sees zero rows affected.
        let query = match phase {
            PhaseKind::Start => {
                r#"
                UPDATE processing_states
                SET start_status = 'processing',
                    start_attempts = start_attempts + 1,
                    start_processing_since = $2,
                    start_scheduled_at = NULL,
                    updated_at = $2
                WHERE arena_id = $1
                  AND (start_status IN ('pending', 'failed')
                       OR (start_status = 'scheduled'
                           AND (start_scheduled_at IS NULL OR start_scheduled_at <= $2)))
                "#
            }
            PhaseKind::End => {
                r#"
                UPDATE processing_states
                SET end_status = 'processing',
                    end_attempts = end_attempts + 1,
                    end_processing_since = $2,
                    end_scheduled_at = NULL,
                    updated_at = $2
                WHERE arena_id = $1
                  AND (end_status IN ('pending', 'failed')
                       OR (end_status = 'scheduled'
                           AND (end_scheduled_at IS NULL OR end_scheduled_at <= $2)))
                "#
            }
        };
        let result = sqlx::query(query)
            .bind(arena_id as i64)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_phase(&self, arena_id: u64, phase: PhaseKind) -> StoreResult<()> {
        self.ensure_processing_row(arena_id).await?;
        let query = match phase {
            PhaseKind::Start => {
                r#"
                UPDATE processing_states
                SET start_status = 'completed', start_processing_since = NULL,
                    start_scheduled_at = NULL, start_last_error = NULL, updated_at = NOW()
                WHERE arena_id = $1
                "#
            }
            PhaseKind::End => {
                r#"
                UPDATE processing_states
                SET end_status = 'completed', end_processing_since = NULL,
                    end_scheduled_at = NULL, end_last_error = NULL, updated_at = NOW()
                WHERE arena_id = $1
                "#
            }
        };
        sqlx::query(query)
            .bind(arena_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_phase(&self, arena_id: u64, phase: PhaseKind, error: &str) -> StoreResult<()> {
        self.ensure_processing_row(arena_id).await?;
        let query = match phase {
            PhaseKind::Start => {
                r#"
                UPDATE processing_states
                SET start_status = 'failed', start_processing_since = NULL,
                    start_last_error = $2, updated_at = NOW()
                WHERE arena_id = $1
                "#
            }
            PhaseKind::End => {
                r#"
                UPDATE processing_states
                SET end_status = 'failed', end_processing_since = NULL,
                    end_last_error = $2, updated_at = NOW()
                WHERE arena_id = $1
                "#
            }
        };
        sqlx::query(query)
            .bind(arena_id as i64)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn schedule_phase(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.ensure_processing_row(arena_id).await?;
        let query = match phase {
            PhaseKind::Start => {
                r#"
                UPDATE processing_states
                SET start_status = 'scheduled', start_processing_since = NULL,
                    start_scheduled_at = $2, updated_at = NOW()
                WHERE arena_id = $1
                "#
            }
            PhaseKind::End => {
                r#"
                UPDATE processing_states
                SET end_status = 'scheduled', end_processing_since = NULL,
                    end_scheduled_at = $2, updated_at = NOW()
                WHERE arena_id = $1
                "#
            }
        };
        sqlx::query(query)
            .bind(arena_id as i64)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn demote_stuck_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<(u64, PhaseKind)>> {
        let mut demoted = Vec::new();
        let rows = sqlx::query(
            r#"
            UPDATE processing_states
            SET start_status = 'failed', start_processing_since = NULL,
                start_last_error = $2, updated_at = NOW()
            WHERE start_status = 'processing'
              AND (start_processing_since IS NULL OR start_processing_since < $1)
            RETURNING arena_id
            "#,
        )
        .bind(cutoff)
        .bind(STUCK_DEMOTION_NOTE)
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            demoted.push((row.get::<i64, _>("arena_id") as u64, PhaseKind::Start));
        }
        let rows = sqlx::query(
            r#"
            UPDATE processing_states
            SET end_status = 'failed', end_processing_since = NULL,
                end_last_error = $2, updated_at = NOW()
            WHERE end_status = 'processing'
              AND (end_processing_since IS NULL OR end_processing_since < $1)
            RETURNING arena_id
            "#,
        )
        .bind(cutoff)
        .bind(STUCK_DEMOTION_NOTE)
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            demoted.push((row.get::<i64, _>("arena_id") as u64, PhaseKind::End));
        }
        demoted.sort();
        Ok(demoted)
    }

    // ==================== lifecycle jobs ====================

    async fn enqueue_job(
        &self,
        arena_id: u64,
        phase: PhaseKind,
        run_at: DateTime<Utc>,
        payload: &str,
    ) -> StoreResult<LifecycleJobRow> {
        let existing = sqlx::query(
            r#"
            SELECT * FROM lifecycle_jobs
            WHERE arena_id = $1 AND phase = $2 AND status IN ('queued', 'running')
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(arena_id as i64)
        .bind(phase.as_str())
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = existing {
            return job_from_row(&row);
        }

        let job = LifecycleJobRow::new(arena_id, phase, run_at, payload.to_string());
        sqlx::query(
            r#"
            INSERT INTO lifecycle_jobs
                (id, arena_id, phase, status, attempts, max_attempts, next_run_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&job.id)
        .bind(job.arena_id as i64)
        .bind(job.phase.as_str())
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.next_run_at)
        .bind(&job.payload)
        .execute(&self.pool)
        .await?;
        Ok(job)
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LifecycleJobRow>> {
        let rows = sqlx::query(
            r#"
            UPDATE lifecycle_jobs
            SET status = 'running', attempts = attempts + 1, updated_at = $1
            WHERE id IN (
                SELECT id FROM lifecycle_jobs
                WHERE (status = 'queued' AND next_run_at <= $1)
                   OR (status = 'running' AND updated_at < $2)
                ORDER BY next_run_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(stale_cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn complete_job(&self, job_id: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE lifecycle_jobs
            SET status = 'completed', last_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        next_run: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        match next_run {
            Some(at) => {
                sqlx::query(
                    r#"
                    UPDATE lifecycle_jobs
                    SET status = 'queued', last_error = $2, next_run_at = $3, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .bind(error)
                .bind(at)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE lifecycle_jobs
                    SET status = 'dead', last_error = $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .bind(error)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn delay_job(&self, job_id: &str, next_run: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE lifecycle_jobs
            SET status = 'queued', next_run_at = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(next_run)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_job(
        &self,
        arena_id: u64,
        phase: PhaseKind,
    ) -> StoreResult<Option<LifecycleJobRow>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM lifecycle_jobs WHERE arena_id = $1 AND phase = $2
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(arena_id as i64)
        .bind(phase.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn prune_jobs(&self, keep: usize) -> StoreResult<u64> {
        let mut removed = 0u64;
        for status in ["completed", "dead"] {
            let result = sqlx::query(
                r#"
                DELETE FROM lifecycle_jobs
                WHERE status = $1 AND id NOT IN (
                    SELECT id FROM lifecycle_jobs WHERE status = $1
                    ORDER BY updated_at DESC LIMIT $2
                )
                "#,
            )
            .bind(status)
            .bind(keep as i64)
            .execute(&self.pool)
            .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    // ==================== stats ====================

    async fn stats(&self) -> StoreResult<MirrorStats> {
        let mut stats = MirrorStats::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM arenas GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let n = row.get::<i64, _>("n") as u64;
            stats.arenas_total += n;
            match parse_arena_status(&row.get::<String, _>("status"))? {
                ArenaStatus::Waiting => stats.arenas_waiting = n,
                ArenaStatus::Active => stats.arenas_active = n,
                ArenaStatus::Ended => stats.arenas_ended = n,
                ArenaStatus::Canceled => stats.arenas_canceled = n,
                ArenaStatus::Uninitialized => {}
            }
        }

        let row = sqlx::query("SELECT COUNT(*) AS n FROM player_entries")
            .fetch_one(&self.pool)
            .await?;
        stats.entries_total = row.get::<i64, _>("n") as u64;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM indexed_transactions")
            .fetch_one(&self.pool)
            .await?;
        stats.transactions_total = row.get::<i64, _>("n") as u64;

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM lifecycle_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let n = row.get::<i64, _>("n") as u64;
            match parse_job_status(&row.get::<String, _>("status"))? {
                JobStatus::Queued => stats.jobs_queued = n,
                JobStatus::Running => stats.jobs_running = n,
                JobStatus::Dead => stats.jobs_dead = n,
                JobStatus::Completed => {}
            }
        }

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE start_status = 'processing')
                  + COUNT(*) FILTER (WHERE end_status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE start_status = 'failed')
                  + COUNT(*) FILTER (WHERE end_status = 'failed') AS failed
            FROM processing_states
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        stats.phases_processing = row.get::<i64, _>("processing") as u64;
        stats.phases_failed = row.get::<i64, _>("failed") as u64;

        if let Some(cp) = self.checkpoint().await? {
            stats.checkpoint_signature = Some(cp.signature);
            stats.checkpoint_slot = Some(cp.slot);
        }

        Ok(stats)
    }
}
