//! PostgreSQL schema definitions for the arena mirror

/// Complete mirror schema. Idempotent, safe to run at every startup.
pub const MIRROR_SCHEMA: &str = r#"
-- ============================================
-- Global State (singleton program config)
-- ============================================
CREATE TABLE IF NOT EXISTS global_state (
    address         TEXT PRIMARY KEY,
    authority       TEXT NOT NULL,
    treasury        TEXT NOT NULL,
    arena_counter   BIGINT NOT NULL DEFAULT 0,
    entry_fee       BIGINT NOT NULL DEFAULT 0,
    total_volume    TEXT NOT NULL DEFAULT '0',
    max_players     SMALLINT NOT NULL DEFAULT 0,
    paused          BOOLEAN NOT NULL DEFAULT FALSE,
    observed_slot   BIGINT NOT NULL DEFAULT 0,
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- ============================================
-- Arenas
-- ============================================
CREATE TABLE IF NOT EXISTS arenas (
    arena_id          BIGINT PRIMARY KEY,
    address           TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'waiting',
    player_count      SMALLINT NOT NULL DEFAULT 0,
    winning_asset     SMALLINT,
    canceled          BOOLEAN NOT NULL DEFAULT FALSE,
    treasury_claimed  BOOLEAN NOT NULL DEFAULT FALSE,
    start_ts          TIMESTAMPTZ,
    end_ts            TIMESTAMPTZ,
    total_pool        BIGINT NOT NULL DEFAULT 0,
    entry_fee         BIGINT NOT NULL DEFAULT 0,
    max_players       SMALLINT NOT NULL DEFAULT 0,
    vault             TEXT,
    first_entry_at    TIMESTAMPTZ,
    observed_slot     BIGINT NOT NULL DEFAULT 0,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_arenas_address ON arenas (address);
CREATE INDEX IF NOT EXISTS idx_arenas_status ON arenas (status);

-- ============================================
-- Player Entries
-- ============================================
CREATE TABLE IF NOT EXISTS player_entries (
    arena_id        BIGINT NOT NULL,
    player          TEXT NOT NULL,
    address         TEXT NOT NULL,
    asset_index     SMALLINT NOT NULL DEFAULT 0,
    player_index    SMALLINT NOT NULL DEFAULT 0,
    amount          BIGINT NOT NULL DEFAULT 0,
    entry_ts        TIMESTAMPTZ,
    start_price     BIGINT,
    end_price       BIGINT,
    price_movement  BIGINT,
    is_winner       BOOLEAN NOT NULL DEFAULT FALSE,
    claimed         BOOLEAN NOT NULL DEFAULT FALSE,
    observed_slot   BIGINT NOT NULL DEFAULT 0,
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (arena_id, player)
);
CREATE INDEX IF NOT EXISTS idx_entries_arena ON player_entries (arena_id, player_index);

-- ============================================
-- Whitelisted Tokens
-- ============================================
CREATE TABLE IF NOT EXISTS whitelisted_tokens (
    asset_index   SMALLINT PRIMARY KEY,
    address       TEXT NOT NULL,
    mint          TEXT NOT NULL,
    symbol        TEXT NOT NULL,
    decimals      SMALLINT NOT NULL DEFAULT 0,
    active        BOOLEAN NOT NULL DEFAULT TRUE,
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- ============================================
-- Indexed Transactions (replay guard)
-- ============================================
CREATE TABLE IF NOT EXISTS indexed_transactions (
    signature     TEXT PRIMARY KEY,
    slot          BIGINT NOT NULL,
    block_time    TIMESTAMPTZ,
    actions       TEXT NOT NULL DEFAULT '[]',
    processed_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_transactions_slot ON indexed_transactions (slot);

-- ============================================
-- Arena Events (instruction audit trail)
-- ============================================
CREATE TABLE IF NOT EXISTS arena_events (
    signature   TEXT NOT NULL,
    ix_index    INTEGER NOT NULL,
    arena_id    BIGINT,
    kind        TEXT NOT NULL,
    data        TEXT NOT NULL DEFAULT '{}',
    slot        BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (signature, ix_index)
);
CREATE INDEX IF NOT EXISTS idx_events_arena ON arena_events (arena_id, slot);

-- ============================================
-- Sync Checkpoint (single row)
-- ============================================
CREATE TABLE IF NOT EXISTS sync_checkpoint (
    id          SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
    signature   TEXT NOT NULL,
    slot        BIGINT NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- ============================================
-- Processing States (per-arena phase guard)
-- ============================================
CREATE TABLE IF NOT EXISTS processing_states (
    arena_id               BIGINT PRIMARY KEY,
    start_status           TEXT NOT NULL DEFAULT 'pending',
    start_attempts         INTEGER NOT NULL DEFAULT 0,
    start_last_error       TEXT,
    start_scheduled_at     TIMESTAMPTZ,
    start_processing_since TIMESTAMPTZ,
    end_status             TEXT NOT NULL DEFAULT 'pending',
    end_attempts           INTEGER NOT NULL DEFAULT 0,
    end_last_error         TEXT,
    end_scheduled_at       TIMESTAMPTZ,
    end_processing_since   TIMESTAMPTZ,
    updated_at             TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- ============================================
-- Lifecycle Jobs (durable retry queue)
-- ============================================
CREATE TABLE IF NOT EXISTS lifecycle_jobs (
    id            TEXT PRIMARY KEY,
    arena_id      BIGINT NOT NULL,
    phase         TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'queued',
    attempts      INTEGER NOT NULL DEFAULT 0,
    max_attempts  INTEGER NOT NULL DEFAULT 5,
    next_run_at   TIMESTAMPTZ NOT NULL,
    last_error    TEXT,
    payload       TEXT NOT NULL DEFAULT '{}',
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_jobs_due ON lifecycle_jobs (status, next_run_at);
CREATE INDEX IF NOT EXISTS idx_jobs_arena ON lifecycle_jobs (arena_id, phase, created_at);
"#;
