//! Arena, global state and token rows

use arena_core::{ArenaRecord, ArenaStatus, GlobalStateRecord, WhitelistedTokenRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ts_opt;

/// Mirror row for one arena account.
///
/// Chain fields are overwritten wholesale on every observation ("latest
/// wins"); `first_entry_at` and `created_at` are mirror-only and survive
/// upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaRow {
    pub arena_id: u64,
    /// Base58 address of the on-chain account.
    pub address: String,
    pub status: ArenaStatus,
    pub player_count: u8,
    pub winning_asset: Option<u8>,
    pub canceled: bool,
    pub treasury_claimed: bool,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    pub total_pool: u64,
    pub entry_fee: u64,
    pub max_players: u8,
    pub vault: Option<String>,
    /// When the mirror first saw an entrant; drives the start countdown.
    pub first_entry_at: Option<DateTime<Utc>>,
    /// Slot of the most recent account observation.
    pub observed_slot: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArenaRow {
    /// Fresh row from a decoded account observation.
    pub fn from_record(record: &ArenaRecord, address: &str, slot: u64) -> Self {
        let now = Utc::now();
        Self {
            arena_id: record.arena_id,
            address: address.to_string(),
            status: record.status,
            player_count: record.player_count,
            winning_asset: record.winning_asset,
            canceled: record.canceled,
            treasury_claimed: record.treasury_claimed,
            start_ts: ts_opt(record.start_ts),
            end_ts: ts_opt(record.end_ts),
            total_pool: record.total_pool,
            entry_fee: record.entry_fee,
            max_players: record.max_players,
            vault: Some(record.vault.to_base58()),
            first_entry_at: None,
            observed_slot: slot,
            created_at: now,
            updated_at: now,
        }
    }

    /// Skeleton row from a create instruction, before the account itself
    /// has been observed.
    pub fn shell(arena_id: u64, address: &str, entry_fee: u64, max_players: u8) -> Self {
        let now = Utc::now();
        Self {
            arena_id,
            address: address.to_string(),
            status: ArenaStatus::Waiting,
            player_count: 0,
            winning_asset: None,
            canceled: false,
            treasury_claimed: false,
            start_ts: None,
            end_ts: None,
            total_pool: 0,
            entry_fee,
            max_players,
            vault: None,
            first_entry_at: None,
            observed_slot: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy chain-derived fields from a newer observation, keeping
    /// mirror-only fields.
    pub fn absorb(&mut self, other: &ArenaRow) {
        self.address = other.address.clone();
        self.status = other.status;
        self.player_count = other.player_count;
        self.winning_asset = other.winning_asset;
        self.canceled = other.canceled;
        self.treasury_claimed = other.treasury_claimed;
        self.start_ts = other.start_ts;
        self.end_ts = other.end_ts;
        self.total_pool = other.total_pool;
        self.entry_fee = other.entry_fee;
        self.max_players = other.max_players;
        if other.vault.is_some() {
            self.vault = other.vault.clone();
        }
        self.observed_slot = other.observed_slot;
        self.updated_at = Utc::now();
    }
}

/// Singleton mirror of the program's global configuration account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStateRow {
    pub address: String,
    pub authority: String,
    pub treasury: String,
    pub arena_counter: u64,
    pub entry_fee: u64,
    /// 128-bit cumulative volume, reassembled from the wire halves.
    pub total_volume: u128,
    pub max_players: u8,
    pub paused: bool,
    pub observed_slot: u64,
    pub updated_at: DateTime<Utc>,
}

impl GlobalStateRow {
    pub fn from_record(record: &GlobalStateRecord, address: &str, slot: u64) -> Self {
        Self {
            address: address.to_string(),
            authority: record.authority.to_base58(),
            treasury: record.treasury.to_base58(),
            arena_counter: record.arena_counter,
            entry_fee: record.entry_fee,
            total_volume: record.total_volume,
            max_players: record.max_players,
            paused: record.paused,
            observed_slot: slot,
            updated_at: Utc::now(),
        }
    }
}

/// One whitelisted token, the oracle symbol source for an asset index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRow {
    /// Base58 address of the whitelist account.
    pub address: String,
    pub mint: String,
    pub symbol: String,
    pub asset_index: u8,
    pub decimals: u8,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl TokenRow {
    pub fn from_record(record: &WhitelistedTokenRecord, address: &str) -> Self {
        Self {
            address: address.to_string(),
            mint: record.mint.to_base58(),
            symbol: record.symbol.clone(),
            asset_index: record.asset_index,
            decimals: record.decimals,
            active: record.active,
            updated_at: Utc::now(),
        }
    }
}
