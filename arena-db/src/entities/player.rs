//! Player entry rows

use arena_core::PlayerEntryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ts_opt;

/// Mirror row for one player's entry, keyed by (arena_id, player).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntryRow {
    pub arena_id: u64,
    /// Base58 player wallet address.
    pub player: String,
    /// Base58 address of the entry account itself.
    pub address: String,
    pub asset_index: u8,
    pub player_index: u8,
    pub amount: u64,
    pub entry_ts: Option<DateTime<Utc>>,
    /// None until the start price lands on chain (0 on the wire).
    pub start_price: Option<u64>,
    pub end_price: Option<u64>,
    pub price_movement: Option<i64>,
    pub is_winner: bool,
    pub claimed: bool,
    pub observed_slot: u64,
    pub updated_at: DateTime<Utc>,
}

impl PlayerEntryRow {
    /// End-minus-start delta, clamped to the range the BIGINT mirror
    /// column can hold. Scaled prices sit far below the bound; a feed
    /// glitch near u64::MAX must not wrap the sign.
    pub fn price_delta(start: u64, end: u64) -> i64 {
        (end as i128 - start as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_record(
        record: &PlayerEntryRecord,
        arena_id: u64,
        address: &str,
        slot: u64,
    ) -> Self {
        Self {
            arena_id,
            player: record.player.to_base58(),
            address: address.to_string(),
            asset_index: record.asset_index,
            player_index: record.player_index,
            amount: record.amount,
            entry_ts: ts_opt(record.entry_ts),
            start_price: (record.start_price > 0).then_some(record.start_price),
            end_price: (record.end_price > 0).then_some(record.end_price),
            price_movement: (record.start_price > 0 && record.end_price > 0)
                .then_some(record.price_movement),
            is_winner: record.is_winner,
            claimed: record.claimed,
            observed_slot: slot,
            updated_at: Utc::now(),
        }
    }

    /// Skeleton from a join instruction, before the entry account has been
    /// observed. The player index is assigned by the program; until the
    /// account is read it is a best-effort placeholder.
    pub fn shell(
        arena_id: u64,
        player: &str,
        address: &str,
        asset_index: u8,
        player_index: u8,
        entry_ts: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            arena_id,
            player: player.to_string(),
            address: address.to_string(),
            asset_index,
            player_index,
            amount: 0,
            entry_ts,
            start_price: None,
            end_price: None,
            price_movement: None,
            is_winner: false,
            claimed: false,
            observed_slot: 0,
            updated_at: Utc::now(),
        }
    }
}
