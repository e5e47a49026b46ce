//! Binary account decoder for the arena program
//!
//! Every program account starts with an 8-byte discriminator derived from
//! the record name (`sha256("account:<Name>")[0..8]`), followed by
//! fixed-width little-endian fields at deterministic offsets. Decoding is
//! pure: a buffer either yields a complete record or an error, never a
//! partial parse. Unrecognized discriminators are rejected, not guessed.
//!
//! Layout summary (sizes in bytes, after the 8-byte tag):
//!
//! | record           | fields                                                      |
//! |------------------|-------------------------------------------------------------|
//! | GlobalState      | authority 32, treasury 32, arena_counter 8, entry_fee 8,    |
//! |                  | total_volume 16 (low u64 then high u64), max_players 1,     |
//! |                  | paused 1, bump 1                                            |
//! | Arena            | arena_id 8, status 1, player_count 1, winning_asset 1,      |
//! |                  | canceled 1, treasury_claimed 1, bump 1, start_ts 8,         |
//! |                  | end_ts 8, total_pool 8, entry_fee 8, max_players 1, vault 32|
//! | PlayerEntry      | arena 32, player 32, asset_index 1, player_index 1,         |
//! |                  | amount 8, entry_ts 8, start_price 8, end_price 8,           |
//! |                  | price_movement 8, is_winner 1, claimed 1, bump 1            |
//! | WhitelistedToken | mint 32, symbol 12, asset_index 1, decimals 1, active 1,    |
//! |                  | bump 1                                                      |

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::types::{AccountKey, ArenaStatus, WINNING_ASSET_UNSET};

/// Length of the discriminator prefix.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Fixed length of the zero-padded token symbol field.
pub const SYMBOL_LEN: usize = 12;

/// Derive the 8-byte account discriminator for a record name.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("account:{name}").as_bytes());
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&digest[..8]);
    tag
}

/// The account record types the program owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    GlobalState,
    Arena,
    PlayerEntry,
    WhitelistedToken,
}

impl TypeTag {
    pub const ALL: [TypeTag; 4] = [
        TypeTag::GlobalState,
        TypeTag::Arena,
        TypeTag::PlayerEntry,
        TypeTag::WhitelistedToken,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GlobalState => "GlobalState",
            Self::Arena => "Arena",
            Self::PlayerEntry => "PlayerEntry",
            Self::WhitelistedToken => "WhitelistedToken",
        }
    }
}

/// Little-endian reader over a byte buffer with hard bounds checks.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CoreError::ShortBuffer {
            needed: usize::MAX,
            available: self.buf.len(),
        })?;
        if end > self.buf.len() {
            return Err(CoreError::ShortBuffer {
                needed: end,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> CoreResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> CoreResult<u32> {
        let bytes = self.take(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(arr))
    }

    pub(crate) fn read_u64(&mut self) -> CoreResult<u64> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    pub(crate) fn read_i64(&mut self) -> CoreResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub(crate) fn read_bool(&mut self) -> CoreResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CoreError::InvalidBool(other)),
        }
    }

    pub(crate) fn read_key(&mut self) -> CoreResult<AccountKey> {
        AccountKey::from_slice(self.take(AccountKey::LEN)?)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        self.take(len)
    }
}

/// The program's global configuration account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalStateRecord {
    pub authority: AccountKey,
    pub treasury: AccountKey,
    pub arena_counter: u64,
    pub entry_fee: u64,
    /// Cumulative volume, stored on chain as two u64 halves.
    pub total_volume: u128,
    pub max_players: u8,
    pub paused: bool,
    pub bump: u8,
}

impl GlobalStateRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(107);
        out.extend_from_slice(&account_discriminator(TypeTag::GlobalState.name()));
        out.extend_from_slice(self.authority.as_bytes());
        out.extend_from_slice(self.treasury.as_bytes());
        out.extend_from_slice(&self.arena_counter.to_le_bytes());
        out.extend_from_slice(&self.entry_fee.to_le_bytes());
        let low = (self.total_volume & u128::from(u64::MAX)) as u64;
        let high = (self.total_volume >> 64) as u64;
        out.extend_from_slice(&low.to_le_bytes());
        out.extend_from_slice(&high.to_le_bytes());
        out.push(self.max_players);
        out.push(self.paused as u8);
        out.push(self.bump);
        out
    }

    fn decode(cursor: &mut Cursor<'_>) -> CoreResult<Self> {
        let authority = cursor.read_key()?;
        let treasury = cursor.read_key()?;
        let arena_counter = cursor.read_u64()?;
        let entry_fee = cursor.read_u64()?;
        let low = cursor.read_u64()?;
        let high = cursor.read_u64()?;
        let total_volume = (u128::from(high) << 64) | u128::from(low);
        Ok(Self {
            authority,
            treasury,
            arena_counter,
            entry_fee,
            total_volume,
            max_players: cursor.read_u8()?,
            paused: cursor.read_bool()?,
            bump: cursor.read_u8()?,
        })
    }
}

/// One timed prediction round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaRecord {
    pub arena_id: u64,
    pub status: ArenaStatus,
    pub player_count: u8,
    /// `None` while the round is undecided (255 on the wire).
    pub winning_asset: Option<u8>,
    pub canceled: bool,
    pub treasury_claimed: bool,
    pub bump: u8,
    /// Unix seconds; 0 means not started.
    pub start_ts: i64,
    /// Unix seconds; 0 means no end scheduled.
    pub end_ts: i64,
    pub total_pool: u64,
    pub entry_fee: u64,
    pub max_players: u8,
    pub vault: AccountKey,
}

impl ArenaRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(87);
        out.extend_from_slice(&account_discriminator(TypeTag::Arena.name()));
        out.extend_from_slice(&self.arena_id.to_le_bytes());
        out.push(self.status.as_byte());
        out.push(self.player_count);
        out.push(self.winning_asset.unwrap_or(WINNING_ASSET_UNSET));
        out.push(self.canceled as u8);
        out.push(self.treasury_claimed as u8);
        out.push(self.bump);
        out.extend_from_slice(&self.start_ts.to_le_bytes());
        out.extend_from_slice(&self.end_ts.to_le_bytes());
        out.extend_from_slice(&self.total_pool.to_le_bytes());
        out.extend_from_slice(&self.entry_fee.to_le_bytes());
        out.push(self.max_players);
        out.extend_from_slice(self.vault.as_bytes());
        out
    }

    fn decode(cursor: &mut Cursor<'_>) -> CoreResult<Self> {
        let arena_id = cursor.read_u64()?;
        let status = ArenaStatus::from_byte(cursor.read_u8()?)?;
        let player_count = cursor.read_u8()?;
        let winning_byte = cursor.read_u8()?;
        let winning_asset = if winning_byte == WINNING_ASSET_UNSET {
            None
        } else {
            Some(winning_byte)
        };
        Ok(Self {
            arena_id,
            status,
            player_count,
            winning_asset,
            canceled: cursor.read_bool()?,
            treasury_claimed: cursor.read_bool()?,
            bump: cursor.read_u8()?,
            start_ts: cursor.read_i64()?,
            end_ts: cursor.read_i64()?,
            total_pool: cursor.read_u64()?,
            entry_fee: cursor.read_u64()?,
            max_players: cursor.read_u8()?,
            vault: cursor.read_key()?,
        })
    }
}

/// One player's entry in one arena, keyed by (arena, player).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntryRecord {
    pub arena: AccountKey,
    pub player: AccountKey,
    pub asset_index: u8,
    pub player_index: u8,
    pub amount: u64,
    pub entry_ts: i64,
    /// 0 means not recorded yet.
    pub start_price: u64,
    /// 0 means not recorded yet.
    pub end_price: u64,
    pub price_movement: i64,
    pub is_winner: bool,
    pub claimed: bool,
    pub bump: u8,
}

impl PlayerEntryRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(117);
        out.extend_from_slice(&account_discriminator(TypeTag::PlayerEntry.name()));
        out.extend_from_slice(self.arena.as_bytes());
        out.extend_from_slice(self.player.as_bytes());
        out.push(self.asset_index);
        out.push(self.player_index);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.entry_ts.to_le_bytes());
        out.extend_from_slice(&self.start_price.to_le_bytes());
        out.extend_from_slice(&self.end_price.to_le_bytes());
        out.extend_from_slice(&self.price_movement.to_le_bytes());
        out.push(self.is_winner as u8);
        out.push(self.claimed as u8);
        out.push(self.bump);
        out
    }

    fn decode(cursor: &mut Cursor<'_>) -> CoreResult<Self> {
        Ok(Self {
            arena: cursor.read_key()?,
            player: cursor.read_key()?,
            asset_index: cursor.read_u8()?,
            player_index: cursor.read_u8()?,
            amount: cursor.read_u64()?,
            entry_ts: cursor.read_i64()?,
            start_price: cursor.read_u64()?,
            end_price: cursor.read_u64()?,
            price_movement: cursor.read_i64()?,
            is_winner: cursor.read_bool()?,
            claimed: cursor.read_bool()?,
            bump: cursor.read_u8()?,
        })
    }
}

/// A token eligible as a pick, with its oracle symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistedTokenRecord {
    pub mint: AccountKey,
    /// ASCII symbol, at most 12 bytes on the wire.
    pub symbol: String,
    pub asset_index: u8,
    pub decimals: u8,
    pub active: bool,
    pub bump: u8,
}

impl WhitelistedTokenRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(56);
        out.extend_from_slice(&account_discriminator(TypeTag::WhitelistedToken.name()));
        out.extend_from_slice(self.mint.as_bytes());
        let mut symbol = [0u8; SYMBOL_LEN];
        let raw = self.symbol.as_bytes();
        let len = raw.len().min(SYMBOL_LEN);
        symbol[..len].copy_from_slice(&raw[..len]);
        out.extend_from_slice(&symbol);
        out.push(self.asset_index);
        out.push(self.decimals);
        out.push(self.active as u8);
        out.push(self.bump);
        out
    }

    fn decode(cursor: &mut Cursor<'_>) -> CoreResult<Self> {
        let mint = cursor.read_key()?;
        let raw = cursor.read_bytes(SYMBOL_LEN)?;
        let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
        let symbol = String::from_utf8(trimmed)
            .map_err(|_| CoreError::InvalidSymbol(format!("{:02x?}", raw)))?;
        Ok(Self {
            mint,
            symbol,
            asset_index: cursor.read_u8()?,
            decimals: cursor.read_u8()?,
            active: cursor.read_bool()?,
            bump: cursor.read_u8()?,
        })
    }
}

/// A decoded program account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRecord {
    GlobalState(GlobalStateRecord),
    Arena(ArenaRecord),
    PlayerEntry(PlayerEntryRecord),
    WhitelistedToken(WhitelistedTokenRecord),
}

impl AccountRecord {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::GlobalState(_) => TypeTag::GlobalState,
            Self::Arena(_) => TypeTag::Arena,
            Self::PlayerEntry(_) => TypeTag::PlayerEntry,
            Self::WhitelistedToken(_) => TypeTag::WhitelistedToken,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::GlobalState(r) => r.to_bytes(),
            Self::Arena(r) => r.to_bytes(),
            Self::PlayerEntry(r) => r.to_bytes(),
            Self::WhitelistedToken(r) => r.to_bytes(),
        }
    }
}

/// Account decoder with a precomputed discriminator registry.
///
/// Construct once and pass wherever decoding happens.
#[derive(Debug, Clone)]
pub struct AccountDecoder {
    tags: [([u8; 8], TypeTag); 4],
}

impl Default for AccountDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountDecoder {
    pub fn new() -> Self {
        let tags = [
            (
                account_discriminator(TypeTag::GlobalState.name()),
                TypeTag::GlobalState,
            ),
            (account_discriminator(TypeTag::Arena.name()), TypeTag::Arena),
            (
                account_discriminator(TypeTag::PlayerEntry.name()),
                TypeTag::PlayerEntry,
            ),
            (
                account_discriminator(TypeTag::WhitelistedToken.name()),
                TypeTag::WhitelistedToken,
            ),
        ];
        Self { tags }
    }

    /// Match the 8-byte prefix against the registry. `None` for foreign or
    /// truncated buffers.
    pub fn identify(&self, bytes: &[u8]) -> Option<TypeTag> {
        if bytes.len() < DISCRIMINATOR_LEN {
            return None;
        }
        let prefix = &bytes[..DISCRIMINATOR_LEN];
        self.tags
            .iter()
            .find(|(tag, _)| tag == prefix)
            .map(|(_, ty)| *ty)
    }

    /// Decode a buffer whose type was already identified.
    pub fn decode_as(&self, tag: TypeTag, bytes: &[u8]) -> CoreResult<AccountRecord> {
        if bytes.len() < DISCRIMINATOR_LEN {
            return Err(CoreError::ShortBuffer {
                needed: DISCRIMINATOR_LEN,
                available: bytes.len(),
            });
        }
        let mut cursor = Cursor::new(&bytes[DISCRIMINATOR_LEN..]);
        // Offsets below are relative to the end of the tag.
        let record = match tag {
            TypeTag::GlobalState => AccountRecord::GlobalState(GlobalStateRecord::decode(&mut cursor)?),
            TypeTag::Arena => AccountRecord::Arena(ArenaRecord::decode(&mut cursor)?),
            TypeTag::PlayerEntry => AccountRecord::PlayerEntry(PlayerEntryRecord::decode(&mut cursor)?),
            TypeTag::WhitelistedToken => {
                AccountRecord::WhitelistedToken(WhitelistedTokenRecord::decode(&mut cursor)?)
            }
        };
        Ok(record)
    }

    /// Identify and decode in one step.
    pub fn decode(&self, bytes: &[u8]) -> CoreResult<AccountRecord> {
        match self.identify(bytes) {
            Some(tag) => self.decode_as(tag, bytes),
            None => {
                let prefix_len = bytes.len().min(DISCRIMINATOR_LEN);
                Err(CoreError::UnknownDiscriminator(hex_prefix(
                    &bytes[..prefix_len],
                )))
            }
        }
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_global() -> GlobalStateRecord {
        GlobalStateRecord {
            authority: AccountKey::new([1u8; 32]),
            treasury: AccountKey::new([2u8; 32]),
            arena_counter: 42,
            entry_fee: 5_000_000,
            total_volume: (u128::from(7u64) << 64) | u128::from(9_999u64),
            max_players: 8,
            paused: false,
            bump: 254,
        }
    }

    fn sample_arena() -> ArenaRecord {
        ArenaRecord {
            arena_id: 42,
            status: ArenaStatus::Active,
            player_count: 3,
            winning_asset: None,
            canceled: false,
            treasury_claimed: false,
            bump: 255,
            start_ts: 1_700_000_000,
            end_ts: 1_700_000_600,
            total_pool: 15_000_000,
            entry_fee: 5_000_000,
            max_players: 8,
            vault: AccountKey::new([3u8; 32]),
        }
    }

    fn sample_entry() -> PlayerEntryRecord {
        PlayerEntryRecord {
            arena: AccountKey::new([4u8; 32]),
            player: AccountKey::new([5u8; 32]),
            asset_index: 2,
            player_index: 1,
            amount: 5_000_000,
            entry_ts: 1_699_999_990,
            start_price: 171_250_000,
            end_price: 0,
            price_movement: -3_200,
            is_winner: false,
            claimed: false,
            bump: 253,
        }
    }

    fn sample_token() -> WhitelistedTokenRecord {
        WhitelistedTokenRecord {
            mint: AccountKey::new([6u8; 32]),
            symbol: "SOL".to_string(),
            asset_index: 0,
            decimals: 9,
            active: true,
            bump: 252,
        }
    }

    #[test]
    fn round_trips_every_record() {
        let decoder = AccountDecoder::new();
        let records = [
            AccountRecord::GlobalState(sample_global()),
            AccountRecord::Arena(sample_arena()),
            AccountRecord::PlayerEntry(sample_entry()),
            AccountRecord::WhitelistedToken(sample_token()),
        ];
        for record in records {
            let bytes = record.to_bytes();
            let decoded = decoder.decode(&bytes).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn identify_matches_only_known_tags() {
        let decoder = AccountDecoder::new();
        let bytes = sample_arena().to_bytes();
        assert_eq!(decoder.identify(&bytes), Some(TypeTag::Arena));

        let mut foreign = bytes.clone();
        foreign[0] ^= 0xff;
        assert_eq!(decoder.identify(&foreign), None);
        assert!(matches!(
            decoder.decode(&foreign),
            Err(CoreError::UnknownDiscriminator(_))
        ));
    }

    #[test]
    fn every_truncation_is_rejected() {
        let decoder = AccountDecoder::new();
        for record in [
            AccountRecord::GlobalState(sample_global()),
            AccountRecord::Arena(sample_arena()),
            AccountRecord::PlayerEntry(sample_entry()),
            AccountRecord::WhitelistedToken(sample_token()),
        ] {
            let tag = record.type_tag();
            let bytes = record.to_bytes();
            for len in DISCRIMINATOR_LEN..bytes.len() {
                let err = decoder.decode_as(tag, &bytes[..len]);
                assert!(
                    matches!(err, Err(CoreError::ShortBuffer { .. })),
                    "{:?} truncated to {} bytes must fail",
                    tag,
                    len
                );
            }
        }
    }

    #[test]
    fn wide_counter_reassembles_from_halves() {
        let mut record = sample_global();
        record.total_volume = (u128::from(0xDEAD_BEEFu64) << 64) | u128::from(0x1234_5678u64);
        let bytes = record.to_bytes();

        // Halves sit at fixed offsets after tag + two keys + two u64s.
        let low_off = 8 + 32 + 32 + 8 + 8;
        let low = u64::from_le_bytes(bytes[low_off..low_off + 8].try_into().unwrap());
        let high = u64::from_le_bytes(bytes[low_off + 8..low_off + 16].try_into().unwrap());
        assert_eq!(low, 0x1234_5678);
        assert_eq!(high, 0xDEAD_BEEF);

        let decoder = AccountDecoder::new();
        match decoder.decode(&bytes).unwrap() {
            AccountRecord::GlobalState(decoded) => {
                assert_eq!(decoded.total_volume, record.total_volume)
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn winning_asset_sentinel_maps_to_none() {
        let decoder = AccountDecoder::new();

        let mut arena = sample_arena();
        arena.winning_asset = Some(2);
        let decoded = decoder.decode(&arena.to_bytes()).unwrap();
        assert_eq!(
            decoded,
            AccountRecord::Arena(ArenaRecord {
                winning_asset: Some(2),
                ..sample_arena()
            })
        );

        arena.winning_asset = None;
        let bytes = arena.to_bytes();
        assert_eq!(bytes[8 + 8 + 1 + 1], WINNING_ASSET_UNSET);
        match decoder.decode(&bytes).unwrap() {
            AccountRecord::Arena(decoded) => assert_eq!(decoded.winning_asset, None),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn garbage_bytes_never_parse_partially() {
        let decoder = AccountDecoder::new();
        let mut bytes = sample_arena().to_bytes();
        // Corrupt the status byte.
        bytes[16] = 9;
        assert!(matches!(
            decoder.decode(&bytes),
            Err(CoreError::InvalidStatus(9))
        ));
        // Corrupt a boolean.
        let mut bytes = sample_arena().to_bytes();
        bytes[19] = 7;
        assert!(matches!(
            decoder.decode(&bytes),
            Err(CoreError::InvalidBool(7))
        ));
    }

    #[test]
    fn symbol_is_trimmed_at_nul() {
        let decoder = AccountDecoder::new();
        let token = sample_token();
        let bytes = token.to_bytes();
        match decoder.decode(&bytes).unwrap() {
            AccountRecord::WhitelistedToken(decoded) => assert_eq!(decoded.symbol, "SOL"),
            other => panic!("unexpected record: {other:?}"),
        }
    }
}
