//! Shared domain types for the arena program

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};

/// Sentinel value in the `winning_asset` field meaning "not decided yet".
pub const WINNING_ASSET_UNSET: u8 = 255;

/// Prices are fixed-point integers scaled by 1e6 (micro quote units).
pub const PRICE_SCALE: u64 = 1_000_000;

/// 32-byte account key, rendered base58 on every textual surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountKey(pub [u8; 32]);

impl AccountKey {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn zeroed() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> CoreResult<Self> {
        if slice.len() != Self::LEN {
            return Err(CoreError::InvalidKey(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                slice.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn from_base58(s: &str) -> CoreResult<Self> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| CoreError::InvalidKey(format!("{s}: {e}")))?;
        Self::from_slice(&decoded)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for AccountKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl Serialize for AccountKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for AccountKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(D::Error::custom)
    }
}

/// 32-byte block hash used as transaction recency proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blockhash(pub [u8; 32]);

impl Blockhash {
    pub fn from_base58(s: &str) -> CoreResult<Self> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| CoreError::InvalidKey(format!("{s}: {e}")))?;
        if decoded.len() != 32 {
            return Err(CoreError::InvalidKey(format!(
                "blockhash must be 32 bytes, got {}",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

/// On-chain lifecycle status of an arena. The order is total: a status
/// never moves backwards on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaStatus {
    Uninitialized = 0,
    Waiting = 1,
    Active = 2,
    Ended = 3,
    Canceled = 4,
}

impl ArenaStatus {
    pub fn from_byte(byte: u8) -> CoreResult<Self> {
        match byte {
            0 => Ok(Self::Uninitialized),
            1 => Ok(Self::Waiting),
            2 => Ok(Self::Active),
            3 => Ok(Self::Ended),
            4 => Ok(Self::Canceled),
            other => Err(CoreError::InvalidStatus(other)),
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uninitialized" => Some(Self::Uninitialized),
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Terminal statuses accept no further lifecycle transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Canceled)
    }
}

impl fmt::Display for ArenaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two lifecycle phases the orchestrator drives per arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Start,
    End,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_base58_round_trip() {
        let key = AccountKey::new([7u8; 32]);
        let encoded = key.to_base58();
        let decoded = AccountKey::from_base58(&encoded).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn account_key_rejects_wrong_length() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(AccountKey::from_base58(&short).is_err());
        assert!(AccountKey::from_base58("not-base58-0OIl").is_err());
    }

    #[test]
    fn status_bytes_round_trip() {
        for status in [
            ArenaStatus::Uninitialized,
            ArenaStatus::Waiting,
            ArenaStatus::Active,
            ArenaStatus::Ended,
            ArenaStatus::Canceled,
        ] {
            assert_eq!(ArenaStatus::from_byte(status.as_byte()).unwrap(), status);
            assert_eq!(ArenaStatus::parse(status.as_str()), Some(status));
        }
        assert!(matches!(
            ArenaStatus::from_byte(9),
            Err(CoreError::InvalidStatus(9))
        ));
    }

    #[test]
    fn status_order_is_total() {
        assert!(ArenaStatus::Waiting < ArenaStatus::Active);
        assert!(ArenaStatus::Active < ArenaStatus::Ended);
        assert!(ArenaStatus::Ended < ArenaStatus::Canceled);
        assert!(ArenaStatus::Ended.is_terminal());
        assert!(ArenaStatus::Canceled.is_terminal());
        assert!(!ArenaStatus::Active.is_terminal());
    }
}
