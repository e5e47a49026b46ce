//! Instruction data codec for the arena program
//!
//! Instruction data is an 8-byte discriminator
//! (`sha256("global:<name>")[0..8]`) followed by little-endian arguments.
//! The codec both builds data for submission and parses data observed in
//! indexed transactions.

use sha2::{Digest, Sha256};

use crate::decoder::{Cursor, DISCRIMINATOR_LEN, SYMBOL_LEN};
use crate::error::{CoreError, CoreResult};

/// Derive the 8-byte instruction discriminator for a snake-case name.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&digest[..8]);
    tag
}

/// Instruction kinds the program accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    CreateArena,
    JoinArena,
    StartArena,
    SetStartPrice,
    EndArena,
    SetEndPrice,
    FinalizeArena,
    CancelArena,
    ClaimWinnings,
    WhitelistToken,
}

impl InstructionKind {
    pub const ALL: [InstructionKind; 10] = [
        InstructionKind::CreateArena,
        InstructionKind::JoinArena,
        InstructionKind::StartArena,
        InstructionKind::SetStartPrice,
        InstructionKind::EndArena,
        InstructionKind::SetEndPrice,
        InstructionKind::FinalizeArena,
        InstructionKind::CancelArena,
        InstructionKind::ClaimWinnings,
        InstructionKind::WhitelistToken,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateArena => "create_arena",
            Self::JoinArena => "join_arena",
            Self::StartArena => "start_arena",
            Self::SetStartPrice => "set_start_price",
            Self::EndArena => "end_arena",
            Self::SetEndPrice => "set_end_price",
            Self::FinalizeArena => "finalize_arena",
            Self::CancelArena => "cancel_arena",
            Self::ClaimWinnings => "claim_winnings",
            Self::WhitelistToken => "whitelist_token",
        }
    }
}

/// A fully parsed instruction with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaInstruction {
    CreateArena {
        arena_id: u64,
        entry_fee: u64,
        max_players: u8,
    },
    JoinArena {
        arena_id: u64,
        asset_index: u8,
    },
    StartArena {
        arena_id: u64,
    },
    SetStartPrice {
        arena_id: u64,
        player_index: u8,
        price: u64,
    },
    EndArena {
        arena_id: u64,
    },
    SetEndPrice {
        arena_id: u64,
        player_index: u8,
        price: u64,
    },
    FinalizeArena {
        arena_id: u64,
    },
    CancelArena {
        arena_id: u64,
    },
    ClaimWinnings {
        arena_id: u64,
    },
    WhitelistToken {
        asset_index: u8,
        symbol: String,
        decimals: u8,
    },
}

impl ArenaInstruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Self::CreateArena { .. } => InstructionKind::CreateArena,
            Self::JoinArena { .. } => InstructionKind::JoinArena,
            Self::StartArena { .. } => InstructionKind::StartArena,
            Self::SetStartPrice { .. } => InstructionKind::SetStartPrice,
            Self::EndArena { .. } => InstructionKind::EndArena,
            Self::SetEndPrice { .. } => InstructionKind::SetEndPrice,
            Self::FinalizeArena { .. } => InstructionKind::FinalizeArena,
            Self::CancelArena { .. } => InstructionKind::CancelArena,
            Self::ClaimWinnings { .. } => InstructionKind::ClaimWinnings,
            Self::WhitelistToken { .. } => InstructionKind::WhitelistToken,
        }
    }

    /// Arena id carried by the instruction, if it targets one.
    pub fn arena_id(&self) -> Option<u64> {
        match self {
            Self::CreateArena { arena_id, .. }
            | Self::JoinArena { arena_id, .. }
            | Self::StartArena { arena_id }
            | Self::SetStartPrice { arena_id, .. }
            | Self::EndArena { arena_id }
            | Self::SetEndPrice { arena_id, .. }
            | Self::FinalizeArena { arena_id }
            | Self::CancelArena { arena_id }
            | Self::ClaimWinnings { arena_id } => Some(*arena_id),
            Self::WhitelistToken { .. } => None,
        }
    }
}

/// Codec with a precomputed discriminator table for all instruction kinds.
#[derive(Debug, Clone)]
pub struct InstructionCodec {
    tags: Vec<([u8; 8], InstructionKind)>,
}

impl Default for InstructionCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionCodec {
    pub fn new() -> Self {
        let tags = InstructionKind::ALL
            .iter()
            .map(|kind| (instruction_discriminator(kind.name()), *kind))
            .collect();
        Self { tags }
    }

    pub fn identify(&self, data: &[u8]) -> Option<InstructionKind> {
        if data.len() < DISCRIMINATOR_LEN {
            return None;
        }
        let prefix = &data[..DISCRIMINATOR_LEN];
        self.tags
            .iter()
            .find(|(tag, _)| tag == prefix)
            .map(|(_, kind)| *kind)
    }

    pub fn encode(&self, instruction: &ArenaInstruction) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&instruction_discriminator(instruction.kind().name()));
        match instruction {
            ArenaInstruction::CreateArena {
                arena_id,
                entry_fee,
                max_players,
            } => {
                out.extend_from_slice(&arena_id.to_le_bytes());
                out.extend_from_slice(&entry_fee.to_le_bytes());
                out.push(*max_players);
            }
            ArenaInstruction::JoinArena {
                arena_id,
                asset_index,
            } => {
                out.extend_from_slice(&arena_id.to_le_bytes());
                out.push(*asset_index);
            }
            ArenaInstruction::StartArena { arena_id }
            | ArenaInstruction::EndArena { arena_id }
            | ArenaInstruction::FinalizeArena { arena_id }
            | ArenaInstruction::CancelArena { arena_id }
            | ArenaInstruction::ClaimWinnings { arena_id } => {
                out.extend_from_slice(&arena_id.to_le_bytes());
            }
            ArenaInstruction::SetStartPrice {
                arena_id,
                player_index,
                price,
            }
            | ArenaInstruction::SetEndPrice {
                arena_id,
                player_index,
                price,
            } => {
                out.extend_from_slice(&arena_id.to_le_bytes());
                out.push(*player_index);
                out.extend_from_slice(&price.to_le_bytes());
            }
            ArenaInstruction::WhitelistToken {
                asset_index,
                symbol,
                decimals,
            } => {
                out.push(*asset_index);
                let mut fixed = [0u8; SYMBOL_LEN];
                let raw = symbol.as_bytes();
                let len = raw.len().min(SYMBOL_LEN);
                fixed[..len].copy_from_slice(&raw[..len]);
                out.extend_from_slice(&fixed);
                out.push(*decimals);
            }
        }
        out
    }

    pub fn parse(&self, data: &[u8]) -> CoreResult<ArenaInstruction> {
        let kind = self.identify(data).ok_or_else(|| {
            let prefix_len = data.len().min(DISCRIMINATOR_LEN);
            CoreError::UnknownInstruction(
                data[..prefix_len]
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect(),
            )
        })?;
        let mut cursor = Cursor::new(&data[DISCRIMINATOR_LEN..]);
        let parsed = match kind {
            InstructionKind::CreateArena => ArenaInstruction::CreateArena {
                arena_id: cursor.read_u64()?,
                entry_fee: cursor.read_u64()?,
                max_players: cursor.read_u8()?,
            },
            InstructionKind::JoinArena => ArenaInstruction::JoinArena {
                arena_id: cursor.read_u64()?,
                asset_index: cursor.read_u8()?,
            },
            InstructionKind::StartArena => ArenaInstruction::StartArena {
                arena_id: cursor.read_u64()?,
            },
            InstructionKind::SetStartPrice => ArenaInstruction::SetStartPrice {
                arena_id: cursor.read_u64()?,
                player_index: cursor.read_u8()?,
                price: cursor.read_u64()?,
            },
            InstructionKind::EndArena => ArenaInstruction::EndArena {
                arena_id: cursor.read_u64()?,
            },
            InstructionKind::SetEndPrice => ArenaInstruction::SetEndPrice {
                arena_id: cursor.read_u64()?,
                player_index: cursor.read_u8()?,
                price: cursor.read_u64()?,
            },
            InstructionKind::FinalizeArena => ArenaInstruction::FinalizeArena {
                arena_id: cursor.read_u64()?,
            },
            InstructionKind::CancelArena => ArenaInstruction::CancelArena {
                arena_id: cursor.read_u64()?,
            },
            InstructionKind::ClaimWinnings => ArenaInstruction::ClaimWinnings {
                arena_id: cursor.read_u64()?,
            },
            InstructionKind::WhitelistToken => {
                let asset_index = cursor.read_u8()?;
                let raw = cursor.read_bytes(SYMBOL_LEN)?;
                let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
                let symbol = String::from_utf8(trimmed)
                    .map_err(|_| CoreError::InvalidSymbol(format!("{:02x?}", raw)))?;
                ArenaInstruction::WhitelistToken {
                    asset_index,
                    symbol,
                    decimals: cursor.read_u8()?,
                }
            }
        };
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<ArenaInstruction> {
        vec![
            ArenaInstruction::CreateArena {
                arena_id: 42,
                entry_fee: 5_000_000,
                max_players: 8,
            },
            ArenaInstruction::JoinArena {
                arena_id: 42,
                asset_index: 3,
            },
            ArenaInstruction::StartArena { arena_id: 42 },
            ArenaInstruction::SetStartPrice {
                arena_id: 42,
                player_index: 1,
                price: 171_250_000,
            },
            ArenaInstruction::EndArena { arena_id: 42 },
            ArenaInstruction::SetEndPrice {
                arena_id: 42,
                player_index: 1,
                price: 170_000_000,
            },
            ArenaInstruction::FinalizeArena { arena_id: 42 },
            ArenaInstruction::CancelArena { arena_id: 7 },
            ArenaInstruction::ClaimWinnings { arena_id: 42 },
            ArenaInstruction::WhitelistToken {
                asset_index: 0,
                symbol: "SOL".to_string(),
                decimals: 9,
            },
        ]
    }

    #[test]
    fn every_instruction_round_trips() {
        let codec = InstructionCodec::new();
        for instruction in samples() {
            let data = codec.encode(&instruction);
            let parsed = codec.parse(&data).unwrap();
            assert_eq!(parsed, instruction);
        }
    }

    #[test]
    fn unknown_discriminator_is_rejected() {
        let codec = InstructionCodec::new();
        let mut data = codec.encode(&ArenaInstruction::StartArena { arena_id: 1 });
        data[0] ^= 0xff;
        assert!(matches!(
            codec.parse(&data),
            Err(CoreError::UnknownInstruction(_))
        ));
        assert!(codec.parse(&[1, 2, 3]).is_err());
    }

    #[test]
    fn truncated_arguments_are_rejected() {
        let codec = InstructionCodec::new();
        let data = codec.encode(&ArenaInstruction::SetStartPrice {
            arena_id: 42,
            player_index: 0,
            price: 1,
        });
        for len in DISCRIMINATOR_LEN..data.len() {
            assert!(matches!(
                codec.parse(&data[..len]),
                Err(CoreError::ShortBuffer { .. })
            ));
        }
    }

    #[test]
    fn discriminators_are_distinct() {
        let mut tags: Vec<[u8; 8]> = InstructionKind::ALL
            .iter()
            .map(|k| instruction_discriminator(k.name()))
            .collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), InstructionKind::ALL.len());
    }
}
