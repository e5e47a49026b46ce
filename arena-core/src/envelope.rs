//! Signed transaction envelope
//!
//! Compact little-endian wire format for transactions submitted to the
//! node: signatures, then a message carrying fee payer, a recent blockhash
//! and the instruction list with account metas. Signatures cover the
//! serialized message bytes. The envelope travels base64 over RPC.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::decoder::Cursor;
use crate::error::{CoreError, CoreResult};
use crate::types::{AccountKey, Blockhash};

const FLAG_SIGNER: u8 = 0b01;
const FLAG_WRITABLE: u8 = 0b10;

/// One account referenced by an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub key: AccountKey,
    pub signer: bool,
    pub writable: bool,
}

impl AccountMeta {
    pub fn signer(key: AccountKey) -> Self {
        Self {
            key,
            signer: true,
            writable: true,
        }
    }

    pub fn writable(key: AccountKey) -> Self {
        Self {
            key,
            signer: false,
            writable: true,
        }
    }

    pub fn readonly(key: AccountKey) -> Self {
        Self {
            key,
            signer: false,
            writable: false,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.signer {
            flags |= FLAG_SIGNER;
        }
        if self.writable {
            flags |= FLAG_WRITABLE;
        }
        flags
    }
}

/// One program invocation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program: AccountKey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMessage {
    pub fee_payer: AccountKey,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<Instruction>,
}

impl TransactionMessage {
    pub fn new(fee_payer: AccountKey, recent_blockhash: Blockhash) -> Self {
        Self {
            fee_payer,
            recent_blockhash,
            instructions: Vec::new(),
        }
    }

    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let instruction_count: u16 = self
            .instructions
            .len()
            .try_into()
            .map_err(|_| CoreError::OversizedTransaction("too many instructions".into()))?;

        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(self.fee_payer.as_bytes());
        out.extend_from_slice(&self.recent_blockhash.0);
        out.extend_from_slice(&instruction_count.to_le_bytes());
        for instruction in &self.instructions {
            let account_count: u16 = instruction
                .accounts
                .len()
                .try_into()
                .map_err(|_| CoreError::OversizedTransaction("too many accounts".into()))?;
            let data_len: u32 = instruction
                .data
                .len()
                .try_into()
                .map_err(|_| CoreError::OversizedTransaction("instruction data too large".into()))?;

            out.extend_from_slice(instruction.program.as_bytes());
            out.extend_from_slice(&account_count.to_le_bytes());
            for meta in &instruction.accounts {
                out.extend_from_slice(meta.key.as_bytes());
                out.push(meta.flags());
            }
            out.extend_from_slice(&data_len.to_le_bytes());
            out.extend_from_slice(&instruction.data);
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let fee_payer = cursor.read_key()?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(cursor.read_bytes(32)?);
        let recent_blockhash = Blockhash(hash);
        let instruction_count = cursor.read_u16()?;
        let mut instructions = Vec::with_capacity(instruction_count as usize);
        for _ in 0..instruction_count {
            let program = cursor.read_key()?;
            let account_count = cursor.read_u16()?;
            let mut accounts = Vec::with_capacity(account_count as usize);
            for _ in 0..account_count {
                let key = cursor.read_key()?;
                let flags = cursor.read_u8()?;
                accounts.push(AccountMeta {
                    key,
                    signer: flags & FLAG_SIGNER != 0,
                    writable: flags & FLAG_WRITABLE != 0,
                });
            }
            let data_len = cursor.read_u32()? as usize;
            let data = cursor.read_bytes(data_len)?.to_vec();
            instructions.push(Instruction {
                program,
                accounts,
                data,
            });
        }
        Ok(Self {
            fee_payer,
            recent_blockhash,
            instructions,
        })
    }
}

/// A message plus the signatures over its serialized bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: TransactionMessage,
}

impl SignedTransaction {
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let signature_count: u8 = self
            .signatures
            .len()
            .try_into()
            .map_err(|_| CoreError::OversizedTransaction("too many signatures".into()))?;
        let mut out = Vec::with_capacity(1 + self.signatures.len() * 64 + 128);
        out.push(signature_count);
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.message.to_bytes()?);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let signature_count = cursor.read_u8()?;
        let mut signatures = Vec::with_capacity(signature_count as usize);
        for _ in 0..signature_count {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(cursor.read_bytes(64)?);
            signatures.push(sig);
        }
        let consumed = 1 + signature_count as usize * 64;
        let message = TransactionMessage::from_bytes(&bytes[consumed..])?;
        Ok(Self {
            signatures,
            message,
        })
    }

    pub fn to_base64(&self) -> CoreResult<String> {
        Ok(BASE64.encode(self.to_bytes()?))
    }

    pub fn from_base64(encoded: &str) -> CoreResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CoreError::InvalidKey(format!("base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Base58 of the first signature, the transaction's identity.
    pub fn signature_base58(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> TransactionMessage {
        TransactionMessage::new(AccountKey::new([9u8; 32]), Blockhash([8u8; 32]))
            .with_instruction(Instruction {
                program: AccountKey::new([1u8; 32]),
                accounts: vec![
                    AccountMeta::signer(AccountKey::new([2u8; 32])),
                    AccountMeta::writable(AccountKey::new([3u8; 32])),
                    AccountMeta::readonly(AccountKey::new([4u8; 32])),
                ],
                data: vec![0xAA, 0xBB, 0xCC],
            })
    }

    #[test]
    fn message_round_trips() {
        let message = sample_message();
        let bytes = message.to_bytes().unwrap();
        let decoded = TransactionMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn envelope_round_trips_through_base64() {
        let tx = SignedTransaction {
            signatures: vec![[7u8; 64]],
            message: sample_message(),
        };
        let encoded = tx.to_base64().unwrap();
        let decoded = SignedTransaction::from_base64(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(
            decoded.signature_base58().unwrap(),
            bs58::encode([7u8; 64]).into_string()
        );
    }

    #[test]
    fn account_flags_survive() {
        let tx = SignedTransaction {
            signatures: vec![[1u8; 64]],
            message: sample_message(),
        };
        let decoded = SignedTransaction::from_base64(&tx.to_base64().unwrap()).unwrap();
        let metas = &decoded.message.instructions[0].accounts;
        assert!(metas[0].signer && metas[0].writable);
        assert!(!metas[1].signer && metas[1].writable);
        assert!(!metas[2].signer && !metas[2].writable);
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        let tx = SignedTransaction {
            signatures: vec![[7u8; 64]],
            message: sample_message(),
        };
        let bytes = tx.to_bytes().unwrap();
        for len in [0, 1, 30, 65, bytes.len() - 1] {
            assert!(SignedTransaction::from_bytes(&bytes[..len]).is_err());
        }
    }
}
