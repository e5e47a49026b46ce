//! Authority transaction signer
//!
//! Ed25519 keypair wrapper used by the orchestrator to sign lifecycle
//! transactions. The key loads from hex (inline or file); the public key
//! doubles as the fee payer address, rendered base58 like every other
//! account key.

use arena_core::{AccountKey, SignedTransaction, TransactionMessage};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use crate::config::SignerConfig;
use crate::error::{SyncError, SyncResult};

/// The leader's signing identity.
#[derive(Clone)]
pub struct AuthoritySigner {
    signing_key: SigningKey,
    address: AccountKey,
}

impl AuthoritySigner {
    /// Generate a fresh random keypair (development runs only; the chain
    /// will reject lifecycle instructions from a non-authority key).
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = AccountKey::new(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let address = AccountKey::new(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    pub fn from_hex(hex_str: &str) -> SyncResult<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| SyncError::Signer(format!("invalid hex key: {e}")))?;
        if bytes.len() != 32 {
            return Err(SyncError::Signer(format!(
                "key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_bytes(&arr))
    }

    /// Resolve the key from config: inline hex wins over a key file; a
    /// missing key yields a generated one.
    pub fn from_config(config: &SignerConfig) -> SyncResult<Self> {
        if let Some(hex_key) = &config.secret_key_hex {
            return Self::from_hex(hex_key);
        }
        if let Some(path) = &config.key_file {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| SyncError::Signer(format!("read {path}: {e}")))?;
            return Self::from_hex(&raw);
        }
        Ok(Self::generate())
    }

    /// Fee payer / authority address.
    pub fn address(&self) -> AccountKey {
        self.address
    }

    pub fn address_base58(&self) -> String {
        self.address.to_base58()
    }

    pub fn sign_message(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Serialize the message, sign it, and wrap both into the envelope.
    pub fn sign_transaction(&self, message: TransactionMessage) -> SyncResult<SignedTransaction> {
        let bytes = message.to_bytes().map_err(SyncError::Decode)?;
        let signature = self.sign_message(&bytes);
        Ok(SignedTransaction {
            signatures: vec![signature],
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::Blockhash;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    #[test]
    fn hex_round_trip_preserves_address() {
        let signer = AuthoritySigner::generate();
        let hex_key = hex::encode(signer.signing_key.to_bytes());
        let reloaded = AuthoritySigner::from_hex(&hex_key).unwrap();
        assert_eq!(signer.address(), reloaded.address());
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(AuthoritySigner::from_hex("not hex").is_err());
        assert!(AuthoritySigner::from_hex("aabb").is_err());
    }

    #[test]
    fn signed_transaction_verifies_against_message_bytes() {
        let signer = AuthoritySigner::generate();
        let message = TransactionMessage::new(signer.address(), Blockhash([5u8; 32]));
        let tx = signer.sign_transaction(message).unwrap();

        let verifying = VerifyingKey::from_bytes(signer.address().as_bytes()).unwrap();
        let message_bytes = tx.message.to_bytes().unwrap();
        let signature = Signature::from_bytes(&tx.signatures[0]);
        assert!(verifying.verify(&message_bytes, &signature).is_ok());
    }

    #[test]
    fn config_without_key_generates_one() {
        let signer = AuthoritySigner::from_config(&SignerConfig::default()).unwrap();
        assert_eq!(signer.address().as_bytes().len(), 32);
    }
}
