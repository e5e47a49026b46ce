//! Sync Service Error Types
//!
//! Error definitions for chain indexing, election and lifecycle driving.

use thiserror::Error;

/// Sync service error
#[derive(Error, Debug)]
pub enum SyncError {
    /// Account or instruction bytes failed to decode
    #[error("decode failed: {0}")]
    Decode(#[from] arena_core::CoreError),

    /// Mirror store error
    #[error("store error: {0}")]
    Store(#[from] arena_db::StoreError),

    /// Chain RPC transport failure
    #[error("chain RPC connection failed: {0}")]
    RpcConnection(String),

    /// Chain RPC returned an error object
    #[error("chain RPC error {code}: {message}")]
    RpcResponse { code: i64, message: String },

    /// A submitted transaction was rejected by the program
    #[error("transaction rejected on chain: {message}")]
    ChainRejection { message: String },

    /// Price oracle failure
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Leader lock store failure
    #[error("lock store error: {0}")]
    LockStore(String),

    /// Transaction signing failure
    #[error("signer error: {0}")]
    Signer(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored or observed state does not allow the operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Referenced entity is not mirrored
    #[error("not found: {0}")]
    NotFound(String),
}

impl SyncError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::RpcConnection(_) | SyncError::Oracle(_) | SyncError::LockStore(_)
        )
    }

    /// The program signals an early end attempt with this message. The
    /// caller reschedules instead of burning retries.
    pub fn is_duration_not_complete(&self) -> bool {
        match self {
            SyncError::ChainRejection { message } | SyncError::RpcResponse { message, .. } => {
                message.to_lowercase().contains("duration not complete")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::RpcConnection(err.to_string())
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(err: redis::RedisError) -> Self {
        SyncError::LockStore(err.to_string())
    }
}

/// Sync result type
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SyncError::RpcConnection("timeout".into()).is_transient());
        assert!(SyncError::Oracle("feed down".into()).is_transient());
        assert!(!SyncError::ChainRejection { message: "paused".into() }.is_transient());
        assert!(!SyncError::InvalidState("bad".into()).is_transient());
    }

    #[test]
    fn duration_guard_matches_both_paths() {
        let rejection = SyncError::ChainRejection {
            message: "Arena duration not complete".into(),
        };
        assert!(rejection.is_duration_not_complete());

        let rpc = SyncError::RpcResponse {
            code: -32002,
            message: "custom program error: duration not complete".into(),
        };
        assert!(rpc.is_duration_not_complete());

        let other = SyncError::ChainRejection { message: "arena full".into() };
        assert!(!other.is_duration_not_complete());
    }
}
