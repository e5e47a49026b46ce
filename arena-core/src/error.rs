//! Error types for account and instruction codecs

use thiserror::Error;

/// Errors produced while encoding or decoding program data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("buffer too short: need {needed} bytes, have {available}")]
    ShortBuffer { needed: usize, available: usize },

    #[error("unrecognized account discriminator: {0}")]
    UnknownDiscriminator(String),

    #[error("unrecognized instruction discriminator: {0}")]
    UnknownInstruction(String),

    #[error("invalid status byte: {0}")]
    InvalidStatus(u8),

    #[error("invalid boolean byte: {0}")]
    InvalidBool(u8),

    #[error("invalid key encoding: {0}")]
    InvalidKey(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("transaction too large: {0}")]
    OversizedTransaction(String),
}

/// Result alias for codec operations
pub type CoreResult<T> = Result<T, CoreError>;
