//! # Arena Core
//!
//! Pure data layer for the arena prediction game: typed account records,
//! the binary account decoder, instruction data, and the signed
//! transaction envelope. No I/O and no async — everything here is a
//! deterministic function over bytes.
//!
//! The other workspace crates build on this one:
//!
//! ```text
//! arena-core  ──>  arena-db  ──>  arena-sync
//! (codecs)         (mirror)       (indexer / election / orchestrator)
//! ```

pub mod decoder;
pub mod envelope;
pub mod error;
pub mod instruction;
pub mod types;

pub use decoder::{
    account_discriminator, AccountDecoder, AccountRecord, ArenaRecord, GlobalStateRecord,
    PlayerEntryRecord, TypeTag, WhitelistedTokenRecord, DISCRIMINATOR_LEN, SYMBOL_LEN,
};
pub use envelope::{AccountMeta, Instruction, SignedTransaction, TransactionMessage};
pub use error::{CoreError, CoreResult};
pub use instruction::{
    instruction_discriminator, ArenaInstruction, InstructionCodec, InstructionKind,
};
pub use types::{
    AccountKey, ArenaStatus, Blockhash, PhaseKind, PRICE_SCALE, WINNING_ASSET_UNSET,
};
